use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use super::{
    dto::{LoginRequest, LoginResponse, RegisterRequest, UpdateUserRequest},
    extractors::AuthUser,
    password::{hash_password, verify_against_dummy, verify_password},
};
use crate::{
    error::AppError,
    state::AppState,
    store::User,
};

const MIN_PASSWORD_LEN: usize = 8;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(get_me).put(update_me).delete(delete_me))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Runs the Argon2 work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(AppError::Internal)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password = payload.password;
    let hash = blocking(move || hash_password(&password)).await?;

    let user = state
        .store
        .create_user(payload.name.trim(), &email, &hash)
        .await
        .map_err(|e| {
            warn!(email = %email, error = %e, "registration rejected");
            AppError::from(e)
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = payload.email.trim().to_lowercase();
    let password = payload.password;

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        blocking(move || {
            verify_against_dummy(&password);
            Ok(())
        })
        .await?;
        warn!(email = %email, "login unknown email");
        return Err(AppError::Unauthorized);
    };

    let hash = user.password_hash.clone();
    let user_id = user.id;
    let ok = blocking(move || {
        Ok(verify_password(&password, &hash).unwrap_or_else(|e| {
            error!(%user_id, error = %e, "stored password hash is unreadable");
            false
        }))
    })
    .await?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized);
    }

    let user = state.store.touch_last_login(user.id).await?;
    let token = state.keys.sign(&user)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse { user, token }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, AppError> {
    let user = state
        .store
        .find_user_by_id(auth.id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name must not be empty".into()));
    }
    let user = state.store.update_user_name(auth.id, name).await?;
    info!(user_id = %user.id, "user renamed");
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    state.store.delete_user(auth.id).await?;
    info!(user_id = %auth.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<User>>, AppError> {
    // The token's admin flag may be stale; trust the stored row.
    let caller = state
        .store
        .find_user_by_id(auth.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !caller.is_admin {
        warn!(user_id = %auth.id, "non-admin tried to list users");
        return Err(AppError::Forbidden);
    }
    Ok(Json(state.store.list_users().await?))
}
