use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreatePortfolioRequest, Deleted, SymbolQuery};
use crate::{
    auth::AuthUser,
    error::AppError,
    state::AppState,
    store::{Portfolio, PortfolioWithStocks, Stock, StoreError, DEFAULT_PORTFOLIO_NAME},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/portfolio", get(get_portfolio).post(create_portfolio))
        .route("/portfolio/stocks", get(list_stocks))
        .route("/portfolio/stocks/search", get(search_stock))
        // GET/DELETE take a stock id, POST takes a ticker symbol.
        .route(
            "/portfolio/stocks/:id",
            get(get_stock).delete(delete_stock).post(add_stock),
        )
}

/// Trims and uppercases a ticker, rejecting anything that is not a plausible symbol.
pub(crate) fn normalize_symbol(raw: &str) -> Result<String, AppError> {
    lazy_static! {
        static ref SYMBOL_RE: Regex = Regex::new(r"^[A-Z0-9][A-Z0-9.\-]{0,14}$").unwrap();
    }
    let symbol = raw.trim().to_uppercase();
    if SYMBOL_RE.is_match(&symbol) {
        Ok(symbol)
    } else {
        Err(AppError::Validation("Invalid stock symbol".into()))
    }
}

#[instrument(skip(state))]
pub async fn get_portfolio(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PortfolioWithStocks>, AppError> {
    Ok(Json(state.store.get_user_portfolio(auth.id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_portfolio(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Option<Json<CreatePortfolioRequest>>,
) -> Result<(StatusCode, Json<Portfolio>), AppError> {
    let Json(payload) = payload.unwrap_or_default();
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_PORTFOLIO_NAME);
    let portfolio = state.store.create_portfolio(auth.id, name).await?;
    info!(user_id = %auth.id, portfolio_id = %portfolio.id, "portfolio created");
    Ok((StatusCode::CREATED, Json(portfolio)))
}

#[instrument(skip(state))]
pub async fn list_stocks(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Stock>>, AppError> {
    Ok(Json(state.store.list_user_stocks(auth.id).await?))
}

#[instrument(skip(state))]
pub async fn search_stock(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SymbolQuery>,
) -> Result<Json<Stock>, AppError> {
    let symbol = normalize_symbol(&query.symbol)?;
    Ok(Json(state.store.get_user_stock_by_symbol(auth.id, &symbol).await?))
}

#[instrument(skip(state))]
pub async fn add_stock(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw_symbol): Path<String>,
) -> Result<(StatusCode, Json<Stock>), AppError> {
    let symbol = normalize_symbol(&raw_symbol)?;

    match state.store.get_user_stock_by_symbol(auth.id, &symbol).await {
        Ok(_) => {
            return Err(AppError::Conflict(
                "Stock already exists in your portfolio".into(),
            ))
        }
        Err(StoreError::NotFound | StoreError::NotOwned) => {}
        Err(e) => return Err(e.into()),
    }

    // No store handle is held across the provider call.
    let snapshot = state.market.latest_monthly(&symbol).await?;
    let stock = state
        .store
        .add_stock_to_user_portfolio(auth.id, &snapshot)
        .await?;

    info!(user_id = %auth.id, stock_id = %stock.id, symbol = %stock.symbol, "stock added");
    Ok((StatusCode::CREATED, Json(stock)))
}

#[instrument(skip(state))]
pub async fn get_stock(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Stock>, AppError> {
    Ok(Json(state.store.get_user_stock_by_id(auth.id, id).await?))
}

#[instrument(skip(state))]
pub async fn delete_stock(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Deleted>, AppError> {
    state.store.delete_user_stock_by_id(auth.id, id).await?;
    info!(user_id = %auth.id, stock_id = %id, "stock deleted");
    Ok(Json(Deleted {
        message: "Stock deleted",
        id,
    }))
}
