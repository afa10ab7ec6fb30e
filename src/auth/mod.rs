use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;

pub use claims::Claims;
pub use extractors::AuthUser;
pub use jwt::JwtKeys;

/// `/register` and `/login`, mounted at the root.
pub fn public_router() -> Router<AppState> {
    handlers::public_routes()
}

/// `/users/...`, mounted under the API prefix.
pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
