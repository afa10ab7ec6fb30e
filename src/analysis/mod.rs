use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod prompts;
pub mod service;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
