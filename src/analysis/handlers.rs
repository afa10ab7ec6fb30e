use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::service;
use crate::{
    auth::AuthUser,
    error::AppError,
    portfolio::dto::Deleted,
    state::AppState,
    store::{PortfolioAnalysis, StockAnalysis},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/stocks", get(list_stock_analyses))
        .route("/analysis/stocks/:id", get(latest_stock_analysis))
        .route("/analysis/stocks/:id/analyze", post(analyze_stock))
        .route("/analysis/stock-analyses/:id", delete(delete_stock_analysis))
        .route("/analysis/portfolio", get(latest_portfolio_analysis))
        .route("/analysis/portfolio/analyze", post(analyze_portfolio))
        .route("/analysis/portfolios", get(list_portfolio_analyses))
        .route(
            "/analysis/portfolio-analyses/:id",
            delete(delete_portfolio_analysis),
        )
}

#[derive(Debug, Deserialize)]
pub struct PortfolioAnalysisQuery {
    pub portfolio_id: Option<Uuid>,
}

#[instrument(skip(state))]
pub async fn analyze_stock(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(stock_id): Path<Uuid>,
) -> Result<Json<StockAnalysis>, AppError> {
    let stock = state.store.get_user_stock_by_id(auth.id, stock_id).await?;
    let draft = service::analyze_stock(state.llm.as_ref(), &stock).await?;
    let saved = state.store.save_stock_analysis(auth.id, &draft).await?;
    info!(user_id = %auth.id, stock_id = %stock_id, analysis_id = %saved.id, "stock analyzed");
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn latest_stock_analysis(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(stock_id): Path<Uuid>,
) -> Result<Json<StockAnalysis>, AppError> {
    Ok(Json(
        state.store.latest_stock_analysis(auth.id, stock_id).await?,
    ))
}

#[instrument(skip(state))]
pub async fn list_stock_analyses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<StockAnalysis>>, AppError> {
    Ok(Json(state.store.list_stock_analyses(auth.id).await?))
}

#[instrument(skip(state))]
pub async fn delete_stock_analysis(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Deleted>, AppError> {
    state.store.delete_stock_analysis(auth.id, id).await?;
    info!(user_id = %auth.id, analysis_id = %id, "stock analysis deleted");
    Ok(Json(Deleted {
        message: "Stock analysis deleted",
        id,
    }))
}

#[instrument(skip(state))]
pub async fn analyze_portfolio(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PortfolioAnalysis>, AppError> {
    let portfolio = state.store.get_user_portfolio(auth.id).await?;
    if portfolio.stocks.is_empty() {
        warn!(user_id = %auth.id, "portfolio analysis requested with no stocks");
        return Err(AppError::Validation(
            "Portfolio has no stocks to analyze".into(),
        ));
    }

    let draft = service::analyze_portfolio(state.llm.as_ref(), &portfolio).await?;
    let saved = state.store.save_portfolio_analysis(auth.id, &draft).await?;
    info!(
        user_id = %auth.id,
        portfolio_id = %saved.portfolio_id,
        stock_count = saved.stock_count,
        "portfolio analyzed"
    );
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn latest_portfolio_analysis(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PortfolioAnalysisQuery>,
) -> Result<Json<PortfolioAnalysis>, AppError> {
    let portfolio_id = match query.portfolio_id {
        Some(id) => {
            if !state.store.user_owns_portfolio(auth.id, id).await? {
                warn!(user_id = %auth.id, portfolio_id = %id, "portfolio not owned by caller");
                return Err(AppError::NotFound);
            }
            id
        }
        None => state.store.get_or_create_portfolio(auth.id).await?.id,
    };
    Ok(Json(
        state
            .store
            .latest_portfolio_analysis(auth.id, portfolio_id)
            .await?,
    ))
}

#[instrument(skip(state))]
pub async fn list_portfolio_analyses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<PortfolioAnalysis>>, AppError> {
    Ok(Json(state.store.list_portfolio_analyses(auth.id).await?))
}

#[instrument(skip(state))]
pub async fn delete_portfolio_analysis(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Deleted>, AppError> {
    state.store.delete_portfolio_analysis(auth.id, id).await?;
    info!(user_id = %auth.id, analysis_id = %id, "portfolio analysis deleted");
    Ok(Json(Deleted {
        message: "Portfolio analysis deleted",
        id,
    }))
}
