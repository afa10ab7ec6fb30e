use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::external::{LlmError, MarketDataError};
use crate::store::StoreError;

/// Errors a handler can return. Each variant maps to exactly one status code;
/// internal details are logged, never sent to the client.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limited by external provider")]
    RateLimited,
    #[error("upstream error: {0}")]
    Upstream(&'static str),
    #[error("upstream timeout")]
    UpstreamTimeout,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::Conflict(msg) => msg.clone(),
            AppError::Unauthorized => "Unauthorized".into(),
            AppError::Forbidden => "Forbidden".into(),
            AppError::NotFound => "Not found".into(),
            AppError::RateLimited => "Rate limited by market data provider".into(),
            AppError::Upstream(msg) => (*msg).into(),
            AppError::UpstreamTimeout => "Upstream service timed out".into(),
            AppError::Internal(_) => "Internal server error".into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            error!(error = ?e, "internal error");
        }
        let status = self.status();
        let body = Json(json!({ "error": self.public_message() }));
        match self {
            AppError::RateLimited => {
                let mut res = (status, body).into_response();
                res.headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static("60"));
                res
            }
            _ => (status, body).into_response(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            // Foreign rows are indistinguishable from missing ones.
            StoreError::NotFound | StoreError::NotOwned => AppError::NotFound,
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Database(e) => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl From<MarketDataError> for AppError {
    fn from(value: MarketDataError) -> Self {
        warn!(error = %value, "market data fetch failed");
        match value {
            MarketDataError::Fetch(e) if e.is_timeout() => AppError::UpstreamTimeout,
            MarketDataError::Fetch(_) | MarketDataError::Status(_) => {
                AppError::Upstream("Market data provider unavailable")
            }
            MarketDataError::Decode(_) => {
                AppError::Upstream("Market data provider returned malformed data")
            }
            MarketDataError::EmptySeries(_) => {
                AppError::Upstream("Market data provider returned no data")
            }
            MarketDataError::RateLimited => AppError::RateLimited,
            MarketDataError::UnknownSymbol(symbol) => {
                AppError::Validation(format!("Unknown stock symbol {symbol}"))
            }
        }
    }
}

impl From<LlmError> for AppError {
    fn from(value: LlmError) -> Self {
        warn!(error = %value, "analysis request failed");
        match value {
            LlmError::Request(e) if e.is_timeout() => AppError::UpstreamTimeout,
            LlmError::Request(_) => AppError::Upstream("Analysis service unavailable"),
            LlmError::Status { .. } => AppError::Upstream("Analysis service returned an error"),
            LlmError::NoChoices | LlmError::EmptyCompletion | LlmError::Decode(_) => {
                AppError::Upstream("Analysis service returned no usable result")
            }
        }
    }
}
