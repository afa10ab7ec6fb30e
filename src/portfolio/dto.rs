use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct CreatePortfolioRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: String,
}

/// Body returned by every delete endpoint.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub message: &'static str,
    pub id: Uuid,
}
