use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Subscription tier stored on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "subscription_tier")]
pub enum Subscription {
    #[default]
    #[serde(rename = "nosubs")]
    #[sqlx(rename = "nosubs")]
    None,
    #[serde(rename = "month")]
    #[sqlx(rename = "month")]
    Monthly,
    #[serde(rename = "year")]
    #[sqlx(rename = "year")]
    Yearly,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, never exposed in JSON
    pub subscription: Subscription,
    pub is_admin: bool,
    pub is_paid: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub register_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_login: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Portfolio {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One monthly OHLCV snapshot held in a portfolio.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stock {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub month: String, // YYYY-MM
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Stock data before it is persisted; produced by the market-data client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStock {
    pub symbol: String,
    pub month: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// A portfolio together with every stock its owner holds.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioWithStocks {
    #[serde(flatten)]
    pub portfolio: Portfolio,
    pub stocks: Vec<Stock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockAnalysis {
    pub id: Uuid,
    pub stock_id: Uuid,
    pub symbol: String,
    pub analysis: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewStockAnalysis {
    pub stock_id: Uuid,
    pub analysis: String,
    pub generated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PortfolioAnalysis {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub user_id: Uuid,
    pub analysis: String,
    pub stock_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPortfolioAnalysis {
    pub portfolio_id: Uuid,
    pub analysis: String,
    pub stock_count: i32,
    pub generated_at: OffsetDateTime,
}
