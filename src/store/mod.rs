//! Ownership-scoped data access.
//!
//! Every method touching portfolios, stocks or analyses takes the caller's
//! user id and evaluates ownership inside the query itself. A row that exists
//! but belongs to somebody else is reported as [`StoreError::NotOwned`], a row
//! that does not exist at all as [`StoreError::NotFound`].

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
pub(crate) mod memory;
pub mod models;
pub mod postgres;

pub use models::{
    NewPortfolioAnalysis, NewStock, NewStockAnalysis, Portfolio, PortfolioAnalysis,
    PortfolioWithStocks, Stock, StockAnalysis, Subscription, User,
};
pub use postgres::PgStore;

pub const DEFAULT_PORTFOLIO_NAME: &str = "My Portfolio";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("resource belongs to another user")]
    NotOwned,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classifies a missing scoped row from the real owner of the subject, if any.
    pub(crate) fn missing(owner: Option<Uuid>, caller: Uuid) -> Self {
        match owner {
            Some(owner) if owner != caller => StoreError::NotOwned,
            _ => StoreError::NotFound,
        }
    }
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn update_user_name(&self, id: Uuid, name: &str) -> Result<User, StoreError>;
    async fn touch_last_login(&self, id: Uuid) -> Result<User, StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PortfolioRepo: Send + Sync {
    /// Most recently created portfolio of the user, creating "My Portfolio" when none exists.
    async fn get_or_create_portfolio(&self, user_id: Uuid) -> Result<Portfolio, StoreError>;
    async fn create_portfolio(&self, user_id: Uuid, name: &str) -> Result<Portfolio, StoreError>;
    /// All stocks across the user's portfolios, newest first.
    async fn list_user_stocks(&self, user_id: Uuid) -> Result<Vec<Stock>, StoreError>;
    async fn get_user_stock_by_id(&self, user_id: Uuid, stock_id: Uuid)
        -> Result<Stock, StoreError>;
    async fn get_user_stock_by_symbol(
        &self,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<Stock, StoreError>;
    async fn add_stock_to_user_portfolio(
        &self,
        user_id: Uuid,
        stock: &NewStock,
    ) -> Result<Stock, StoreError>;
    async fn delete_user_stock_by_id(&self, user_id: Uuid, stock_id: Uuid)
        -> Result<(), StoreError>;
    async fn user_owns_stock(&self, user_id: Uuid, stock_id: Uuid) -> Result<bool, StoreError>;
    async fn user_owns_portfolio(
        &self,
        user_id: Uuid,
        portfolio_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn get_user_portfolio(&self, user_id: Uuid) -> Result<PortfolioWithStocks, StoreError> {
        let portfolio = self.get_or_create_portfolio(user_id).await?;
        let stocks = self.list_user_stocks(user_id).await?;
        Ok(PortfolioWithStocks { portfolio, stocks })
    }
}

#[async_trait]
pub trait AnalysisRepo: Send + Sync {
    async fn save_stock_analysis(
        &self,
        user_id: Uuid,
        analysis: &NewStockAnalysis,
    ) -> Result<StockAnalysis, StoreError>;
    async fn latest_stock_analysis(
        &self,
        user_id: Uuid,
        stock_id: Uuid,
    ) -> Result<StockAnalysis, StoreError>;
    async fn list_stock_analyses(&self, user_id: Uuid) -> Result<Vec<StockAnalysis>, StoreError>;
    async fn delete_stock_analysis(&self, user_id: Uuid, analysis_id: Uuid)
        -> Result<(), StoreError>;

    async fn save_portfolio_analysis(
        &self,
        user_id: Uuid,
        analysis: &NewPortfolioAnalysis,
    ) -> Result<PortfolioAnalysis, StoreError>;
    async fn latest_portfolio_analysis(
        &self,
        user_id: Uuid,
        portfolio_id: Uuid,
    ) -> Result<PortfolioAnalysis, StoreError>;
    async fn list_portfolio_analyses(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PortfolioAnalysis>, StoreError>;
    async fn delete_portfolio_analysis(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<(), StoreError>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Store: UserRepo + PortfolioRepo + AnalysisRepo {}

impl<T: UserRepo + PortfolioRepo + AnalysisRepo> Store for T {}
