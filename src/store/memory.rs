//! In-memory store for router tests. Mirrors the ownership rules of the SQL
//! statements in `postgres.rs`.

use std::sync::Mutex;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{
    AnalysisRepo, NewPortfolioAnalysis, NewStock, NewStockAnalysis, Portfolio, PortfolioAnalysis,
    PortfolioRepo, Stock, StockAnalysis, StoreError, Subscription, User, UserRepo,
    DEFAULT_PORTFOLIO_NAME,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    portfolios: Vec<Portfolio>,
    stocks: Vec<Stock>,
    stock_analyses: Vec<StockAnalysis>,
    portfolio_analyses: Vec<PortfolioAnalysis>,
    tick: i64,
}

impl Tables {
    /// Strictly increasing timestamps so "newest first" is deterministic.
    fn now(&mut self) -> OffsetDateTime {
        self.tick += 1;
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.tick)
    }

    fn portfolio_owner(&self, portfolio_id: Uuid) -> Option<Uuid> {
        self.portfolios
            .iter()
            .find(|p| p.id == portfolio_id)
            .map(|p| p.user_id)
    }

    fn stock_owner(&self, stock_id: Uuid) -> Option<Uuid> {
        self.stocks
            .iter()
            .find(|s| s.id == stock_id)
            .and_then(|s| self.portfolio_owner(s.portfolio_id))
    }

    fn latest_portfolio(&self, user_id: Uuid) -> Option<Portfolio> {
        self.portfolios
            .iter()
            .filter(|p| p.user_id == user_id)
            .max_by_key(|p| p.created_at)
            .cloned()
    }

    fn insert_portfolio(&mut self, user_id: Uuid, name: &str) -> Portfolio {
        let now = self.now();
        let portfolio = Portfolio {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.portfolios.push(portfolio.clone());
        portfolio
    }

    fn cascade_stocks(&mut self, removed: &[Uuid]) {
        self.stock_analyses.retain(|a| !removed.contains(&a.stock_id));
        self.stocks.retain(|s| !removed.contains(&s.id));
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn promote_to_admin(&self, user_id: Uuid) {
        let mut t = self.tables.lock().unwrap();
        if let Some(u) = t.users.iter_mut().find(|u| u.id == user_id) {
            u.is_admin = true;
        }
    }

    pub fn portfolio_analysis_count(&self) -> usize {
        self.tables.lock().unwrap().portfolio_analyses.len()
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        let mut t = self.tables.lock().unwrap();
        if t.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        let now = t.now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            subscription: Subscription::None,
            is_admin: false,
            is_paid: false,
            register_date: now,
            last_login: now,
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let t = self.tables.lock().unwrap();
        let mut users = t.users.clone();
        users.sort_by(|a, b| b.register_date.cmp(&a.register_date));
        Ok(users)
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> Result<User, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        user.name = name.to_string();
        Ok(user.clone())
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<User, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let now = t.now();
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        user.last_login = now;
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        if !t.users.iter().any(|u| u.id == id) {
            return Err(StoreError::NotFound);
        }
        let owned: Vec<Uuid> = t
            .portfolios
            .iter()
            .filter(|p| p.user_id == id)
            .map(|p| p.id)
            .collect();
        let stocks: Vec<Uuid> = t
            .stocks
            .iter()
            .filter(|s| owned.contains(&s.portfolio_id))
            .map(|s| s.id)
            .collect();
        t.cascade_stocks(&stocks);
        t.portfolio_analyses.retain(|a| a.user_id != id);
        t.portfolios.retain(|p| p.user_id != id);
        t.users.retain(|u| u.id != id);
        Ok(())
    }
}

#[async_trait]
impl PortfolioRepo for MemoryStore {
    async fn get_or_create_portfolio(&self, user_id: Uuid) -> Result<Portfolio, StoreError> {
        let mut t = self.tables.lock().unwrap();
        match t.latest_portfolio(user_id) {
            Some(p) => Ok(p),
            None => Ok(t.insert_portfolio(user_id, DEFAULT_PORTFOLIO_NAME)),
        }
    }

    async fn create_portfolio(&self, user_id: Uuid, name: &str) -> Result<Portfolio, StoreError> {
        let mut t = self.tables.lock().unwrap();
        Ok(t.insert_portfolio(user_id, name))
    }

    async fn list_user_stocks(&self, user_id: Uuid) -> Result<Vec<Stock>, StoreError> {
        let t = self.tables.lock().unwrap();
        let mut stocks: Vec<Stock> = t
            .stocks
            .iter()
            .filter(|s| t.portfolio_owner(s.portfolio_id) == Some(user_id))
            .cloned()
            .collect();
        stocks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(stocks)
    }

    async fn get_user_stock_by_id(
        &self,
        user_id: Uuid,
        stock_id: Uuid,
    ) -> Result<Stock, StoreError> {
        let t = self.tables.lock().unwrap();
        let stock = t
            .stocks
            .iter()
            .find(|s| s.id == stock_id)
            .ok_or(StoreError::NotFound)?;
        if t.portfolio_owner(stock.portfolio_id) != Some(user_id) {
            return Err(StoreError::NotOwned);
        }
        Ok(stock.clone())
    }

    async fn get_user_stock_by_symbol(
        &self,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<Stock, StoreError> {
        let t = self.tables.lock().unwrap();
        let mut matching: Vec<&Stock> = t.stocks.iter().filter(|s| s.symbol == symbol).collect();
        if matching.is_empty() {
            return Err(StoreError::NotFound);
        }
        matching.retain(|s| t.portfolio_owner(s.portfolio_id) == Some(user_id));
        matching
            .into_iter()
            .max_by_key(|s| s.created_at)
            .cloned()
            .ok_or(StoreError::NotOwned)
    }

    async fn add_stock_to_user_portfolio(
        &self,
        user_id: Uuid,
        stock: &NewStock,
    ) -> Result<Stock, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let held = t.stocks.iter().any(|s| {
            s.symbol == stock.symbol
                && t
                    .portfolios
                    .iter()
                    .any(|p| p.id == s.portfolio_id && p.user_id == user_id)
        });
        if held {
            return Err(StoreError::Conflict("stock already exists in portfolio".into()));
        }
        let portfolio = match t.latest_portfolio(user_id) {
            Some(p) => p,
            None => t.insert_portfolio(user_id, DEFAULT_PORTFOLIO_NAME),
        };
        let now = t.now();
        let row = Stock {
            id: Uuid::new_v4(),
            portfolio_id: portfolio.id,
            symbol: stock.symbol.clone(),
            month: stock.month.clone(),
            open: stock.open,
            high: stock.high,
            low: stock.low,
            close: stock.close,
            volume: stock.volume,
            created_at: now,
            updated_at: now,
        };
        t.stocks.push(row.clone());
        Ok(row)
    }

    async fn delete_user_stock_by_id(
        &self,
        user_id: Uuid,
        stock_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        match t.stock_owner(stock_id) {
            Some(owner) if owner == user_id => {
                t.cascade_stocks(&[stock_id]);
                Ok(())
            }
            owner => Err(StoreError::missing(owner, user_id)),
        }
    }

    async fn user_owns_stock(&self, user_id: Uuid, stock_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.lock().unwrap().stock_owner(stock_id) == Some(user_id))
    }

    async fn user_owns_portfolio(
        &self,
        user_id: Uuid,
        portfolio_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self.tables.lock().unwrap().portfolio_owner(portfolio_id) == Some(user_id))
    }
}

#[async_trait]
impl AnalysisRepo for MemoryStore {
    async fn save_stock_analysis(
        &self,
        user_id: Uuid,
        analysis: &NewStockAnalysis,
    ) -> Result<StockAnalysis, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let owner = t.stock_owner(analysis.stock_id);
        if owner != Some(user_id) {
            return Err(StoreError::missing(owner, user_id));
        }
        let symbol = t
            .stocks
            .iter()
            .find(|s| s.id == analysis.stock_id)
            .map(|s| s.symbol.clone())
            .unwrap_or_default();
        let now = t.now();
        let row = StockAnalysis {
            id: Uuid::new_v4(),
            stock_id: analysis.stock_id,
            symbol,
            analysis: analysis.analysis.clone(),
            generated_at: analysis.generated_at,
            created_at: now,
            updated_at: now,
        };
        t.stock_analyses.push(row.clone());
        Ok(row)
    }

    async fn latest_stock_analysis(
        &self,
        user_id: Uuid,
        stock_id: Uuid,
    ) -> Result<StockAnalysis, StoreError> {
        let t = self.tables.lock().unwrap();
        let owner = t.stock_owner(stock_id);
        if owner != Some(user_id) {
            return Err(StoreError::missing(owner, user_id));
        }
        t.stock_analyses
            .iter()
            .filter(|a| a.stock_id == stock_id)
            .max_by_key(|a| a.generated_at)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_stock_analyses(&self, user_id: Uuid) -> Result<Vec<StockAnalysis>, StoreError> {
        let t = self.tables.lock().unwrap();
        let mut rows: Vec<StockAnalysis> = t
            .stock_analyses
            .iter()
            .filter(|a| t.stock_owner(a.stock_id) == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(rows)
    }

    async fn delete_stock_analysis(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        let owner = t
            .stock_analyses
            .iter()
            .find(|a| a.id == analysis_id)
            .and_then(|a| t.stock_owner(a.stock_id));
        if owner != Some(user_id) {
            return Err(StoreError::missing(owner, user_id));
        }
        t.stock_analyses.retain(|a| a.id != analysis_id);
        Ok(())
    }

    async fn save_portfolio_analysis(
        &self,
        user_id: Uuid,
        analysis: &NewPortfolioAnalysis,
    ) -> Result<PortfolioAnalysis, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let owner = t.portfolio_owner(analysis.portfolio_id);
        if owner != Some(user_id) {
            return Err(StoreError::missing(owner, user_id));
        }
        let now = t.now();
        let row = PortfolioAnalysis {
            id: Uuid::new_v4(),
            portfolio_id: analysis.portfolio_id,
            user_id,
            analysis: analysis.analysis.clone(),
            stock_count: analysis.stock_count,
            generated_at: analysis.generated_at,
            created_at: now,
            updated_at: now,
        };
        t.portfolio_analyses.push(row.clone());
        Ok(row)
    }

    async fn latest_portfolio_analysis(
        &self,
        user_id: Uuid,
        portfolio_id: Uuid,
    ) -> Result<PortfolioAnalysis, StoreError> {
        let t = self.tables.lock().unwrap();
        let owner = t.portfolio_owner(portfolio_id);
        if owner != Some(user_id) {
            return Err(StoreError::missing(owner, user_id));
        }
        t.portfolio_analyses
            .iter()
            .filter(|a| a.portfolio_id == portfolio_id)
            .max_by_key(|a| a.generated_at)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_portfolio_analyses(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PortfolioAnalysis>, StoreError> {
        let t = self.tables.lock().unwrap();
        let mut rows: Vec<PortfolioAnalysis> = t
            .portfolio_analyses
            .iter()
            .filter(|a| t.portfolio_owner(a.portfolio_id) == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(rows)
    }

    async fn delete_portfolio_analysis(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        let owner = t
            .portfolio_analyses
            .iter()
            .find(|a| a.id == analysis_id)
            .and_then(|a| t.portfolio_owner(a.portfolio_id));
        if owner != Some(user_id) {
            return Err(StoreError::missing(owner, user_id));
        }
        t.portfolio_analyses.retain(|a| a.id != analysis_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(symbol: &str) -> NewStock {
        NewStock {
            symbol: symbol.into(),
            month: "2025-08".into(),
            open: 10.0,
            high: 12.0,
            low: 9.0,
            close: 11.0,
            volume: 1_000,
        }
    }

    async fn two_users(store: &MemoryStore) -> (Uuid, Uuid) {
        let a = store.create_user("", "a@x.com", "h").await.unwrap().id;
        let b = store.create_user("", "b@x.com", "h").await.unwrap().id;
        (a, b)
    }

    #[tokio::test]
    async fn get_or_create_portfolio_is_idempotent() {
        let store = MemoryStore::new();
        let (a, _) = two_users(&store).await;
        let first = store.get_or_create_portfolio(a).await.unwrap();
        let second = store.get_or_create_portfolio(a).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, DEFAULT_PORTFOLIO_NAME);
    }

    #[tokio::test]
    async fn foreign_stock_is_not_owned() {
        let store = MemoryStore::new();
        let (a, b) = two_users(&store).await;
        let stock = store.add_stock_to_user_portfolio(b, &sample("AAPL")).await.unwrap();

        assert!(matches!(
            store.get_user_stock_by_id(a, stock.id).await,
            Err(StoreError::NotOwned)
        ));
        assert!(matches!(
            store.get_user_stock_by_id(a, Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.delete_user_stock_by_id(a, stock.id).await,
            Err(StoreError::NotOwned)
        ));
        assert!(store.get_user_stock_by_id(b, stock.id).await.is_ok());
        assert!(store.list_user_stocks(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn symbol_lookup_prefers_callers_rows() {
        let store = MemoryStore::new();
        let (a, b) = two_users(&store).await;
        store.add_stock_to_user_portfolio(b, &sample("MSFT")).await.unwrap();
        assert!(matches!(
            store.get_user_stock_by_symbol(a, "MSFT").await,
            Err(StoreError::NotOwned)
        ));
        let mine = store.add_stock_to_user_portfolio(a, &sample("MSFT")).await.unwrap();
        assert_eq!(store.get_user_stock_by_symbol(a, "MSFT").await.unwrap().id, mine.id);
        assert!(matches!(
            store.get_user_stock_by_symbol(a, "NOPE").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleting_stock_drops_its_analyses() {
        let store = MemoryStore::new();
        let (a, _) = two_users(&store).await;
        let stock = store.add_stock_to_user_portfolio(a, &sample("IBM")).await.unwrap();
        store
            .save_stock_analysis(
                a,
                &NewStockAnalysis {
                    stock_id: stock.id,
                    analysis: "fine".into(),
                    generated_at: OffsetDateTime::UNIX_EPOCH,
                },
            )
            .await
            .unwrap();
        store.delete_user_stock_by_id(a, stock.id).await.unwrap();
        assert!(store.list_stock_analyses(a).await.unwrap().is_empty());
    }
}
