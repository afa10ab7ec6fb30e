use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{
    AnalysisRepo, NewPortfolioAnalysis, NewStock, NewStockAnalysis, Portfolio, PortfolioAnalysis,
    PortfolioRepo, Stock, StockAnalysis, StoreError, User, UserRepo, DEFAULT_PORTFOLIO_NAME,
};

/// Postgres-backed store. Each method borrows a pooled connection only for
/// the duration of its own statements.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn stock_owner(&self, stock_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let owner = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT p.user_id
              FROM stocks s
              INNER JOIN portfolios p ON p.id = s.portfolio_id
             WHERE s.id = $1
            "#,
        )
        .bind(stock_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(owner)
    }

    async fn portfolio_owner(&self, portfolio_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let owner = sqlx::query_scalar::<_, Uuid>(
            r#"SELECT user_id FROM portfolios WHERE id = $1"#,
        )
        .bind(portfolio_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(owner)
    }
}

/// Row-locks the user for the rest of the transaction. Portfolio creation and
/// stock inserts for one user run one at a time behind this lock.
async fn lock_user(conn: &mut PgConnection, user_id: Uuid) -> Result<(), StoreError> {
    sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM users WHERE id = $1 FOR UPDATE"#)
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .map(|_| ())
        .ok_or(StoreError::NotFound)
}

async fn latest_portfolio(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<Portfolio>, StoreError> {
    let portfolio = sqlx::query_as::<_, Portfolio>(
        r#"
        SELECT id, user_id, name, created_at, updated_at
        FROM portfolios
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(portfolio)
}

async fn insert_portfolio(
    conn: &mut PgConnection,
    user_id: Uuid,
    name: &str,
) -> Result<Portfolio, StoreError> {
    let portfolio = sqlx::query_as::<_, Portfolio>(
        r#"
        INSERT INTO portfolios (user_id, name)
        VALUES ($1, $2)
        RETURNING id, user_id, name, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(name)
    .fetch_one(conn)
    .await?;
    Ok(portfolio)
}

/// Current portfolio of a user already locked by [`lock_user`], created on first use.
async fn current_portfolio_locked(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Portfolio, StoreError> {
    if let Some(p) = latest_portfolio(&mut *conn, user_id).await? {
        return Ok(p);
    }
    debug!(%user_id, "creating default portfolio");
    insert_portfolio(conn, user_id, DEFAULT_PORTFOLIO_NAME).await
}

/// A stock row plus whether the caller owns it, evaluated in SQL.
#[derive(FromRow)]
struct ScopedStock {
    #[sqlx(flatten)]
    stock: Stock,
    owned: bool,
}

impl ScopedStock {
    fn into_owned(row: Option<Self>) -> Result<Stock, StoreError> {
        match row {
            None => Err(StoreError::NotFound),
            Some(r) if !r.owned => Err(StoreError::NotOwned),
            Some(r) => Ok(r.stock),
        }
    }
}

/// Outcome of a delete guarded by an ownership join.
#[derive(FromRow)]
struct ScopedDelete {
    found: bool,
    removed: bool,
}

impl ScopedDelete {
    fn into_result(self) -> Result<(), StoreError> {
        match (self.found, self.removed) {
            (_, true) => Ok(()),
            (true, false) => Err(StoreError::NotOwned),
            (false, false) => Err(StoreError::NotFound),
        }
    }
}

fn unique_violation(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl UserRepo for PgStore {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password_hash, subscription, is_admin, is_paid,
                      register_date, last_login
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "email already registered"))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, subscription, is_admin, is_paid,
                   register_date, last_login
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, subscription, is_admin, is_paid,
                   register_date, last_login
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, subscription, is_admin, is_paid,
                   register_date, last_login
            FROM users
            ORDER BY register_date DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET name = $2
            WHERE id = $1
            RETURNING id, name, email, password_hash, subscription, is_admin, is_paid,
                      register_date, last_login
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET last_login = NOW()
            WHERE id = $1
            RETURNING id, name, email, password_hash, subscription, is_admin, is_paid,
                      register_date, last_login
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl PortfolioRepo for PgStore {
    async fn get_or_create_portfolio(&self, user_id: Uuid) -> Result<Portfolio, StoreError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(p) = latest_portfolio(&mut conn, user_id).await? {
            return Ok(p);
        }
        drop(conn);

        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;
        let portfolio = current_portfolio_locked(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(portfolio)
    }

    async fn create_portfolio(&self, user_id: Uuid, name: &str) -> Result<Portfolio, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_portfolio(&mut conn, user_id, name).await
    }

    async fn list_user_stocks(&self, user_id: Uuid) -> Result<Vec<Stock>, StoreError> {
        let stocks = sqlx::query_as::<_, Stock>(
            r#"
            SELECT s.id, s.portfolio_id, s.symbol, s.month, s.open, s.high, s.low, s.close,
                   s.volume, s.created_at, s.updated_at
            FROM stocks s
            INNER JOIN portfolios p ON s.portfolio_id = p.id
            WHERE p.user_id = $1
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(stocks)
    }

    async fn get_user_stock_by_id(
        &self,
        user_id: Uuid,
        stock_id: Uuid,
    ) -> Result<Stock, StoreError> {
        let row = sqlx::query_as::<_, ScopedStock>(
            r#"
            SELECT s.id, s.portfolio_id, s.symbol, s.month, s.open, s.high, s.low, s.close,
                   s.volume, s.created_at, s.updated_at,
                   p.user_id = $2 AS owned
            FROM stocks s
            INNER JOIN portfolios p ON s.portfolio_id = p.id
            WHERE s.id = $1
            "#,
        )
        .bind(stock_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        ScopedStock::into_owned(row)
    }

    async fn get_user_stock_by_symbol(
        &self,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<Stock, StoreError> {
        // Caller's own rows sort first; a foreign row only surfaces as NotOwned.
        let row = sqlx::query_as::<_, ScopedStock>(
            r#"
            SELECT s.id, s.portfolio_id, s.symbol, s.month, s.open, s.high, s.low, s.close,
                   s.volume, s.created_at, s.updated_at,
                   p.user_id = $2 AS owned
            FROM stocks s
            INNER JOIN portfolios p ON s.portfolio_id = p.id
            WHERE s.symbol = $1
            ORDER BY (p.user_id = $2) DESC, s.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        ScopedStock::into_owned(row)
    }

    async fn add_stock_to_user_portfolio(
        &self,
        user_id: Uuid,
        stock: &NewStock,
    ) -> Result<Stock, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;

        // A symbol may be held once per user, across all of their portfolios.
        let held = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                  FROM stocks s
                  INNER JOIN portfolios p ON s.portfolio_id = p.id
                 WHERE p.user_id = $1 AND s.symbol = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(&stock.symbol)
        .fetch_one(&mut *tx)
        .await?;
        if held {
            return Err(StoreError::Conflict(
                "stock already exists in portfolio".into(),
            ));
        }

        let portfolio = current_portfolio_locked(&mut tx, user_id).await?;
        let row = sqlx::query_as::<_, Stock>(
            r#"
            INSERT INTO stocks (portfolio_id, symbol, month, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, portfolio_id, symbol, month, open, high, low, close, volume,
                      created_at, updated_at
            "#,
        )
        .bind(portfolio.id)
        .bind(&stock.symbol)
        .bind(&stock.month)
        .bind(stock.open)
        .bind(stock.high)
        .bind(stock.low)
        .bind(stock.close)
        .bind(stock.volume)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, "stock already exists in portfolio"))?;

        tx.commit().await?;
        Ok(row)
    }

    async fn delete_user_stock_by_id(
        &self,
        user_id: Uuid,
        stock_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query_as::<_, ScopedDelete>(
            r#"
            WITH target AS (
                SELECT s.id, p.user_id
                  FROM stocks s
                  INNER JOIN portfolios p ON p.id = s.portfolio_id
                 WHERE s.id = $1
            ), removed AS (
                DELETE FROM stocks
                 WHERE id IN (SELECT id FROM target WHERE user_id = $2)
                RETURNING id
            )
            SELECT EXISTS (SELECT 1 FROM target) AS found,
                   EXISTS (SELECT 1 FROM removed) AS removed
            "#,
        )
        .bind(stock_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?
        .into_result()
    }

    async fn user_owns_stock(&self, user_id: Uuid, stock_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.stock_owner(stock_id).await? == Some(user_id))
    }

    async fn user_owns_portfolio(
        &self,
        user_id: Uuid,
        portfolio_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self.portfolio_owner(portfolio_id).await? == Some(user_id))
    }
}

#[async_trait]
impl AnalysisRepo for PgStore {
    async fn save_stock_analysis(
        &self,
        user_id: Uuid,
        analysis: &NewStockAnalysis,
    ) -> Result<StockAnalysis, StoreError> {
        let saved = sqlx::query_as::<_, StockAnalysis>(
            r#"
            INSERT INTO stock_analyses (stock_id, symbol, analysis, generated_at)
            SELECT s.id, s.symbol, $3, $4
              FROM stocks s
              INNER JOIN portfolios p ON p.id = s.portfolio_id
             WHERE s.id = $1 AND p.user_id = $2
            RETURNING id, stock_id, symbol, analysis, generated_at, created_at, updated_at
            "#,
        )
        .bind(analysis.stock_id)
        .bind(user_id)
        .bind(&analysis.analysis)
        .bind(analysis.generated_at)
        .fetch_optional(&self.pool)
        .await?;

        match saved {
            Some(s) => Ok(s),
            None => Err(StoreError::missing(
                self.stock_owner(analysis.stock_id).await?,
                user_id,
            )),
        }
    }

    async fn latest_stock_analysis(
        &self,
        user_id: Uuid,
        stock_id: Uuid,
    ) -> Result<StockAnalysis, StoreError> {
        let latest = sqlx::query_as::<_, StockAnalysis>(
            r#"
            SELECT sa.id, sa.stock_id, sa.symbol, sa.analysis, sa.generated_at,
                   sa.created_at, sa.updated_at
            FROM stock_analyses sa
            INNER JOIN stocks s ON sa.stock_id = s.id
            INNER JOIN portfolios p ON s.portfolio_id = p.id
            WHERE sa.stock_id = $1 AND p.user_id = $2
            ORDER BY sa.generated_at DESC
            LIMIT 1
            "#,
        )
        .bind(stock_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match latest {
            Some(a) => Ok(a),
            None => Err(StoreError::missing(self.stock_owner(stock_id).await?, user_id)),
        }
    }

    async fn list_stock_analyses(&self, user_id: Uuid) -> Result<Vec<StockAnalysis>, StoreError> {
        let rows = sqlx::query_as::<_, StockAnalysis>(
            r#"
            SELECT sa.id, sa.stock_id, sa.symbol, sa.analysis, sa.generated_at,
                   sa.created_at, sa.updated_at
            FROM stock_analyses sa
            INNER JOIN stocks s ON sa.stock_id = s.id
            INNER JOIN portfolios p ON s.portfolio_id = p.id
            WHERE p.user_id = $1
            ORDER BY sa.generated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_stock_analysis(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query_as::<_, ScopedDelete>(
            r#"
            WITH target AS (
                SELECT sa.id, p.user_id
                  FROM stock_analyses sa
                  INNER JOIN stocks s ON s.id = sa.stock_id
                  INNER JOIN portfolios p ON p.id = s.portfolio_id
                 WHERE sa.id = $1
            ), removed AS (
                DELETE FROM stock_analyses
                 WHERE id IN (SELECT id FROM target WHERE user_id = $2)
                RETURNING id
            )
            SELECT EXISTS (SELECT 1 FROM target) AS found,
                   EXISTS (SELECT 1 FROM removed) AS removed
            "#,
        )
        .bind(analysis_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?
        .into_result()
    }

    async fn save_portfolio_analysis(
        &self,
        user_id: Uuid,
        analysis: &NewPortfolioAnalysis,
    ) -> Result<PortfolioAnalysis, StoreError> {
        let saved = sqlx::query_as::<_, PortfolioAnalysis>(
            r#"
            INSERT INTO portfolio_analyses (portfolio_id, user_id, analysis, stock_count, generated_at)
            SELECT p.id, p.user_id, $3, $4, $5
              FROM portfolios p
             WHERE p.id = $1 AND p.user_id = $2
            RETURNING id, portfolio_id, user_id, analysis, stock_count, generated_at,
                      created_at, updated_at
            "#,
        )
        .bind(analysis.portfolio_id)
        .bind(user_id)
        .bind(&analysis.analysis)
        .bind(analysis.stock_count)
        .bind(analysis.generated_at)
        .fetch_optional(&self.pool)
        .await?;

        match saved {
            Some(s) => Ok(s),
            None => Err(StoreError::missing(
                self.portfolio_owner(analysis.portfolio_id).await?,
                user_id,
            )),
        }
    }

    async fn latest_portfolio_analysis(
        &self,
        user_id: Uuid,
        portfolio_id: Uuid,
    ) -> Result<PortfolioAnalysis, StoreError> {
        let latest = sqlx::query_as::<_, PortfolioAnalysis>(
            r#"
            SELECT pa.id, pa.portfolio_id, pa.user_id, pa.analysis, pa.stock_count,
                   pa.generated_at, pa.created_at, pa.updated_at
            FROM portfolio_analyses pa
            INNER JOIN portfolios p ON pa.portfolio_id = p.id
            WHERE pa.portfolio_id = $1 AND p.user_id = $2
            ORDER BY pa.generated_at DESC
            LIMIT 1
            "#,
        )
        .bind(portfolio_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match latest {
            Some(a) => Ok(a),
            None => Err(StoreError::missing(
                self.portfolio_owner(portfolio_id).await?,
                user_id,
            )),
        }
    }

    async fn list_portfolio_analyses(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PortfolioAnalysis>, StoreError> {
        let rows = sqlx::query_as::<_, PortfolioAnalysis>(
            r#"
            SELECT pa.id, pa.portfolio_id, pa.user_id, pa.analysis, pa.stock_count,
                   pa.generated_at, pa.created_at, pa.updated_at
            FROM portfolio_analyses pa
            INNER JOIN portfolios p ON pa.portfolio_id = p.id
            WHERE p.user_id = $1
            ORDER BY pa.generated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_portfolio_analysis(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query_as::<_, ScopedDelete>(
            r#"
            WITH target AS (
                SELECT pa.id, p.user_id
                  FROM portfolio_analyses pa
                  INNER JOIN portfolios p ON p.id = pa.portfolio_id
                 WHERE pa.id = $1
            ), removed AS (
                DELETE FROM portfolio_analyses
                 WHERE id IN (SELECT id FROM target WHERE user_id = $2)
                RETURNING id
            )
            SELECT EXISTS (SELECT 1 FROM target) AS found,
                   EXISTS (SELECT 1 FROM removed) AS removed
            "#,
        )
        .bind(analysis_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?
        .into_result()
    }
}
