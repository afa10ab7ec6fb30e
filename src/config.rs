use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub pool: PoolConfig,
    pub market_data: MarketDataConfig,
    pub llm: LlmConfig,
    pub upstream_timeout_secs: u64,
}

impl AppConfig {
    /// Reads the process environment once. Every required variable missing
    /// here is a startup failure.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "folioscope".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "folioscope-users".into()),
            ttl_minutes: parsed("JWT_TTL_MINUTES", 4 * 60)?,
        };
        let pool = PoolConfig {
            max_connections: parsed("DB_MAX_CONNECTIONS", 25)?,
            min_connections: parsed("DB_MIN_CONNECTIONS", 5)?,
            max_lifetime_secs: parsed("DB_MAX_LIFETIME_SECS", 5 * 60)?,
            idle_timeout_secs: parsed("DB_IDLE_TIMEOUT_SECS", 60)?,
        };
        let market_data = MarketDataConfig {
            api_key: required("ALPHAVANTAGE_API_KEY")?,
            base_url: std::env::var("ALPHAVANTAGE_BASE_URL")
                .unwrap_or_else(|_| "https://www.alphavantage.co".into()),
        };
        let llm = LlmConfig {
            api_key: required("OPENAI_API_KEY")?,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
        };

        Ok(Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parsed("APP_PORT", 8080)?,
            jwt,
            pool,
            market_data,
            llm,
            upstream_timeout_secs: parsed("UPSTREAM_TIMEOUT_SECS", 30)?,
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("{key} must be set"))?;
    anyhow::ensure!(!value.trim().is_empty(), "{key} must not be empty");
    Ok(value)
}

/// Unset means `default`; a value that is set but does not parse is an error.
fn parsed<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} is not a valid value: {v:?}")),
        Err(_) => Ok(default),
    }
}
