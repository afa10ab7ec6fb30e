//! In-process doubles for router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AppConfig, JwtConfig, LlmConfig, MarketDataConfig, PoolConfig};
use crate::external::{LlmClient, LlmError, MarketData, MarketDataError};
use crate::state::AppState;
use crate::store::{memory::MemoryStore, NewStock};

/// Answers every symbol except `UNKNOWN` with a fixed bar.
pub struct FakeMarket;

#[async_trait]
impl MarketData for FakeMarket {
    async fn latest_monthly(&self, symbol: &str) -> Result<NewStock, MarketDataError> {
        if symbol == "UNKNOWN" {
            return Err(MarketDataError::UnknownSymbol(symbol.to_string()));
        }
        Ok(NewStock {
            symbol: symbol.to_uppercase(),
            month: "2025-08".into(),
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close: 105.0,
            volume: 1_000_000,
        })
    }
}

/// Echoes a canned answer and counts calls.
#[derive(Default)]
pub struct FakeLlm {
    pub calls: AtomicUsize,
}

impl FakeLlm {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("analysis of {} chars", prompt.len()))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "folioscope".into(),
            audience: "folioscope-users".into(),
            ttl_minutes: 5,
        },
        pool: PoolConfig {
            max_connections: 1,
            min_connections: 0,
            max_lifetime_secs: 60,
            idle_timeout_secs: 60,
        },
        market_data: MarketDataConfig {
            api_key: "demo".into(),
            base_url: "http://127.0.0.1:1".into(),
        },
        llm: LlmConfig {
            api_key: "sk-test".into(),
            base_url: "http://127.0.0.1:1".into(),
            model: "gpt-test".into(),
        },
        upstream_timeout_secs: 1,
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub llm: Arc<FakeLlm>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(FakeLlm::default());
    let state = AppState::from_parts(
        Arc::new(test_config()),
        store.clone(),
        Arc::new(FakeMarket),
        llm.clone(),
    );
    Harness { state, store, llm }
}
