use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::db;
use crate::external::{AlphaVantageClient, LlmClient, MarketData, OpenAiClient};
use crate::store::{PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub keys: Arc<JwtKeys>,
    pub market: Arc<dyn MarketData>,
    pub llm: Arc<dyn LlmClient>,
}

impl AppState {
    /// Connects, migrates and builds the outbound clients. Any failure here
    /// aborts startup.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        db::migrate(&pool).await?;

        let market = AlphaVantageClient::new(
            config.market_data.api_key.clone(),
            config.upstream_timeout(),
        )?
        .with_base_url(config.market_data.base_url.clone());

        let llm = OpenAiClient::new(
            config.llm.api_key.clone(),
            config.llm.model.clone(),
            config.upstream_timeout(),
        )?
        .with_base_url(config.llm.base_url.clone());

        Ok(Self::from_parts(
            Arc::new(config),
            Arc::new(PgStore::new(pool)),
            Arc::new(market),
            Arc::new(llm),
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn Store>,
        market: Arc<dyn MarketData>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let keys = Arc::new(JwtKeys::new(&config.jwt));
        Self {
            config,
            store,
            keys,
            market,
            llm,
        }
    }
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}
