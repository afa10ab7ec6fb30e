use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::store::NewStock;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("market data request failed: {0}")]
    Fetch(#[source] reqwest::Error),
    #[error("market data provider returned status {0}")]
    Status(StatusCode),
    #[error("could not decode market data: {0}")]
    Decode(String),
    #[error("market data provider rate limit reached")]
    RateLimited,
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("no monthly entries for {0}")]
    EmptySeries(String),
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Latest monthly OHLCV bar for `symbol`, labelled with the current UTC month.
    async fn latest_monthly(&self, symbol: &str) -> Result<NewStock, MarketDataError>;
}

pub struct AlphaVantageClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, MarketDataError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(MarketDataError::Fetch)?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: "https://www.alphavantage.co".into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MarketData for AlphaVantageClient {
    #[instrument(skip(self))]
    async fn latest_monthly(&self, symbol: &str) -> Result<NewStock, MarketDataError> {
        let resp = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("function", "TIME_SERIES_MONTHLY"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(MarketDataError::Fetch)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MarketDataError::Status(status));
        }

        let body = resp.text().await.map_err(MarketDataError::Fetch)?;
        let snapshot = snapshot_from_body(symbol, &body, &month_label(OffsetDateTime::now_utc()))?;
        debug!(symbol = %snapshot.symbol, close = snapshot.close, "fetched monthly bar");
        Ok(snapshot)
    }
}

#[derive(Debug, Deserialize)]
struct MonthlyResponse {
    #[serde(rename = "Meta Data")]
    meta: Option<MetaData>,
    #[serde(rename = "Monthly Time Series")]
    series: Option<BTreeMap<String, MonthlyBar>>,
    // Throttling comes back as 200 with one of these set.
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaData {
    #[serde(rename = "2. Symbol")]
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MonthlyBar {
    #[serde(rename = "1. open", deserialize_with = "lenient_number")]
    open: f64,
    #[serde(rename = "2. high", deserialize_with = "lenient_number")]
    high: f64,
    #[serde(rename = "3. low", deserialize_with = "lenient_number")]
    low: f64,
    #[serde(rename = "4. close", deserialize_with = "lenient_number")]
    close: f64,
    #[serde(rename = "5. volume", deserialize_with = "lenient_number")]
    volume: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    String(String),
}

/// Alpha Vantage sends numbers as strings; accept both.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match NumberOrString::<T>::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// `YYYY-MM` of the given instant in UTC.
pub fn month_label(at: OffsetDateTime) -> String {
    let at = at.to_offset(time::UtcOffset::UTC);
    format!("{:04}-{:02}", at.year(), u8::from(at.month()))
}

/// Turns a raw TIME_SERIES_MONTHLY body into a snapshot. The most recent
/// entry wins; entries are keyed by ISO dates so the greatest key is the latest.
pub fn snapshot_from_body(
    requested: &str,
    body: &str,
    month: &str,
) -> Result<NewStock, MarketDataError> {
    let parsed: MonthlyResponse =
        serde_json::from_str(body).map_err(|e| MarketDataError::Decode(e.to_string()))?;

    if parsed.note.is_some() || parsed.information.is_some() {
        return Err(MarketDataError::RateLimited);
    }
    if parsed.error_message.is_some() {
        return Err(MarketDataError::UnknownSymbol(requested.to_string()));
    }

    let series = parsed
        .series
        .ok_or_else(|| MarketDataError::Decode("missing Monthly Time Series".into()))?;
    let (_, bar) = series
        .iter()
        .next_back()
        .ok_or_else(|| MarketDataError::EmptySeries(requested.to_string()))?;

    let symbol = parsed
        .meta
        .and_then(|m| m.symbol)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| requested.to_uppercase());

    Ok(NewStock {
        symbol,
        month: month.to_string(),
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        volume: bar.volume,
    })
}
