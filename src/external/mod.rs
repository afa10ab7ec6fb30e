//! Outbound HTTP clients. Both sit behind a trait so handlers can be
//! exercised without network access.

pub mod alphavantage;
pub mod openai;

pub use alphavantage::{AlphaVantageClient, MarketData, MarketDataError};
pub use openai::{LlmClient, LlmError, OpenAiClient};
