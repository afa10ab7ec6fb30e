use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

const SYSTEM_PROMPT: &str = "You are a professional financial analyst with expertise in stock market analysis. \
Provide detailed, actionable insights based on the stock data provided.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("llm returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("llm returned no choices")]
    NoChoices,
    #[error("llm returned an empty completion")]
    EmptyCompletion,
    #[error("could not decode llm response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends one user prompt and returns the first choice's text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LlmError::Request)?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".into(),
            model: model.into(),
            max_tokens: 1000,
            temperature: 0.3,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(LlmError::Request)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let bytes = resp.bytes().await.map_err(LlmError::Request)?;
        let parsed: ChatResponse =
            serde_json::from_slice(&bytes).map_err(|e| LlmError::Decode(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::NoChoices)?
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyCompletion)?;
        debug!(chars = text.len(), "analysis generated");
        Ok(text)
    }
}
