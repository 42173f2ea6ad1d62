use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use message_rag_core::{RagError, Result};

use super::{classify_status, classify_transport, ChatMessage, CompletionOptions, LlmClient};
use crate::config::ModelConfig;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    /// Build a client, reading the key from `ANTHROPIC_API_KEY`.
    pub fn from_env(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            RagError::Config("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Config("Anthropic API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;

        let base = config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/v1/messages", base.trim_end_matches('/')),
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
            "temperature": options.temperature.unwrap_or(self.temperature),
            "messages": messages,
        });
        if let Some(system) = options.system.as_deref().filter(|s| !s.is_empty()) {
            body["system"] = serde_json::Value::String(system.to_string());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, "Anthropic"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, "Anthropic", &text));
        }

        let parsed: MessagesResponse = response.json()
            .await
            .map_err(|e| classify_transport(e, "Anthropic"))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        debug!(model = %self.model, chars = text.len(), "anthropic completion");
        Ok(text)
    }
}
