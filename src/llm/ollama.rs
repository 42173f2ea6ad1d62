use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use message_rag_core::{RagError, Result};

use super::{classify_status, classify_transport, ChatMessage, CompletionOptions, LlmClient};
use crate::config::ModelConfig;

const DEFAULT_API_BASE: &str = "http://localhost:11434";

/// Client for a local Ollama server's chat endpoint.
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;

        let base = config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base.trim_end_matches('/')),
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String> {
        let mut turns = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = options.system.as_deref().filter(|s| !s.is_empty()) {
            turns.push(serde_json::json!({"role": "system", "content": system}));
        }
        for m in messages {
            turns.push(serde_json::json!({"role": m.role, "content": m.content}));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": turns,
            "stream": false,
            "options": {
                "temperature": options.temperature.unwrap_or(self.temperature),
                "num_predict": options.max_tokens.unwrap_or(self.max_tokens),
            },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, "Ollama"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, "Ollama", &text));
        }

        let parsed: ChatResponse = response.json()
            .await
            .map_err(|e| classify_transport(e, "Ollama"))?;
        Ok(parsed.message.content)
    }
}
