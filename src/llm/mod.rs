//! LLM completion clients.
//!
//! [`LlmClient`] is the single completion contract the query engine talks
//! to. Each backend is one adapter:
//!
//! | Provider | Adapter | Endpoint |
//! |----------|---------|----------|
//! | `anthropic` | [`AnthropicClient`] | `POST {api_base}/v1/messages` |
//! | `ollama` | [`OllamaClient`] | `POST {api_base}/api/chat` |
//!
//! HTTP failures are classified into the retryable/non-retryable error
//! kinds by [`classify_status`] and [`classify_transport`].

mod anthropic;
mod ollama;

pub use anthropic::AnthropicClient;
pub use ollama::OllamaClient;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use message_rag_core::{RagError, Result};

use crate::config::ModelConfig;

/// One turn of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call overrides. Unset fields fall back to the model config.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, part of the response cache key.
    fn model_name(&self) -> &str;

    /// Complete a single prompt.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        self.chat(&[ChatMessage::user(prompt)], options).await
    }

    /// Respond to an ordered conversation.
    async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String>;

    /// Approximate token count, about four characters per token.
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count() / 4
    }
}

/// Map a non-success HTTP status to an error kind.
pub fn classify_status(status: StatusCode, provider: &str, body: &str) -> RagError {
    let message = format!("{provider} API error {status}: {body}");
    match status.as_u16() {
        429 => RagError::RateLimited(message),
        408 | 409 | 425 | 529 => RagError::TransientApi(message),
        s if (500..600).contains(&s) => RagError::TransientApi(message),
        _ => RagError::PermanentApi(message),
    }
}

/// Map a transport-level failure to an error kind.
///
/// Timeouts and connection failures are transient; a body that cannot be
/// decoded is permanent.
pub fn classify_transport(err: reqwest::Error, provider: &str) -> RagError {
    if err.is_decode() {
        RagError::PermanentApi(format!("{provider} returned an undecodable response: {err}"))
    } else {
        RagError::TransientApi(format!("{provider} request failed: {err}"))
    }
}

/// Build the client for a configured model.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_env(config)?)),
        "ollama" => Ok(Arc::new(OllamaClient::new(config)?)),
        other => Err(RagError::Config(format!("Unknown LLM provider: {}", other))),
    }
}
