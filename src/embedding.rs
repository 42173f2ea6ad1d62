//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations selected by `embedding.provider`:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: runs models locally via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use message_rag_core::embedding::Embedder;
use message_rag_core::{RagError, Result};

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ Disabled Provider ============

/// An embedder that always fails.
///
/// Used when `embedding.provider = "disabled"`. Commands that only read
/// counts or manage the cache still work.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn encode_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::Embedding(
            "Embedding provider is disabled".to_string(),
        ))
    }
}

// ============ Shared HTTP plumbing ============

/// POST `body` to `url`, retrying 429, 5xx and network errors.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        RagError::Embedding(format!("{label} returned invalid JSON: {e}"))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = RagError::Embedding(format!("{label} API error {status}: {body_text}"));

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(attempt, %status, "{label} embedding request failed, retrying");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                last_err = Some(RagError::Embedding(format!(
                    "{label} connection error ({url}): {e}"
                )));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| RagError::Embedding(format!("{label} embedding failed after retries"))))
}

fn json_vector(value: &serde_json::Value, label: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| RagError::Embedding(format!("Invalid {label} response: embedding is not an array")))
        .map(|items| {
            items
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect()
        })
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(RagError::embedding)
}

// ============ OpenAI Provider ============

/// Embedder backed by the OpenAI embeddings API.
///
/// Requires `OPENAI_API_KEY`. Texts are sent in chunks of
/// `embedding.batch_size`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        Ok(Self {
            client: http_client(config)?,
            api_key,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string()),
            model: config.model.clone(),
            dims: config.dims.unwrap_or(1536),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        })
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::Embedding("Invalid OpenAI response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| RagError::Embedding("Invalid OpenAI response: missing embedding".into()))?;
        indexed.push((index, json_vector(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size.max(1)) {
            let body = serde_json::json!({ "model": self.model, "input": chunk });
            let json = post_with_retry(
                &self.client,
                &self.url,
                Some(&self.api_key),
                &body,
                self.max_retries,
                "OpenAI",
            )
            .await?;
            out.extend(parse_openai_response(&json)?);
        }
        Ok(out)
    }
}

// ============ Ollama Provider ============

/// Embedder backed by a local Ollama instance.
///
/// Calls `POST /api/embed` on `embedding.url` (default `http://localhost:11434`).
/// Requires an embedding model to be pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/api/embed", base.trim_end_matches('/')),
            model: config.model.clone(),
            dims: config.dims.unwrap_or(768),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        })
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::Embedding("Invalid Ollama response: missing embeddings array".into())
        })?
        .iter()
        .map(|e| json_vector(e, "Ollama"))
        .collect()
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size.max(1)) {
            let body = serde_json::json!({ "model": self.model, "input": chunk });
            let json =
                post_with_retry(&self.client, &self.url, None, &body, self.max_retries, "Ollama")
                    .await?;
            out.extend(parse_ollama_response(&json)?);
        }
        Ok(out)
    }
}

// ============ Local Provider (fastembed) ============

/// Canonical local model name and its dimensionality.
///
/// Accepts both the short fastembed names and the Hugging Face repo ids.
pub fn resolve_local_model(name: &str, dims: Option<usize>) -> (String, usize) {
    let short = match name {
        "sentence-transformers/all-MiniLM-L6-v2" => "all-minilm-l6-v2",
        "BAAI/bge-small-en-v1.5" => "bge-small-en-v1.5",
        "BAAI/bge-base-en-v1.5" => "bge-base-en-v1.5",
        "BAAI/bge-large-en-v1.5" => "bge-large-en-v1.5",
        "nomic-ai/nomic-embed-text-v1.5" => "nomic-embed-text-v1.5",
        other => other,
    };

    let dims = dims.unwrap_or(match short {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" | "multilingual-e5-small" => 384,
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (short.to_string(), dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(RagError::Config(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base, \
             multilingual-e5-large",
            other
        ))),
    }
}

/// Embedder running a fastembed model in-process.
///
/// The model is loaded on first use and reused for every later call.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    fastembed_model: fastembed::EmbeddingModel,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(&config.model, config.dims);
        let fastembed_model = config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            fastembed_model,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let slot = Arc::clone(&self.model);
        let fastembed_model = self.fastembed_model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| RagError::Embedding("local embedding model lock poisoned".into()))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| {
                    RagError::Embedding(format!("Failed to initialize local embedding model: {e}"))
                })?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| RagError::Embedding("local embedding model unavailable".into()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| RagError::Embedding(format!("Local embedding failed: {e}")))
        })
        .await
        .map_err(RagError::embedding)?
    }
}

/// Create the [`Embedder`] named by `embedding.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(RagError::Config(
            "Local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        other => Err(RagError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Lazy construction ============

/// Builds the configured embedder on first use.
///
/// Model name and dimensionality come straight from the config, so commands
/// that only read or delete from the index never need provider credentials
/// or a local model.
pub struct LazyEmbedder {
    config: EmbeddingConfig,
    model_name: String,
    dims: usize,
    inner: tokio::sync::OnceCell<Arc<dyn Embedder>>,
}

impl LazyEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let (model_name, dims) = match config.provider.as_str() {
            "disabled" => ("disabled".to_string(), 0),
            "local" => resolve_local_model(&config.model, config.dims),
            "openai" => (config.model.clone(), config.dims.unwrap_or(1536)),
            _ => (config.model.clone(), config.dims.unwrap_or(768)),
        };
        Self {
            config: config.clone(),
            model_name,
            dims,
            inner: tokio::sync::OnceCell::new(),
        }
    }

    async fn get(&self) -> Result<&Arc<dyn Embedder>> {
        self.inner
            .get_or_try_init(|| async { create_embedder(&self.config) })
            .await
    }
}

#[async_trait]
impl Embedder for LazyEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.get().await?.encode_batch(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn ollama_config(url: String) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".into(),
            model: "nomic-embed-text".into(),
            dims: Some(2),
            batch_size: 2,
            max_retries: 0,
            timeout_secs: 5,
            url: Some(url),
        }
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        let err = DisabledEmbedder.encode("hello").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn lazy_embedder_builds_provider_on_first_encode() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(serde_json::json!({"embeddings": [[0.5, 0.5]]}));
        });

        let lazy = LazyEmbedder::new(&ollama_config(server.base_url()));
        assert_eq!(lazy.model_name(), "nomic-embed-text");
        assert_eq!(lazy.dims(), 2);
        mock.assert_calls(0);

        assert_eq!(lazy.encode("hello").await.unwrap(), vec![0.5, 0.5]);
        mock.assert_calls(1);
    }

    #[cfg(not(feature = "local-embeddings-fastembed"))]
    #[tokio::test]
    async fn lazy_local_embedder_defers_the_feature_error() {
        let lazy = LazyEmbedder::new(&EmbeddingConfig::default());
        assert_eq!(lazy.model_name(), "all-minilm-l6-v2");
        assert_eq!(lazy.dims(), 384);

        let err = lazy.encode("hello").await.unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn resolves_hugging_face_names() {
        let (name, dims) = resolve_local_model("sentence-transformers/all-MiniLM-L6-v2", None);
        assert_eq!(name, "all-minilm-l6-v2");
        assert_eq!(dims, 384);
        assert_eq!(resolve_local_model("bge-base-en-v1.5", None).1, 768);
        assert_eq!(resolve_local_model("bge-base-en-v1.5", Some(12)).1, 12);
    }

    #[test]
    fn openai_response_is_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let config = EmbeddingConfig {
            provider: "magic".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(create_embedder(&config), Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn ollama_batches_requests() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(serde_json::json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]}));
        });

        let embedder = OllamaEmbedder::new(&ollama_config(server.base_url())).unwrap();
        let texts: Vec<String> = (0..4).map(|i| format!("text {i}")).collect();
        let vectors = embedder.encode_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 4);
        mock.assert_calls(2);
    }

    #[tokio::test]
    async fn ollama_client_error_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(404).body("model not found");
        });

        let mut config = ollama_config(server.base_url());
        config.max_retries = 3;
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let err = embedder.encode("hello").await.unwrap_err();

        assert!(err.to_string().contains("404"));
        mock.assert_calls(1);
    }
}
