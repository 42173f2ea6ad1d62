//! TOML configuration for `mrag`.
//!
//! Every section is optional and falls back to the defaults below. The
//! file is parsed once at startup by [`load_config`] and validated; any
//! problem is a [`RagError::Config`].
//!
//! ```toml
//! [vector_db]
//! persist_directory = "data/embeddings"
//! collection_name = "message_embeddings"
//!
//! [models]
//! default = "claude"
//!
//! [models.claude]
//! provider = "anthropic"
//! model_name = "claude-sonnet-4-20250514"
//!
//! [rag]
//! top_k = 3
//! min_similarity_score = 0.7
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use message_rag_core::answer::PromptTemplate;
use message_rag_core::RagError;

type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorDbConfig {
    #[serde(default = "default_persist_directory")]
    pub persist_directory: PathBuf,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    /// Similarity is derived as `1 - distance`, so only `"cosine"` is accepted.
    #[serde(default = "default_distance")]
    pub distance: String,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            persist_directory: default_persist_directory(),
            collection_name: default_collection_name(),
            distance: default_distance(),
        }
    }
}

impl VectorDbConfig {
    /// Path of the SQLite index file.
    pub fn db_path(&self) -> PathBuf {
        self.persist_directory.join("index.sqlite")
    }
}

fn default_persist_directory() -> PathBuf {
    PathBuf::from("data/embeddings")
}
fn default_collection_name() -> String {
    "message_embeddings".to_string()
}
fn default_distance() -> String {
    "cosine".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, `ollama`, or `local`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Base URL override (Ollama host, OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

/// `[models]`: the name of the default model plus one table per model.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_model_key")]
    pub default: String,
    #[serde(flatten)]
    pub entries: HashMap<String, ModelConfig>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            default_model_key(),
            ModelConfig {
                provider: default_llm_provider(),
                model_name: "claude-sonnet-4-20250514".to_string(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                api_base: None,
                timeout_secs: default_llm_timeout(),
            },
        );
        Self {
            default: default_model_key(),
            entries,
        }
    }
}

impl ModelsConfig {
    /// The model named by `models.default`.
    pub fn default_model(&self) -> Result<&ModelConfig> {
        self.entries.get(&self.default).ok_or_else(|| {
            RagError::Config(format!(
                "models.default = '{}' but no [models.{}] table is defined",
                self.default, self.default
            ))
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// `anthropic` or `ollama`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    pub model_name: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_model_key() -> String {
    "claude".to_string()
}
fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity_score: f64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity_score: default_min_similarity(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_min_similarity() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_directory(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_directory() -> PathBuf {
    PathBuf::from("data/cache")
}
fn default_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_requests_per_minute() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_backoff() -> f64 {
    2.0
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptsConfig {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub query_template: Option<String>,
}

impl PromptsConfig {
    /// Configured prompts, with built-in defaults for anything unset.
    pub fn template(&self) -> PromptTemplate {
        let builtin = PromptTemplate::default();
        PromptTemplate {
            system: self.system.clone().unwrap_or(builtin.system),
            query: self.query_template.clone().unwrap_or(builtin.query),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// If set, a daily-rolling log file is written here as well.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Check value ranges and cross-field references.
    pub fn validate(&self) -> Result<()> {
        if self.vector_db.collection_name.trim().is_empty() {
            return Err(RagError::Config(
                "vector_db.collection_name must not be empty".to_string(),
            ));
        }
        if self.vector_db.distance != "cosine" {
            return Err(RagError::Config(format!(
                "vector_db.distance must be 'cosine' (got '{}'); similarity scores assume cosine space",
                self.vector_db.distance
            )));
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => {
                return Err(RagError::Config(format!(
                    "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                    other
                )))
            }
        }
        if self.embedding.is_enabled() && self.embedding.model.trim().is_empty() {
            return Err(RagError::Config(format!(
                "embedding.model must be specified when provider is '{}'",
                self.embedding.provider
            )));
        }
        if self.embedding.dims == Some(0) {
            return Err(RagError::Config("embedding.dims must be > 0".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::Config("embedding.batch_size must be > 0".to_string()));
        }

        let model = self.models.default_model()?;
        for (name, entry) in &self.models.entries {
            match entry.provider.as_str() {
                "anthropic" | "ollama" => {}
                other => {
                    return Err(RagError::Config(format!(
                        "models.{}.provider: unknown provider '{}'. Must be anthropic or ollama.",
                        name, other
                    )))
                }
            }
        }
        if !(0.0..=1.0).contains(&model.temperature) {
            return Err(RagError::Config(format!(
                "models.{}.temperature must be in [0.0, 1.0]",
                self.models.default
            )));
        }
        if model.max_tokens == 0 {
            return Err(RagError::Config(format!(
                "models.{}.max_tokens must be > 0",
                self.models.default
            )));
        }

        if self.rag.top_k < 1 {
            return Err(RagError::Config("rag.top_k must be >= 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.rag.min_similarity_score) {
            return Err(RagError::Config(
                "rag.min_similarity_score must be in [0.0, 1.0]".to_string(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(RagError::Config("cache.ttl_secs must be > 0".to_string()));
        }
        if self.rate_limit.requests_per_minute < 1 {
            return Err(RagError::Config(
                "rate_limit.requests_per_minute must be >= 1".to_string(),
            ));
        }
        if !self.retry.backoff.is_finite() || self.retry.backoff < 1.0 {
            return Err(RagError::Config(
                "retry.backoff must be a finite number >= 1.0".to_string(),
            ));
        }

        let template = self.prompts.template();
        for placeholder in ["{context}", "{question}"] {
            if !template.query.contains(placeholder) {
                return Err(RagError::Config(format!(
                    "prompts.query_template must contain {}",
                    placeholder
                )));
            }
        }

        Ok(())
    }
}

/// Read, parse and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagError::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    parse_config(&content)
}

/// Parse and validate TOML config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| RagError::Config(format!("Failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.rag.top_k, 3);
        assert!((cfg.rag.min_similarity_score - 0.7).abs() < 1e-12);
        assert_eq!(cfg.vector_db.collection_name, "message_embeddings");
        assert_eq!(cfg.server.bind, "127.0.0.1:8501");
        assert_eq!(cfg.models.default_model().unwrap().max_tokens, 4096);
        assert_eq!(
            cfg.vector_db.db_path(),
            PathBuf::from("data/embeddings/index.sqlite")
        );
    }

    #[test]
    fn parses_named_models() {
        let cfg = parse_config(
            r#"
            [models]
            default = "local"

            [models.local]
            provider = "ollama"
            model_name = "llama3"
            temperature = 0.2
            "#,
        )
        .unwrap();
        let model = cfg.models.default_model().unwrap();
        assert_eq!(model.provider, "ollama");
        assert_eq!(model.model_name, "llama3");
        assert_eq!(model.max_tokens, 4096);
    }

    #[test]
    fn default_must_name_a_model() {
        let err = parse_config(
            r#"
            [models]
            default = "missing"
            [models.claude]
            model_name = "claude-sonnet-4-20250514"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn rejects_non_cosine_distance() {
        let err = parse_config("[vector_db]\ndistance = \"l2\"\n").unwrap_err();
        assert!(err.to_string().contains("cosine"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse_config("[rag]\ntop_k = 0\n").is_err());
        assert!(parse_config("[rag]\nmin_similarity_score = 1.5\n").is_err());
        assert!(parse_config("[retry]\nbackoff = 0.5\n").is_err());
        assert!(parse_config("[retry]\nbackoff = inf\n").is_err());
        assert!(parse_config("[retry]\nbackoff = nan\n").is_err());
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[prompts]\nquery_template = \"{question}\"\n").is_err());
    }

    #[test]
    fn prompts_fall_back_to_builtin() {
        let cfg = parse_config("[prompts]\nsystem = \"Be brief.\"\n").unwrap();
        let template = cfg.prompts.template();
        assert_eq!(template.system, "Be brief.");
        assert_eq!(template.query, PromptTemplate::default().query);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        assert!(matches!(
            parse_config("[rag\ntop_k = 3"),
            Err(RagError::Config(_))
        ));
    }
}
