//! Composition root.
//!
//! [`App::open`] builds every long-lived component once: the SQLite store,
//! the embedder, the gateway, the rate limiter and the response cache.
//! The concrete embedder is built on first encode and the LLM client only
//! by [`App::query_engine`], so commands that never embed or call the model
//! need no credentials.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use message_rag_core::embedding::Embedder;
use message_rag_core::{IndexGateway, RagError, Result};

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::db;
use crate::embedding::LazyEmbedder;
use crate::engine::{QueryEngine, QueryParams};
use crate::llm::{self, LlmClient};
use crate::migrate;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sqlite_store::SqliteStore;

pub struct App {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub gateway: Arc<IndexGateway>,
    pub limiter: Arc<RateLimiter>,
    pub cache: Option<Arc<ResponseCache>>,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(LazyEmbedder::new(&config.embedding));

        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        let store = Arc::new(
            SqliteStore::new(pool, config.vector_db.collection_name.clone())
                .with_model(embedder.model_name()),
        );

        let gateway = Arc::new(IndexGateway::new(embedder, store.clone()));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.requests_per_minute));
        let cache = open_cache(config)?;

        debug!(
            collection = %config.vector_db.collection_name,
            persist_directory = %config.vector_db.persist_directory.display(),
            "opened index"
        );

        Ok(Self {
            config: config.clone(),
            store,
            gateway,
            limiter,
            cache,
        })
    }

    /// Build the query engine with the configured default model.
    pub fn query_engine(&self) -> Result<QueryEngine> {
        let model = self.config.models.default_model()?;
        self.query_engine_with(llm::create_client(model)?)
    }

    /// Build the query engine around an already constructed LLM client.
    pub fn query_engine_with(&self, client: Arc<dyn LlmClient>) -> Result<QueryEngine> {
        let params = QueryParams {
            top_k: self.config.rag.top_k,
            min_similarity: self.config.rag.min_similarity_score,
        };

        let mut engine = QueryEngine::new(
            Arc::clone(&self.gateway),
            client,
            Arc::clone(&self.limiter),
            params,
        )?
        .with_retry(RetryPolicy::from_config(&self.config.retry))
        .with_prompts(self.config.prompts.template());

        if let Some(cache) = &self.cache {
            engine = engine.with_cache(Arc::clone(cache));
        }
        Ok(engine)
    }
}

/// The response cache, or `None` when `cache.enabled = false`.
pub fn open_cache(config: &Config) -> Result<Option<Arc<ResponseCache>>> {
    if !config.cache.enabled {
        return Ok(None);
    }
    let cache = ResponseCache::new(
        config.cache.directory.clone(),
        Duration::from_secs(config.cache.ttl_secs),
    )
    .map_err(|e| {
        RagError::Config(format!(
            "cannot open cache directory {}: {e}",
            config.cache.directory.display()
        ))
    })?;
    Ok(Some(Arc::new(cache)))
}
