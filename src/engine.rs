//! Query engine: retrieval, threshold filtering, prompt assembly, and the
//! guarded LLM call.
//!
//! ```text
//! question ─▶ rate limit ─▶ encode ─▶ top-k ─▶ filter(min_similarity)
//!                                                 │
//!                            empty? ─▶ fixed answer, no LLM call
//!                                                 │
//!          context + template ─▶ cache ─▶ retry(rate limit ─▶ LLM) ─▶ sources
//! ```
//!
//! Errors from the embedder, the store and the LLM propagate unchanged.
//! Only the empty-after-filter case is handled internally.

use std::sync::Arc;
use tracing::{debug, info, warn};

use message_rag_core::answer::{self, PromptTemplate};
use message_rag_core::models::QueryResponse;
use message_rag_core::store::DistanceMetric;
use message_rag_core::{IndexGateway, RagError, Result};

use crate::cache::ResponseCache;
use crate::llm::{CompletionOptions, LlmClient};
use crate::rate_limit::RateLimiter;
use crate::retry::{retry, RetryPolicy};

/// Retrieval parameters.
#[derive(Debug, Clone, Copy)]
pub struct QueryParams {
    pub top_k: usize,
    pub min_similarity: f64,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_similarity: 0.7,
        }
    }
}

pub struct QueryEngine {
    gateway: Arc<IndexGateway>,
    llm: Arc<dyn LlmClient>,
    limiter: Arc<RateLimiter>,
    cache: Option<Arc<ResponseCache>>,
    retry: RetryPolicy,
    prompts: PromptTemplate,
    params: QueryParams,
}

impl QueryEngine {
    /// Build an engine. Fails if the index does not rank by cosine distance,
    /// since similarity is derived as `1 - distance`.
    pub fn new(
        gateway: Arc<IndexGateway>,
        llm: Arc<dyn LlmClient>,
        limiter: Arc<RateLimiter>,
        params: QueryParams,
    ) -> Result<Self> {
        if gateway.metric() != DistanceMetric::Cosine {
            return Err(RagError::Config(format!(
                "index uses '{}' distance; similarity scores require cosine",
                gateway.metric().as_str()
            )));
        }
        Ok(Self {
            gateway,
            llm,
            limiter,
            cache: None,
            retry: RetryPolicy::default(),
            prompts: PromptTemplate::default(),
            params,
        })
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptTemplate) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn params(&self) -> QueryParams {
        self.params
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Answer `question` from the indexed messages.
    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        info!(question, "processing query");

        self.limiter.acquire().await;
        let vector = self.gateway.encode(question).await?;
        let retrieved = self
            .gateway
            .query_vector(&vector, self.params.top_k)
            .await?;
        let retrieved_count = retrieved.len();

        let results = answer::filter_by_similarity(retrieved, self.params.min_similarity);
        if results.is_empty() {
            warn!(
                retrieved = retrieved_count,
                min_similarity = self.params.min_similarity,
                "no relevant messages found for query"
            );
            return Ok(answer::empty_response());
        }

        let context = answer::format_context(&results);
        let prompt = self.prompts.render(&context, question);
        let answer = self.complete(&prompt).await?;

        let sources = answer::build_sources(&results);
        let num_sources = sources.len();
        info!(num_sources, "query completed");

        Ok(QueryResponse {
            answer,
            sources,
            context_used: results,
            num_sources,
        })
    }

    /// Cached, retried, rate-limited completion of a rendered prompt.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let model = self.llm.model_name().to_string();

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(prompt, &model) {
                debug!(model = %model, "response cache hit");
                return Ok(hit);
            }
        }

        let options = CompletionOptions::with_system(self.prompts.system.clone());
        let (llm, limiter, options) = (&self.llm, &self.limiter, &options);
        let answer = retry(&self.retry, || async move {
            limiter.acquire().await;
            llm.complete(prompt, options).await
        })
        .await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(prompt, &model, &answer) {
                warn!(error = %e, "failed to write response cache");
            }
        }

        Ok(answer)
    }
}
