//! Embedding/Index gateway.
//!
//! [`IndexGateway`] pairs an [`Embedder`] with a [`VectorStore`] and owns
//! no business logic beyond encode, query and upsert. Both halves are
//! shared handles so the gateway can be cloned into the query engine, the
//! CLI and the HTTP server.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::{EmbeddedRecord, Message, SearchResult};
use crate::store::{DistanceMetric, VectorStore};

#[derive(Clone)]
pub struct IndexGateway {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl IndexGateway {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.store.metric()
    }

    pub async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.encode(text).await
    }

    pub async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedder.encode_batch(texts).await
    }

    /// Nearest neighbors for a pre-computed vector, highest similarity first.
    pub async fn query_vector(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let neighbors = self.store.query(vector, k).await?;
        Ok(neighbors.into_iter().map(SearchResult::from_neighbor).collect())
    }

    /// Encode `text` and return its `k` nearest stored messages.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        let vector = self.encode(text).await?;
        self.query_vector(&vector, k).await
    }

    /// Bulk-encode and bulk-upsert messages. Returns the number written.
    pub async fn add_messages(&self, messages: &[Message]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
        let vectors = self.encode_batch(&texts).await?;
        if vectors.len() != messages.len() {
            return Err(crate::RagError::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                messages.len()
            )));
        }

        let records: Vec<EmbeddedRecord> = messages
            .iter()
            .zip(vectors)
            .map(|(m, vector)| EmbeddedRecord {
                id: m.id.clone(),
                vector,
                text: m.content.clone(),
                metadata: m.index_metadata(),
            })
            .collect();

        self.store.upsert_batch(&records).await?;
        debug!(count = records.len(), "upserted messages");
        Ok(records.len())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }
}
