//! Vector index abstraction for message-rag.
//!
//! The [`VectorStore`] trait defines the nearest-neighbor index the
//! gateway writes to and queries, enabling pluggable backends (SQLite,
//! in-memory).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EmbeddedRecord, Neighbor};

/// Distance function an index ranks by.
///
/// Similarity is derived as `1 - distance`, which is only meaningful for
/// [`DistanceMetric::Cosine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    InnerProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "l2",
            DistanceMetric::InnerProduct => "ip",
        }
    }
}

/// Abstract nearest-neighbor index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_batch`](VectorStore::upsert_batch) | Insert or overwrite records by id |
/// | [`query`](VectorStore::query) | `k` nearest neighbors, ascending distance |
/// | [`delete`](VectorStore::delete) | Remove one record |
/// | [`clear`](VectorStore::clear) | Remove every record in the collection |
/// | [`count`](VectorStore::count) | Number of stored records |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Distance function used by [`query`](VectorStore::query).
    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }

    /// Insert or overwrite records. Within one batch, the last record for a
    /// given id wins.
    async fn upsert_batch(&self, records: &[EmbeddedRecord]) -> Result<()>;

    /// Insert or overwrite a single record.
    async fn upsert(&self, record: EmbeddedRecord) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(&record)).await
    }

    /// Return up to `k` records ordered by ascending distance.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Delete a record by id. Deleting an absent id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// Sort neighbors by ascending distance, ties by id, and keep the first `k`.
pub fn rank_neighbors(mut neighbors: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    neighbors.truncate(k);
    neighbors
}
