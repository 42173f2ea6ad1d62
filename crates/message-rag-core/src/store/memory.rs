//! In-memory [`VectorStore`] implementation for tests and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Queries are brute-force
//! cosine distance over all stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{RagError, Result};
use crate::models::{EmbeddedRecord, Neighbor};

use super::{rank_neighbors, VectorStore};

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, EmbeddedRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored record, if present.
    pub fn get(&self, id: &str) -> Option<EmbeddedRecord> {
        self.records.read().ok()?.get(id).cloned()
    }
}

fn poisoned<T>(_: T) -> RagError {
    RagError::Store("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert_batch(&self, records: &[EmbeddedRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(poisoned)?;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let stored = self.records.read().map_err(poisoned)?;
        let neighbors = stored
            .values()
            .map(|r| Neighbor {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(vector, &r.vector),
            })
            .collect();
        Ok(rank_neighbors(neighbors, k))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.write().map_err(poisoned)?.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}
