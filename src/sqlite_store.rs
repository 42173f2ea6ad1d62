//! SQLite-backed [`VectorStore`].
//!
//! Records live in the `records` table keyed by `(collection, id)`.
//! Vectors are stored as little-endian f32 blobs and queried by brute-force
//! cosine distance in Rust, which is fast enough for message-history
//! collections of a few hundred thousand rows.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use message_rag_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use message_rag_core::models::{EmbeddedRecord, Metadata, Neighbor};
use message_rag_core::store::{rank_neighbors, VectorStore};
use message_rag_core::{RagError, Result};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    model: Option<String>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
            model: None,
        }
    }

    /// Record the embedding model name alongside each written vector.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Unix time of the most recent write to this collection.
    pub async fn last_updated(&self) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT MAX(updated_at) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_batch(&self, records: &[EmbeddedRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(RagError::store)?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)
                .map_err(|e| RagError::Store(format!("metadata serialization: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO records (collection, id, content, metadata_json, vector, dims, model, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    content = excluded.content,
                    metadata_json = excluded.metadata_json,
                    vector = excluded.vector,
                    dims = excluded.dims,
                    model = excluded.model,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&record.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(self.model.as_deref())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;
        }

        tx.commit().await.map_err(RagError::store)?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query(
            "SELECT id, content, metadata_json, vector FROM records WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::store)?;

        let mut neighbors = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("vector");
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = match serde_json::from_str(&metadata_json) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(
                        message_id = %id,
                        collection = %self.collection,
                        error = %e,
                        "unreadable metadata, returning record without it"
                    );
                    Metadata::new()
                }
            };
            neighbors.push(Neighbor {
                id,
                text: row.get("content"),
                metadata,
                distance: cosine_distance(vector, &blob_to_vec(&blob)),
            });
        }

        Ok(rank_neighbors(neighbors, k))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(&self.collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::store)?;
        Ok(count as usize)
    }
}
