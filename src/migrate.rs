use sqlx::SqlitePool;

use message_rag_core::RagError;

/// Create the index schema. Safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), RagError> {
    // One row per (collection, message id); the vector is a little-endian f32 blob
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            vector BLOB NOT NULL,
            dims INTEGER NOT NULL,
            model TEXT,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(RagError::store)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(collection, updated_at DESC)",
    )
    .execute(pool)
    .await
    .map_err(RagError::store)?;

    Ok(())
}
