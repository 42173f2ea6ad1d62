use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use message_rag_core::RagError;

use crate::config::Config;

/// Open the index database under `vector_db.persist_directory`.
pub async fn connect(config: &Config) -> Result<SqlitePool, RagError> {
    connect_path(&config.vector_db.db_path()).await
}

pub async fn connect_path(db_path: &Path) -> Result<SqlitePool, RagError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(RagError::store)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(RagError::store)?;

    Ok(pool)
}
