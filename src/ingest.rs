//! `mrag ingest`: load a JSON file of messages and index the valid ones.

use anyhow::{Context, Result};
use std::path::Path;

use message_rag_core::ingest;

use crate::app::App;

/// Ingest `path`, returning `(accepted, received)`.
pub async fn ingest_file(app: &App, path: &Path) -> Result<(usize, usize)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read messages file: {}", path.display()))?;
    let records = ingest::load(&raw)?;
    let accepted = ingest::ingest_batch(&app.gateway, &records).await?;
    Ok((accepted, records.len()))
}

pub async fn run_ingest(app: &App, path: &Path) -> Result<()> {
    let (accepted, received) = ingest_file(app, path).await?;
    let total = app.gateway.count().await?;

    println!("Ingested {} of {} messages from {}", accepted, received, path.display());
    if accepted < received {
        println!("  Skipped: {} invalid (see warnings)", received - accepted);
    }
    println!("  Total messages in index: {}", total);
    Ok(())
}
