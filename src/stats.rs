//! Index statistics.
//!
//! Prints what is indexed: message count, where it lives, when it last
//! changed, and how many cached responses exist. Used by `mrag stats`.

use anyhow::Result;

use crate::app::App;

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(app: &App) -> Result<()> {
    let config = &app.config;
    let count = app.gateway.count().await?;
    let last_updated = app.store.last_updated().await?;

    let db_path = config.vector_db.db_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Message RAG Index Stats");
    println!("=======================");
    println!();
    println!("  Messages:          {}", count);
    println!("  Collection:        {}", config.vector_db.collection_name);
    println!(
        "  Persist directory: {}",
        config.vector_db.persist_directory.display()
    );
    println!("  Index size:        {}", format_bytes(db_size));
    println!(
        "  Last updated:      {}",
        last_updated
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!("  Embedding model:   {}", app.gateway.embedder().model_name());

    match &app.cache {
        Some(cache) => {
            let entries = std::fs::read_dir(cache.dir())
                .map(|dir| {
                    dir.filter_map(|e| e.ok())
                        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                        .count()
                })
                .unwrap_or(0);
            println!(
                "  Cached responses:  {} (ttl {}s)",
                entries,
                cache.ttl().as_secs()
            );
        }
        None => println!("  Cached responses:  disabled"),
    }

    let usage = app.limiter.usage().await;
    println!(
        "  Rate limit:        {}/{} requests per minute",
        usage.current_requests, usage.max_requests
    );
    println!();

    Ok(())
}

/// Human-readable size: `512 B`, `2.0 KB`, `5.0 MB`.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Age of a Unix timestamp, e.g. `3 hours ago`. Older than a month (or in
/// the future) falls back to an absolute UTC time.
fn format_ts_relative(ts: i64) -> String {
    let age = chrono::Utc::now().timestamp() - ts;
    let (count, unit) = match age {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (age / 60, "min"),
        3_600..=86_399 => (age / 3_600, "hour"),
        86_400..=2_591_999 => (age / 86_400, "day"),
        _ => {
            return chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| ts.to_string())
        }
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} {unit}{plural} ago")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn formats_relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
