//! File-backed TTL cache for LLM responses.
//!
//! Entries are keyed by `sha256("{model}:{prompt}")` and stored one per
//! file as `{key}.json`. Writes go to a temporary file that is renamed into
//! place, so readers never see a partial entry. Expired and corrupt
//! entries are removed when they are read or swept.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use message_rag_core::{RagError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Unix seconds at write time.
    timestamp: f64,
    prompt: String,
    model: String,
    response: String,
}

pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
}

/// Stable cache key for a `(prompt, model)` pair.
pub fn cache_key(prompt: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b":");
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

impl ResponseCache {
    /// Open (creating if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, ttl })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn is_expired(&self, entry: &CacheEntry, now: f64) -> bool {
        now - entry.timestamp > self.ttl.as_secs_f64()
    }

    /// Read and parse an entry file. `Ok(None)` means no such file.
    fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| RagError::CacheCorruption(format!("{}: {e}", path.display())))
    }

    fn remove(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != IoErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove cache entry");
            }
        }
    }

    /// Cached response for `(prompt, model)`, if present and fresh.
    pub fn get(&self, prompt: &str, model: &str) -> Option<String> {
        let path = self.path_for(&cache_key(prompt, model));

        match Self::read_entry(&path) {
            Ok(None) => None,
            Ok(Some(entry)) if self.is_expired(&entry, now_secs()) => {
                debug!(path = %path.display(), "cache entry expired");
                Self::remove(&path);
                None
            }
            Ok(Some(entry)) => Some(entry.response),
            Err(e @ RagError::CacheCorruption(_)) => {
                warn!(error = %e, "removing corrupt cache entry");
                Self::remove(&path);
                None
            }
            Err(e) => {
                warn!(error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a response, replacing any existing entry.
    pub fn set(&self, prompt: &str, model: &str, response: &str) -> Result<()> {
        let key = cache_key(prompt, model);
        let entry = CacheEntry {
            timestamp: now_secs(),
            prompt: prompt.to_string(),
            model: model.to_string(),
            response: response.to_string(),
        };
        let body = serde_json::to_vec(&entry)
            .map_err(|e| RagError::CacheCorruption(format!("serialize entry: {e}")))?;

        let tmp = self
            .dir
            .join(format!("{key}.json.{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, self.path_for(&key)) {
            Self::remove(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for item in fs::read_dir(&self.dir)? {
            let path = item?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let mut count = 0;
        for path in self.entry_files()? {
            fs::remove_file(&path)?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove expired and unparseable entries. Returns the number removed.
    pub fn clear_expired(&self) -> Result<usize> {
        let now = now_secs();
        let mut count = 0;
        for path in self.entry_files()? {
            let stale = match Self::read_entry(&path) {
                Ok(Some(entry)) => self.is_expired(&entry, now),
                Ok(None) => false,
                Err(RagError::CacheCorruption(_)) => true,
                Err(e) => return Err(e),
            };
            if stale {
                Self::remove(&path);
                count += 1;
            }
        }
        Ok(count)
    }
}
