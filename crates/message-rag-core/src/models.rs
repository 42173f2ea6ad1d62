//! Core data models used throughout message-rag.
//!
//! These types represent the messages, index records, and query responses
//! that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat string metadata stored next to each record in the index.
///
/// Keys written by ingestion: `url`, `author`, `timestamp`, `channel`, `tags`.
pub type Metadata = BTreeMap<String, String>;

/// Optional nested metadata attached to an input message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub channel: String,
    /// Tags in first-seen order, without duplicates.
    pub tags: Vec<String>,
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self {
            channel: "unknown".to_string(),
            tags: Vec::new(),
        }
    }
}

/// A validated, normalized message ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub url: String,
    pub author: String,
    /// ISO-8601 timestamp, kept verbatim from the input.
    pub timestamp: String,
    pub content: String,
    pub metadata: MessageMetadata,
}

impl Message {
    /// Flatten into the metadata map stored in the index.
    ///
    /// Tags are joined with commas.
    pub fn index_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("url".to_string(), self.url.clone());
        meta.insert("author".to_string(), self.author.clone());
        meta.insert("timestamp".to_string(), self.timestamp.clone());
        meta.insert("channel".to_string(), self.metadata.channel.clone());
        meta.insert("tags".to_string(), self.metadata.tags.join(","));
        meta
    }
}

/// A record as stored in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// A nearest neighbor as returned by a [`VectorStore`](crate::store::VectorStore).
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine distance, `0.0` = identical direction.
    pub distance: f64,
}

/// A retrieved message with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// `1 - cosine distance`; `1.0` = identical.
    pub score: f64,
}

impl SearchResult {
    pub fn from_neighbor(n: Neighbor) -> Self {
        Self {
            id: n.id,
            content: n.text,
            metadata: n.metadata,
            score: 1.0 - n.distance,
        }
    }

    /// Metadata value for `key`, or `default` when absent.
    pub fn meta_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.metadata.get(key).map(String::as_str).unwrap_or(default)
    }
}

/// Attribution for one message used to ground an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub author: String,
    pub timestamp: String,
    pub score: f64,
    /// At most 100 characters of content, plus `"..."` when truncated.
    pub content_preview: String,
}

/// The answer to a question together with the messages that grounded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub context_used: Vec<SearchResult>,
    pub num_sources: usize,
}
