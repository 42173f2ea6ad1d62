//! Error taxonomy shared by every layer of the pipeline.
//!
//! Each variant corresponds to one failure kind. [`RagError::kind`] exposes a
//! `Copy` discriminant so retry policies and HTTP handlers can match on the
//! kind without consuming the error.

use thiserror::Error;

/// Result alias used across the core crate.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or malformed configuration or credentials. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Ingestion input that is neither a JSON object nor an array of objects.
    #[error("format error: {0}")]
    Format(String),

    /// A message record missing a required field or with empty content.
    #[error("validation error: {0}")]
    Validation(String),

    /// Retryable upstream failure (5xx, timeout, connection reset).
    #[error("transient API error: {0}")]
    TransientApi(String),

    /// Upstream asked us to slow down (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-retryable upstream failure.
    #[error("API error: {0}")]
    PermanentApi(String),

    /// Unreadable cache entry. Internal only: the cache deletes the entry and
    /// reports a miss.
    #[error("corrupt cache entry: {0}")]
    CacheCorruption(String),

    /// Vector index failure.
    #[error("store error: {0}")]
    Store(String),

    /// Embedding model failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Format,
    Validation,
    TransientApi,
    RateLimited,
    PermanentApi,
    CacheCorruption,
    Store,
    Embedding,
    Io,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Config(_) => ErrorKind::Config,
            RagError::Format(_) => ErrorKind::Format,
            RagError::Validation(_) => ErrorKind::Validation,
            RagError::TransientApi(_) => ErrorKind::TransientApi,
            RagError::RateLimited(_) => ErrorKind::RateLimited,
            RagError::PermanentApi(_) => ErrorKind::PermanentApi,
            RagError::CacheCorruption(_) => ErrorKind::CacheCorruption,
            RagError::Store(_) => ErrorKind::Store,
            RagError::Embedding(_) => ErrorKind::Embedding,
            RagError::Io(_) => ErrorKind::Io,
        }
    }

    /// Wrap any displayable backend error as a [`RagError::Store`].
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        RagError::Store(err.to_string())
    }

    /// Wrap any displayable backend error as a [`RagError::Embedding`].
    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }
}
