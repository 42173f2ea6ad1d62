//! # Message RAG Core
//!
//! Shared, runtime-agnostic logic for message-rag: data models, the error
//! taxonomy, store and embedder abstractions, the embedding/index gateway,
//! message ingestion, and answer assembly.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network clients.
//! Rate limiting, caching, retries and the concrete backends live in the
//! `message-rag` application crate.

pub mod answer;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod models;
pub mod store;

pub use error::{ErrorKind, RagError, Result};
pub use gateway::IndexGateway;
