//! # Message RAG
//!
//! Question answering over a team's message history with source
//! attribution.
//!
//! Messages are embedded and stored in a local SQLite index. A question is
//! embedded, matched against the index, filtered by similarity, and sent
//! to an LLM together with the matching messages. The answer comes back
//! with the messages that grounded it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │ JSON input │──▶│  Ingestion   │──▶│  SQLite   │
//! │  messages  │   │ validate+emb │   │  vectors  │
//! └────────────┘   └──────────────┘   └─────┬─────┘
//!                                           │
//!                  ┌────────────────────────┤
//!                  ▼                        ▼
//!            ┌──────────┐  rate limit  ┌──────────┐
//!            │  Query   │──cache/retry▶│   LLM    │
//!            │  Engine  │              │ adapter  │
//!            └────┬─────┘              └──────────┘
//!                 ▼
//!          CLI (mrag) / HTTP
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mrag init                                   # create index and cache
//! mrag ingest data/messages.json              # index messages
//! mrag query "What was discussed about the budget?"
//! mrag serve                                  # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`app`] | Composition root |
//! | [`engine`] | Retrieval and answer orchestration |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | LLM completion clients |
//! | [`rate_limit`] | Sliding-window rate limiter |
//! | [`cache`] | TTL response cache |
//! | [`retry`] | Exponential-backoff retry |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`server`] | HTTP API |

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod query;
pub mod rate_limit;
pub mod retry;
pub mod server;
pub mod sqlite_store;
pub mod stats;
