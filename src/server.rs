//! HTTP API for querying and maintaining the message index.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/stats` | Message count, collection, rate-limit usage |
//! | `POST` | `/query` | Answer `{"question": "..."}` with sources |
//! | `POST` | `/ingest` | Index one message object or an array of them |
//! | `DELETE` | `/messages/{id}` | Delete one message |
//! | `DELETE` | `/messages` | Clear the collection |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `rate_limited` (429),
//! `upstream_unavailable` (503), `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! front ends.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use message_rag_core::answer::format_response;
use message_rag_core::ingest;
use message_rag_core::models::QueryResponse;
use message_rag_core::{ErrorKind, RagError};

use crate::app::App;
use crate::engine::QueryEngine;
use crate::rate_limit::RateLimitUsage;

/// Shared state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct ServerState {
    pub app: Arc<App>,
    pub engine: Arc<QueryEngine>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(app: App) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();
    let engine = Arc::new(app.query_engine()?);
    let state = ServerState {
        app: Arc::new(app),
        engine,
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Message RAG API listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/query", post(handle_query))
        .route("/ingest", post(handle_ingest))
        .route("/messages", delete(handle_clear))
        .route("/messages/{id}", delete(handle_delete))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"rate_limited"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::Format | ErrorKind::Validation => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ErrorKind::TransientApi => (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable"),
            ErrorKind::PermanentApi => (StatusCode::BAD_GATEWAY, "upstream_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /stats ============

#[derive(Serialize)]
struct StatsResponse {
    messages: usize,
    collection: String,
    persist_directory: String,
    rate_limit: RateLimitUsage,
}

async fn handle_stats(State(state): State<ServerState>) -> Result<Json<StatsResponse>, AppError> {
    let config = &state.app.config;
    Ok(Json(StatsResponse {
        messages: state.app.gateway.count().await?,
        collection: config.vector_db.collection_name.clone(),
        persist_directory: config.vector_db.persist_directory.display().to_string(),
        rate_limit: state.app.limiter.usage().await,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Serialize)]
struct QueryResponseBody {
    #[serde(flatten)]
    response: QueryResponse,
    /// Answer with the appended `Sources:` section, as the CLI prints it.
    formatted: String,
}

async fn handle_query(
    State(state): State<ServerState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponseBody>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let response = state.engine.query(question).await?;
    let formatted = format_response(&response);
    Ok(Json(QueryResponseBody {
        response,
        formatted,
    }))
}

// ============ POST /ingest ============

#[derive(Serialize)]
struct IngestResponse {
    accepted: usize,
    received: usize,
}

async fn handle_ingest(
    State(state): State<ServerState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<IngestResponse>, AppError> {
    let records = ingest::records_from_value(body)?;
    let accepted = ingest::ingest_batch(&state.app.gateway, &records).await?;
    Ok(Json(IngestResponse {
        accepted,
        received: records.len(),
    }))
}

// ============ DELETE /messages ============

async fn handle_delete(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.app.gateway.delete(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn handle_clear(
    State(state): State<ServerState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.app.gateway.clear().await?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}
