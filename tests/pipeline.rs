//! End-to-end retrieval and answering over a SQLite-backed index.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use message_rag::app::App;
use message_rag::config::Config;
use message_rag::db;
use message_rag::engine::{QueryEngine, QueryParams};
use message_rag::llm::{ChatMessage, CompletionOptions, LlmClient};
use message_rag::migrate::run_migrations;
use message_rag::rate_limit::RateLimiter;
use message_rag::server::{router, ServerState};
use message_rag::sqlite_store::SqliteStore;
use message_rag_core::answer::{format_response, NO_RESULTS_ANSWER};
use message_rag_core::embedding::Embedder;
use message_rag_core::ingest::ingest_batch;
use message_rag_core::store::VectorStore;
use message_rag_core::{IndexGateway, Result};

const VOCABULARY: [&str; 9] = [
    "budget",
    "q2",
    "allocation",
    "feature",
    "ready",
    "deploy",
    "feedback",
    "customer",
    "discuss",
];

/// One dimension per vocabulary word present in the text.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keywords"
    }

    fn dims(&self) -> usize {
        VOCABULARY.len()
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

struct CountingLlm {
    calls: AtomicUsize,
}

impl CountingLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for CountingLlm {
    fn model_name(&self) -> &str {
        "counting"
    }

    async fn chat(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(messages[0].content.contains("Author: Alice"));
        Ok("Alice raised the Q2 budget allocation.".to_string())
    }
}

fn conversation() -> Vec<Value> {
    vec![
        json!({
            "message_id": "msg-1",
            "url": "https://chat.example.com/c/general/1",
            "author": "Alice",
            "timestamp": "2025-01-15T10:30:00Z",
            "content": "We need to discuss the budget allocation for Q2.",
            "metadata": {"channel": "general", "tags": ["finance"]}
        }),
        json!({
            "message_id": "msg-2",
            "url": "https://chat.example.com/c/eng/2",
            "author": "Bob",
            "timestamp": "2025-01-15T11:00:00Z",
            "content": "The new feature is ready for deployment."
        }),
        json!({
            "message_id": "msg-3",
            "url": "https://chat.example.com/c/support/3",
            "author": "Charlie",
            "timestamp": "2025-01-15T12:00:00Z",
            "content": "Customer feedback on the dashboard has been positive."
        }),
    ]
}

async fn sqlite_gateway(tmp: &TempDir) -> (Arc<SqliteStore>, Arc<IndexGateway>) {
    let pool = db::connect_path(&tmp.path().join("index.sqlite")).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool, "messages").with_model("keywords"));
    let gateway = Arc::new(IndexGateway::new(Arc::new(KeywordEmbedder), store.clone()));
    (store, gateway)
}

fn engine(gateway: Arc<IndexGateway>, llm: Arc<CountingLlm>, min_similarity: f64) -> QueryEngine {
    QueryEngine::new(
        gateway,
        llm,
        Arc::new(RateLimiter::new(60)),
        QueryParams {
            top_k: 3,
            min_similarity,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn budget_question_cites_alice() {
    let tmp = TempDir::new().unwrap();
    let (_store, gateway) = sqlite_gateway(&tmp).await;
    assert_eq!(ingest_batch(&gateway, &conversation()).await.unwrap(), 3);

    let llm = CountingLlm::new();
    let response = engine(gateway, llm.clone(), 0.0)
        .query("What was discussed about the budget?")
        .await
        .unwrap();

    assert_eq!(llm.calls(), 1);
    assert!(response.num_sources >= 1);
    assert_eq!(response.num_sources, response.sources.len());
    assert_eq!(response.sources[0].author, "Alice");
    assert_eq!(response.context_used[0].id, "msg-1");
    assert!(response.sources.windows(2).all(|w| w[0].score >= w[1].score));

    let formatted = format_response(&response);
    assert!(formatted.starts_with("Alice raised the Q2 budget allocation."));
    assert!(formatted.contains("\n\nSources:\n"));
    assert!(formatted.contains(
        "- We need to discuss the budget allocation for Q2. by Alice \
         (https://chat.example.com/c/general/1)"
    ));
}

#[tokio::test]
async fn strict_threshold_skips_the_model() {
    let tmp = TempDir::new().unwrap();
    let (_store, gateway) = sqlite_gateway(&tmp).await;
    ingest_batch(&gateway, &conversation()).await.unwrap();

    let llm = CountingLlm::new();
    let response = engine(gateway, llm.clone(), 0.99)
        .query("What was discussed about the budget?")
        .await
        .unwrap();

    assert_eq!(llm.calls(), 0);
    assert_eq!(response.answer, NO_RESULTS_ANSWER);
    assert_eq!(response.num_sources, 0);
    assert_eq!(format_response(&response), NO_RESULTS_ANSWER);
}

#[tokio::test]
async fn reingesting_overwrites_by_message_id() {
    let tmp = TempDir::new().unwrap();
    let (store, gateway) = sqlite_gateway(&tmp).await;
    ingest_batch(&gateway, &conversation()).await.unwrap();

    let mut edited = conversation();
    edited[0]["content"] = json!("Budget discussion moved to Thursday.");
    edited.push(json!({"message_id": "broken", "author": "Eve"}));
    assert_eq!(ingest_batch(&gateway, &edited).await.unwrap(), 3);

    assert_eq!(store.count().await.unwrap(), 3);
    let hits = gateway.search("budget", 1).await.unwrap();
    assert_eq!(hits[0].id, "msg-1");
    assert_eq!(hits[0].content, "Budget discussion moved to Thursday.");
    assert_eq!(hits[0].meta_or("channel", ""), "general");
}

#[tokio::test]
async fn http_query_returns_formatted_answer() {
    let tmp = TempDir::new().unwrap();
    let (store, gateway) = sqlite_gateway(&tmp).await;

    let mut config = Config::default();
    config.rag.min_similarity_score = 0.0;
    config.vector_db.persist_directory = tmp.path().to_path_buf();
    config.vector_db.collection_name = "messages".to_string();
    let app = App {
        config,
        store,
        gateway,
        limiter: Arc::new(RateLimiter::new(60)),
        cache: None,
    };
    let llm = CountingLlm::new();
    let engine = Arc::new(app.query_engine_with(llm.clone()).unwrap());
    let state = ServerState {
        app: Arc::new(app),
        engine,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let ingest: Value = client
        .post(format!("{base}/ingest"))
        .json(&conversation())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ingest["accepted"], 3);
    assert_eq!(ingest["received"], 3);

    let empty = client
        .post(format!("{base}/query"))
        .json(&json!({"question": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
    let body: Value = empty.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let answered: Value = client
        .post(format!("{base}/query"))
        .json(&json!({"question": "What was discussed about the budget?"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answered["answer"], "Alice raised the Q2 budget allocation.");
    assert_eq!(answered["sources"][0]["author"], "Alice");
    assert!(answered["formatted"]
        .as_str()
        .unwrap()
        .contains("Sources:"));
    assert_eq!(llm.calls(), 1);

    let deleted: Value = client
        .delete(format!("{base}/messages/msg-2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], "msg-2");

    let stats: Value = client
        .get(format!("{base}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["messages"], 2);
    assert_eq!(stats["collection"], "messages");
}
