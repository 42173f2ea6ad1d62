use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use message_rag::config::ModelConfig;
use message_rag::llm::{AnthropicClient, ChatMessage, CompletionOptions, LlmClient, OllamaClient};
use message_rag_core::ErrorKind;

fn model_config(provider: &str, api_base: String) -> ModelConfig {
    ModelConfig {
        provider: provider.to_string(),
        model_name: "test-model".to_string(),
        max_tokens: 256,
        temperature: 0.2,
        api_base: Some(api_base),
        timeout_secs: 5,
    }
}

fn anthropic(server: &MockServer) -> AnthropicClient {
    AnthropicClient::new(&model_config("anthropic", server.base_url()), "test-anthropic-key")
        .expect("anthropic client should be created")
}

#[tokio::test]
async fn anthropic_sends_system_prompt_and_joins_text_blocks() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .header("x-api-key", "test-anthropic-key")
            .header("anthropic-version", "2023-06-01")
            .json_body_includes(
                json!({
                    "model": "test-model",
                    "max_tokens": 256,
                    "system": "answer briefly",
                    "messages": [{"role": "user", "content": "hello"}]
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "content": [
                {"type": "text", "text": "Hello, "},
                {"type": "text", "text": "world."}
            ],
            "stop_reason": "end_turn"
        }));
    });

    let answer = anthropic(&server)
        .complete("hello", &CompletionOptions::with_system("answer briefly"))
        .await
        .expect("completion should succeed");

    assert_eq!(answer, "Hello, world.");
    mock.assert_calls(1);
}

#[tokio::test]
async fn anthropic_429_is_rate_limited() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(429).body("slow down");
    });

    let err = anthropic(&server)
        .complete("hello", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn anthropic_overloaded_is_transient() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(529).body("overloaded");
    });

    let err = anthropic(&server)
        .complete("hello", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientApi);
}

#[tokio::test]
async fn anthropic_bad_request_is_permanent() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(400).body("bad request");
    });

    let err = anthropic(&server)
        .complete("hello", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermanentApi);
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn anthropic_undecodable_body_is_permanent() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(200).body("not json");
    });

    let err = anthropic(&server)
        .complete("hello", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermanentApi);
}

#[test]
fn anthropic_rejects_empty_key() {
    let err = AnthropicClient::new(&model_config("anthropic", "http://localhost".into()), " ")
        .err()
        .expect("empty key should be rejected");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn ollama_puts_system_prompt_first_and_disables_streaming() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat").json_body_includes(
            json!({
                "model": "test-model",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "budget?"}
                ],
                "options": {"num_predict": 256}
            })
            .to_string(),
        );
        then.status(200).json_body(json!({
            "model": "test-model",
            "message": {"role": "assistant", "content": "It was discussed."},
            "done": true
        }));
    });

    let client = OllamaClient::new(&model_config("ollama", server.base_url())).unwrap();
    let answer = client
        .chat(
            &[
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::user("budget?"),
            ],
            &CompletionOptions::with_system("be terse"),
        )
        .await
        .unwrap();

    assert_eq!(answer, "It was discussed.");
    mock.assert_calls(1);
}

#[tokio::test]
async fn ollama_server_error_is_transient() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(500).body("boom");
    });

    let client = OllamaClient::new(&model_config("ollama", server.base_url())).unwrap();
    let err = client
        .complete("hi", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientApi);
}

/// Serves response headers and a partial body, then stalls.
async fn stalled_body_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 16 * 1024];
        let _ = socket.read(&mut request).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                  content-length: 4096\r\n\r\n{\"content\": [",
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn body_read_timeout_is_transient() {
    let mut config = model_config("anthropic", stalled_body_server().await);
    config.timeout_secs = 1;
    let client = AnthropicClient::new(&config, "test-anthropic-key").unwrap();

    let err = client
        .complete("hello", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientApi, "{err}");
}

#[tokio::test]
async fn ollama_body_read_timeout_is_transient() {
    let mut config = model_config("ollama", stalled_body_server().await);
    config.timeout_secs = 1;
    let client = OllamaClient::new(&config).unwrap();

    let err = client
        .complete("hi", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientApi, "{err}");
}
