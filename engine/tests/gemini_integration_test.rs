//! Integration tests for the Gemini client
//!
//! Runs generateContent / embedContent against a mock server.

use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use triad_engine::config::GeminiConfig;
use triad_engine::llm::gemini::GeminiClient;
use triad_engine::llm::{EmbeddingTask, Embedder, LLMError, TextGenerator};

const GENERATE_PATH: &str = "/models/gemini-2.5-flash:generateContent";
const EMBED_PATH: &str = "/models/gemini-embedding-001:embedContent";

fn client(server: &MockServer, dimension: usize) -> GeminiClient {
    let config = GeminiConfig {
        base_url: server.uri(),
        ..GeminiConfig::default()
    };
    GeminiClient::new(config, "test-key", dimension, Duration::from_secs(5)).unwrap()
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]}
        }]
    })
}

#[tokio::test]
async fn test_generate_returns_candidate_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "Break this goal into steps:\nship it"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("1. Build\n2. Ship")))
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server, 8)
        .generate("Break this goal into steps:\nship it")
        .await
        .unwrap();
    assert_eq!(text, "1. Build\n2. Ship");
}

#[tokio::test]
async fn test_generate_empty_completion_is_generation_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  ")))
        .mount(&server)
        .await;

    match client(&server, 8).generate("hello").await {
        Err(LLMError::Generation(msg)) => assert_eq!(msg, "Empty completion"),
        other => panic!("Expected Generation error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_generate_429_is_quota_with_retry_delay() {
    let server = MockServer::start().await;

    let body = "429 RESOURCE_EXHAUSTED. Quota exceeded for metric: \
                generate_content_free_tier_requests, limit: 20, model: gemini-2.5-flash. \
                Please retry in 46.69s.";
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string(body))
        .mount(&server)
        .await;

    match client(&server, 8).generate("hello").await {
        Err(LLMError::QuotaExceeded(info)) => {
            let retry = info.retry_after_secs.unwrap();
            assert!((retry - 46.69).abs() < 1e-6);
            assert_eq!(info.model.as_deref(), Some("gemini-2.5-flash"));
            assert_eq!(info.limit, Some(20));
        }
        other => panic!("Expected QuotaExceeded, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_generate_quota_text_in_error_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("Resource_Exhausted: try later"),
        )
        .mount(&server)
        .await;

    let err = client(&server, 8).generate("hello").await.unwrap_err();
    assert!(err.quota().is_some());
    assert!(err.quota().unwrap().retry_after_secs.is_none());
}

#[tokio::test]
async fn test_generate_server_error_is_generation_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    match client(&server, 8).generate("hello").await {
        Err(LLMError::Generation(msg)) => {
            assert!(msg.contains("500"));
            assert!(!msg.contains("test-key"));
        }
        other => panic!("Expected Generation error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_embed_sends_task_type_and_checks_dimension() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .and(body_partial_json(json!({
            "model": "models/gemini-embedding-001",
            "taskType": "RETRIEVAL_DOCUMENT",
            "outputDimensionality": 3
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embedding": {"values": [0.1, 0.2, 0.3]}})),
        )
        .mount(&server)
        .await;

    let vector = client(&server, 3)
        .embed("remember me", EmbeddingTask::RetrievalDocument)
        .await
        .unwrap();
    assert_eq!(vector, vec![0.1f32, 0.2, 0.3]);
}

#[tokio::test]
async fn test_embed_wrong_length_is_embedding_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embedding": {"values": [0.1, 0.2]}})),
        )
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .embed("remember me", EmbeddingTask::RetrievalQuery)
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::Embedding(_)));
}

#[tokio::test]
async fn test_embed_429_keeps_quota_details() {
    let server = MockServer::start().await;

    let body = "429 RESOURCE_EXHAUSTED. Quota exceeded for metric: \
                embed_content_free_tier_requests, limit: 100, model: gemini-embedding-001. \
                Please retry in 46.69s.";
    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string(body))
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .embed("remember me", EmbeddingTask::RetrievalQuery)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Embedding service error"));
    assert!(!err.is_generation());

    let info = err.quota().expect("quota details");
    assert!((info.retry_after_secs.unwrap() - 46.69).abs() < 1e-6);
    assert_eq!(info.model.as_deref(), Some("gemini-embedding-001"));
    assert_eq!(info.limit, Some(100));
}

#[tokio::test]
async fn test_embed_retry_after_header_fallback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "12")
                .set_body_string("Too Many Requests"),
        )
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .embed("remember me", EmbeddingTask::RetrievalQuery)
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::EmbeddingQuota(_)));
    assert_eq!(err.quota().and_then(|q| q.retry_after_secs), Some(12.0));
}

#[tokio::test]
async fn test_embed_server_error_has_no_quota() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .embed("remember me", EmbeddingTask::RetrievalQuery)
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::Embedding(_)));
    assert!(err.quota().is_none());
}
