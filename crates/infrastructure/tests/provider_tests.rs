//! Provider client tests against a mock HTTP server

use llm_leaderboard_domain::{FailureKind, GenerationRequest, TokenUsage};
use llm_leaderboard_infrastructure::{OpenAiCompatibleClient, ProviderClientConfig, TextGenerator};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OpenAiCompatibleClient {
    let config = ProviderClientConfig::new(format!("{}/api/v1", server.uri()))
        .with_api_key(Some("test-key".to_string()))
        .with_timeout(Duration::from_millis(500));
    OpenAiCompatibleClient::new(config).unwrap()
}

#[tokio::test]
async fn test_successful_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "vendor/model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "42"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 1, "total_tokens": 8}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .complete(&GenerationRequest::new("vendor/model", "6 * 7?"))
        .await
        .unwrap();

    assert_eq!(response.text, "42");
    assert_eq!(response.usage, TokenUsage::new(7, 1));
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let failure = client(&server)
        .complete(&GenerationRequest::new("vendor/model", "hi"))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::RateLimited);
    assert!(failure.is_transient());
}

#[tokio::test]
async fn test_bad_credential_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "no auth"}})))
        .mount(&server)
        .await;

    let failure = client(&server)
        .complete(&GenerationRequest::new("vendor/model", "hi"))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::InvalidCredential);
    assert!(!failure.is_transient());
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let failure = client(&server)
        .complete(&GenerationRequest::new("vendor/model", "hi"))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn test_server_error_status_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let failure = client(&server)
        .complete(&GenerationRequest::new("vendor/model", "hi"))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::ServerError(502));
}
