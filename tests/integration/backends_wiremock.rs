//! HTTP backends against a mock server

use futures::StreamExt;
use serde_json::json;
use shotcode::catalog::BackendModel;
use shotcode::error::{ApiError, ProviderError};
use shotcode::orchestrator::{Orchestrator, OrchestratorSettings};
use shotcode::prompts::{ChatMessage, MessageRole};
use shotcode::provider::{
    AnthropicClient, BackendEndpoints, GeminiClient, GenerationBackend, HttpBackendFactory,
    ImageBackend, OpenAIClient, OpenAIImageClient,
};
use shotcode::request::Credentials;
use shotcode::screenshot::ScreenshotClient;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_utils::image_request;

const TIMEOUT: Duration = Duration::from_secs(5);

fn sse(events: &[&str]) -> ResponseTemplate {
    let body: String = events.iter().map(|e| format!("{}\n\n", e)).collect();
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn prompt() -> Vec<ChatMessage> {
    vec![ChatMessage::text(MessageRole::User, "Build the page")]
}

async fn collect(backend: &dyn GenerationBackend) -> Vec<Result<String, ProviderError>> {
    backend.stream(prompt()).await.unwrap().collect().await
}

#[tokio::test]
async fn openai_stream_yields_deltas_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(sse(&[
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"<html>"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"</html>"}}]}"#,
            "data: [DONE]",
        ]))
        .mount(&server)
        .await;

    let client = OpenAIClient::new(
        BackendModel::Gpt4o20241120,
        "sk-test".to_string(),
        Some(server.uri()),
        TIMEOUT,
    )
    .unwrap();
    let deltas: Vec<String> = collect(&client)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(deltas, vec!["<html>".to_string(), "</html>".to_string()]);
}

#[tokio::test]
async fn openai_unauthorized_maps_to_auth_without_the_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided: sk-bad"}
        })))
        .mount(&server)
        .await;

    let client = OpenAIClient::new(
        BackendModel::Gpt4o20241120,
        "sk-bad".to_string(),
        Some(server.uri()),
        TIMEOUT,
    )
    .unwrap();
    let err = match client.stream(prompt()).await {
        Err(err) => err,
        Ok(_) => panic!("expected an auth failure"),
    };
    assert!(matches!(err, ProviderError::Auth { .. }));
    assert!(!err.to_string().contains("sk-bad"));
}

#[tokio::test]
async fn openai_rate_limit_maps_to_quota() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = OpenAIClient::new(
        BackendModel::Gpt4o20241120,
        "sk-test".to_string(),
        Some(server.uri()),
        TIMEOUT,
    )
    .unwrap();
    let err = client.stream(prompt()).await.err().unwrap();
    assert_eq!(err.kind(), "quota");
}

#[tokio::test]
async fn reasoning_model_answers_in_one_piece() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "<html>whole</html>"}}]
        })))
        .mount(&server)
        .await;

    let client = OpenAIClient::new(
        BackendModel::O120241217,
        "sk-test".to_string(),
        Some(server.uri()),
        TIMEOUT,
    )
    .unwrap();
    let deltas: Vec<String> = collect(&client)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(deltas, vec!["<html>whole</html>".to_string()]);
}

#[tokio::test]
async fn anthropic_stream_reads_content_block_deltas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "ak-test"))
        .respond_with(sse(&[
            "event: message_start\ndata: {\"type\":\"message_start\"}",
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"<svg>\"}}",
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"</svg>\"}}",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}",
        ]))
        .mount(&server)
        .await;

    let client = AnthropicClient::new(
        BackendModel::Claude37Sonnet20250219,
        "ak-test".to_string(),
        Some(server.uri()),
        TIMEOUT,
    )
    .unwrap();
    let deltas: Vec<String> = collect(&client)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(deltas, vec!["<svg>".to_string(), "</svg>".to_string()]);
}

#[tokio::test]
async fn anthropic_overload_mid_stream_ends_with_a_quota_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(sse(&[
            "event: content_block_delta\ndata: {\"delta\":{\"text\":\"<html>\"}}",
            "event: error\ndata: {\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}",
            "event: content_block_delta\ndata: {\"delta\":{\"text\":\"ignored\"}}",
        ]))
        .mount(&server)
        .await;

    let client = AnthropicClient::new(
        BackendModel::Claude37Sonnet20250219,
        "ak-test".to_string(),
        Some(server.uri()),
        TIMEOUT,
    )
    .unwrap();
    let items = collect(&client).await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().ok(), Some("<html>"));
    assert!(matches!(items[1], Err(ProviderError::RateLimited { .. })));
}

#[tokio::test]
async fn gemini_stream_joins_candidate_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "gk-test"))
        .respond_with(sse(&[
            r#"data: {"candidates":[{"content":{"parts":[{"text":"<html>"},{"text":"<body>"}]}}]}"#,
            r#"data: {"candidates":[{"content":{"parts":[{"text":"</body></html>"}]}}]}"#,
        ]))
        .mount(&server)
        .await;

    let client = GeminiClient::new(
        BackendModel::Gemini20Flash,
        "gk-test".to_string(),
        Some(server.uri()),
        TIMEOUT,
    )
    .unwrap();
    let text: String = collect(&client)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(text, "<html><body></body></html>");
}

#[tokio::test]
async fn image_client_returns_the_generated_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"url": "https://images.test/lake.png"}]
        })))
        .mount(&server)
        .await;

    let client =
        OpenAIImageClient::new("sk-test".to_string(), Some(server.uri()), TIMEOUT).unwrap();
    assert_eq!(
        client.generate("A mountain lake").await.unwrap(),
        "https://images.test/lake.png"
    );
}

#[tokio::test]
async fn orchestrator_streams_through_the_http_factory() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse(&[
            r#"data: {"choices":[{"delta":{"content":"```html\n<html>"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"hi</html>\n```"}}]}"#,
            "data: [DONE]",
        ]))
        .mount(&server)
        .await;

    let credentials = Credentials {
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: Some(server.uri()),
        ..Default::default()
    };
    let factory = HttpBackendFactory::new(BackendEndpoints::default(), TIMEOUT);
    let orchestrator = Orchestrator::new(Arc::new(factory), OrchestratorSettings::default());
    let mut request = image_request(credentials);
    request.image_generation = false;
    request.backends = Some(vec![BackendModel::Gpt4o20241120]);

    let outcomes = orchestrator.generate_all(request).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result, Ok("<html>hi</html>".to_string()));
}

#[tokio::test]
async fn screenshot_capture_returns_a_png_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/take"))
        .and(query_param("access_key", "shot-key"))
        .and(query_param("url", "https://example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .mount(&server)
        .await;

    let client = ScreenshotClient::new(format!("{}/take", server.uri())).unwrap();
    let url = client.capture("https://example.com", "shot-key").await.unwrap();
    assert_eq!(url, "data:image/png;base64,AQID");
}

#[tokio::test]
async fn screenshot_failure_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/take"))
        .respond_with(ResponseTemplate::new(500).set_body_string("render failed"))
        .mount(&server)
        .await;

    let client = ScreenshotClient::new(format!("{}/take", server.uri())).unwrap();
    match client.capture("https://example.com", "shot-key").await {
        Err(ApiError::Screenshot(message)) => {
            assert!(message.contains("500"));
            assert!(message.contains("render failed"));
            assert!(!message.contains("shot-key"));
        }
        other => panic!("expected a screenshot error, got {:?}", other),
    }
}
