//! HTTP contract tests for the chat-completions backend.
//!
//! The backend is blocking, so each call runs on a blocking worker while
//! the mock server runs on the async runtime.

use serde_json::json;
use taskwise_core::ai::{build_prompt, GenerationResult};
use taskwise_core::{
    CompletionBackend, GenerationError, LlmConfig, OpenAiChatBackend, Priority, PrioritizeInput,
    Prioritizer, PromptMessages,
};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: String) -> LlmConfig {
    LlmConfig {
        base_url,
        model: "test-model".to_string(),
        api_key: Some("test-key".to_string()),
        temperature: 0.0,
        timeout_secs: 5,
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1234567890,
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn sample_prompt() -> PromptMessages {
    build_prompt(&[PrioritizeInput {
        id: Uuid::new_v4(),
        title: "Water plants".to_string(),
        description: String::new(),
    }])
}

async fn run_blocking<T: Send + 'static>(
    call: impl FnOnce() -> GenerationResult<T> + Send + 'static,
) -> GenerationResult<T> {
    tokio::task::spawn_blocking(call)
        .await
        .expect("blocking task should not panic")
}

#[tokio::test(flavor = "multi_thread")]
async fn request_carries_model_auth_and_json_mode() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "response_format": {"type": "json_object"},
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"tasks\":[]}")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = OpenAiChatBackend::new(&config(mock_server.uri()));
    let content = run_blocking(move || backend.complete(&sample_prompt())).await;

    assert_eq!(content.unwrap(), "{\"tasks\":[]}");
}

#[tokio::test(flavor = "multi_thread")]
async fn prioritizer_parses_rows_from_live_reply() {
    let mock_server = MockServer::start().await;
    let id = Uuid::new_v4();
    let content = json!({
        "tasks": [{"id": id.to_string(), "title": "Pay rent", "description": "", "priority": "High"}]
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&content)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let prioritizer = Prioritizer::new(OpenAiChatBackend::new(&config(format!(
        "{}/v1",
        mock_server.uri()
    ))));
    let rows = run_blocking(move || {
        prioritizer.prioritize(&[PrioritizeInput {
            id,
            title: "Pay rent".to_string(),
            description: String::new(),
        }])
    })
    .await
    .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, Some(id));
    assert_eq!(rows[0].priority, Priority::High);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_maps_to_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&mock_server)
        .await;

    let backend = OpenAiChatBackend::new(&config(mock_server.uri()));
    let err = run_blocking(move || backend.complete(&sample_prompt()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GenerationError::Http {
            status: 503,
            body: "overloaded".to_string()
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn non_json_body_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let backend = OpenAiChatBackend::new(&config(mock_server.uri()));
    let err = run_blocking(move || backend.complete(&sample_prompt()))
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Malformed(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_endpoint_is_transport_error() {
    // Port 9 (discard) on localhost is not expected to accept HTTP.
    let backend = OpenAiChatBackend::new(&config("http://127.0.0.1:9".to_string()));
    let err = run_blocking(move || backend.complete(&sample_prompt()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GenerationError::Transport(_) | GenerationError::Timeout { .. }
    ));
}
