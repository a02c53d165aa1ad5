//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, RwLock};

use axum::{Router, body::Body};
use tempfile::TempDir;

use relay::api::AppState;
use relay::api::app;
use relay::core::AppConfig;

/// Builds an `AppConfig` rooted in `dir` that talks to the completion
/// API at `api_hostname`.
pub fn test_config(dir: &TempDir, api_hostname: &str) -> AppConfig {
    AppConfig {
        storage_path: dir.path().display().to_string(),
        sessions_path: dir.path().join("sessions").display().to_string(),
        snapshots_path: dir.path().join("snapshots").display().to_string(),
        openai_api_hostname: api_hostname.to_string(),
        openai_api_key: String::from("test-api-key"),
        openai_model: String::from("gpt-3.5-turbo"),
        openai_stream: false,
        openai_timeout_secs: 5,
        save_command: String::from("/save"),
        default_session_id: String::from("default"),
    }
}

/// Creates a test application router backed by a temporary storage
/// directory. The directory is removed when the returned `TempDir`
/// is dropped so keep it alive for the duration of the test.
pub fn test_app_with_config(config: AppConfig) -> Router {
    let app_state = AppState::from_config(config);
    app(Arc::new(RwLock::new(app_state)))
}

pub fn test_app(api_hostname: &str) -> (Router, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = test_config(&dir, api_hostname);
    (test_app_with_config(config), dir)
}

/// Mocks a successful, non-streamed completion that replies with
/// `content` and expects to be called `hits` times.
pub async fn mock_completion(
    server: &mut mockito::ServerGuard,
    content: &str,
    hits: usize,
) -> mockito::Mock {
    let body = serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1694268190,
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    });
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .expect(hits)
        .create_async()
        .await
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not utf-8")
}

pub async fn body_to_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_to_string(body).await).expect("Body is not json")
}
