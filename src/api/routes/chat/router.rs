//! Router for the chat API

use std::sync::{Arc, RwLock};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::post,
};

use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::chat::RelayError;
use super::public;

type SharedState = Arc<RwLock<AppState>>;

// The body is parsed by hand so that it is accepted whatever the
// content type and so that bad JSON gets the usual error body
fn parse_request(body: &[u8]) -> Result<public::ChatRequest, RelayError> {
    serde_json::from_slice(body).map_err(|e| RelayError::InvalidRequest(e.to_string()))
}

async fn relay_message(
    state: &SharedState,
    session_id: &str,
    payload: public::ChatRequest,
) -> Result<Json<public::ChatResponse>, ApiError> {
    let relay = state
        .read()
        .expect("Unable to read share state")
        .relay
        .clone();

    tracing::debug!("Chat request for session {}", session_id);
    let response = relay
        .chat(session_id, payload.message.as_deref(), payload.context)
        .await?;

    Ok(Json(public::ChatResponse::new(&response)))
}

/// Send a message in the default session
async fn chat_default(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<public::ChatResponse>, ApiError> {
    let payload = parse_request(&body)?;
    let session_id = state
        .read()
        .expect("Unable to read share state")
        .config
        .default_session_id
        .clone();
    relay_message(&state, &session_id, payload).await
}

/// Send a message in the given session
async fn chat_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<public::ChatResponse>, ApiError> {
    let payload = parse_request(&body)?;
    relay_message(&state, &id, payload).await
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(chat_default))
        .route("/{id}", post(chat_session))
}
