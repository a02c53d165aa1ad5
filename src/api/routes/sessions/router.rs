//! Router for the sessions API

use std::sync::{Arc, RwLock};

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::chat::ChatRelay;
use super::public;

type SharedState = Arc<RwLock<AppState>>;

fn relay(state: &SharedState) -> ChatRelay {
    state
        .read()
        .expect("Unable to read share state")
        .relay
        .clone()
}

/// Get a list of all stored session ids
async fn session_list(
    State(state): State<SharedState>,
) -> Result<Json<public::SessionsResponse>, ApiError> {
    let sessions = relay(&state).sessions().await?;
    Ok(Json(public::SessionsResponse { sessions }))
}

/// Get the stored history of a single session
async fn session_transcript(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<public::TranscriptResponse>, ApiError> {
    let transcript = relay(&state).transcript(&id).await?;
    Ok(Json(public::TranscriptResponse { transcript }))
}

/// Create the sessions router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(session_list))
        .route("/{id}", get(session_transcript))
}
