//! Router for the branch API

use std::sync::{Arc, RwLock};

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};

use crate::api::public::ApiError;
use crate::api::state::AppState;
use super::public;

type SharedState = Arc<RwLock<AppState>>;

/// Copy a session's history into a new session
async fn branch_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<public::BranchResponse>, ApiError> {
    let relay = state
        .read()
        .expect("Unable to read share state")
        .relay
        .clone();
    let new_session_id = relay.branch(&id).await?;

    Ok(Json(public::BranchResponse { new_session_id }))
}

/// Create the branch router
pub fn router() -> Router<SharedState> {
    Router::new().route("/{id}", post(branch_session))
}
