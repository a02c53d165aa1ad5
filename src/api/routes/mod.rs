//! API routes module

pub mod branch;
pub mod chat;
pub mod sessions;

use std::sync::{Arc, RwLock};

use crate::api::state::AppState;
use axum::Router;

type SharedState = Arc<RwLock<AppState>>;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Chat routes
        .nest("/chat", chat::router())
        // Branch routes
        .nest("/branch", branch::router())
        // Session listing routes
        .nest("/sessions", sessions::router())
}
