//! Public types for the chat API
use serde::{Deserialize, Serialize};
use crate::openai::Message;

#[derive(Deserialize)]
pub struct ChatRequest {
    // Optional here so a missing message is reported by the relay
    // rather than as a malformed body
    pub message: Option<String>,
    // Replaces the stored history for this request only
    pub context: Option<Vec<Message>>,
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

impl ChatResponse {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.into(),
        }
    }
}
