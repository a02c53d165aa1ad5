//! Public types for the sessions API
use serde::{Deserialize, Serialize};
use crate::openai::Message;

#[derive(Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub transcript: Vec<Message>,
}
