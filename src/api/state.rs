use std::sync::Arc;

use crate::chat::{ChatRelay, SessionStore};
use crate::core::AppConfig;
use crate::openai::OpenAiClient;

pub struct AppState {
    pub relay: ChatRelay,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(relay: ChatRelay, config: AppConfig) -> Self {
        Self { relay, config }
    }

    /// Wire up a relay backed by the OpenAI client and the session
    /// store described by `config`.
    pub fn from_config(config: AppConfig) -> Self {
        let store = SessionStore::from_config(&config);
        let client = Arc::new(OpenAiClient::from_config(&config));
        let relay = ChatRelay::new(store, client, &config.save_command);
        Self::new(relay, config)
    }
}
