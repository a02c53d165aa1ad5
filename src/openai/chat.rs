use std::time::Duration;

use anyhow::{Error, Result, bail};
use async_trait::async_trait;

use crate::core::AppConfig;
use crate::openai::{ChatCompletion, Message, collect_fragments, completion, completion_stream};

/// Client for an OpenAI compatible chat completions API.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_hostname: String,
    api_key: String,
    model: String,
    stream: bool,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            stream: false,
            timeout: Duration::from_secs(60 * 10),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.openai_api_hostname,
            &config.openai_api_key,
            &config.openai_model,
        )
        .with_stream(config.openai_stream)
        .with_timeout(Duration::from_secs(config.openai_timeout_secs))
    }

    /// Request the reply as a stream of fragments instead of a single
    /// response body. Either way callers get the whole reply.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, Error> {
        tracing::debug!(
            "Requesting completion from {} with {} messages (stream: {})",
            self.model,
            messages.len(),
            self.stream
        );

        let reply = if self.stream {
            let fragments = completion_stream(
                messages,
                &self.api_hostname,
                &self.api_key,
                &self.model,
                self.timeout,
            )
            .await?;
            collect_fragments(fragments).await?
        } else {
            completion(
                messages,
                &self.api_hostname,
                &self.api_key,
                &self.model,
                self.timeout,
            )
            .await?
        };

        // Both paths count an empty reply as a failed call
        if reply.is_empty() {
            bail!("No message received from {}", self.model);
        }

        Ok(reply)
    }
}
