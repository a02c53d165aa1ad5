use thiserror::Error;

/// Failures a chat request can end in. The HTTP layer maps each
/// variant to a status code.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No message provided")]
    MissingMessage,

    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Chat session {0} not found")]
    SessionNotFound(String),

    // The upstream message is passed through to the caller as is
    #[error(transparent)]
    Remote(anyhow::Error),

    #[error(transparent)]
    Storage(anyhow::Error),
}

impl RelayError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::MissingMessage
                | RelayError::InvalidRequest(_)
                | RelayError::InvalidSessionId(_)
                | RelayError::SessionNotFound(_)
        )
    }
}
