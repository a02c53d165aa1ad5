//! Public API types

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

use crate::chat::RelayError;

// Errors

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<RelayError>() {
            Some(RelayError::MissingMessage)
            | Some(RelayError::InvalidRequest(_))
            | Some(RelayError::InvalidSessionId(_)) => StatusCode::BAD_REQUEST,
            Some(RelayError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            Some(RelayError::Remote(_)) | Some(RelayError::Storage(_)) | None => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert `ApiError` into an Axum compatible response.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let relay_error = self.0.downcast_ref::<RelayError>();

        // Always log the error
        if relay_error.is_some_and(RelayError::is_client_error) {
            tracing::warn!("{}", self.0);
        } else {
            tracing::error!("{:#}", self.0);
        }

        // Client errors and the upstream message of remote errors go
        // back to the caller. Anything else is only logged.
        let error = match relay_error {
            Some(relay_error)
                if relay_error.is_client_error()
                    || matches!(relay_error, RelayError::Remote(_)) =>
            {
                relay_error.to_string()
            }
            _ => String::from("Something went wrong"),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Enables using `?` on functions that return `Result<_,
/// anyhow::Error>` or `Result<_, RelayError>` to turn them into
/// `Result<_, ApiError>`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// Re-export public types from each route

pub mod branch {
    pub use crate::api::routes::branch::public::*;
}

pub mod chat {
    pub use crate::api::routes::chat::public::*;
}

pub mod sessions {
    pub use crate::api::routes::sessions::public::*;
}
