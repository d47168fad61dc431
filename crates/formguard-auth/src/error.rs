//! Error types for the FORM login flow.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while authenticating a request.
///
/// Bad credentials are not errors: they route to the login error page.
#[derive(Debug, Error)]
pub enum FormAuthError {
    /// The request body exceeded the configured save/post limit.
    #[error("Request body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: usize },

    /// Reading or draining the request body failed.
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// The request cannot be represented or replayed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Session store error.
    #[error("Session error: {0}")]
    Session(#[from] formguard_session::Error),

    /// Forwarding to a login or error page failed.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, FormAuthError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl FormAuthError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            FormAuthError::BodyTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "body_too_large"),
            FormAuthError::BodyRead(_) => (StatusCode::BAD_REQUEST, "body_read_failed"),
            FormAuthError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            FormAuthError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "session_error"),
            FormAuthError::Dispatch(_) => (StatusCode::INTERNAL_SERVER_ERROR, "dispatch_error"),
            FormAuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for FormAuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Authentication error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Rejected request");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
