//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session was not found in the store.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Session has expired due to TTL.
    #[error("Session expired: {0}")]
    Expired(String),

    /// A session id could not be parsed.
    #[error("Invalid session id: {0}")]
    InvalidId(String),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
