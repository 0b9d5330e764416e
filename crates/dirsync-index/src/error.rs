//! Index-specific error types.

use dirsync_core::SyncError;
use thiserror::Error;

/// Errors raised by index collaborators.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Invalid client configuration.
    #[error("Index configuration error: {0}")]
    Configuration(String),

    /// The index endpoint could not be reached.
    #[error("Index connection failed: {0}")]
    Connection(String),

    /// The request timed out.
    #[error("Index request timed out")]
    Timeout,

    /// The index answered with an error status.
    #[error("Index returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The response body could not be understood.
    #[error("Malformed index response: {0}")]
    Response(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a malformed-response error.
    #[must_use]
    pub fn response(msg: impl Into<String>) -> Self {
        Self::Response(msg.into())
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() || err.is_request() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::Response(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

impl From<IndexError> for SyncError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Configuration(msg) => SyncError::Configuration(msg),
            other => SyncError::IndexUnreachable(other.to_string()),
        }
    }
}
