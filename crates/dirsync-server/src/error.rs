//! Management API error types.
//!
//! Maps synchronization errors to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dirsync_core::SyncError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the management API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request data.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Error from the registry or a source.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Sync(err) => match err {
                SyncError::UnknownSource(_) => StatusCode::NOT_FOUND,
                SyncError::DuplicateSource(_)
                | SyncError::TargetConflict { .. }
                | SyncError::SourceStopped(_) => StatusCode::CONFLICT,
                SyncError::Configuration(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Sync(err) => match err {
                SyncError::UnknownSource(_) => "not_found",
                SyncError::DuplicateSource(_) => "duplicate_source",
                SyncError::TargetConflict { .. } => "target_conflict",
                SyncError::SourceStopped(_) => "source_stopped",
                SyncError::Configuration(_) => "invalid_configuration",
                _ => "internal_error",
            },
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error: String,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for management API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
