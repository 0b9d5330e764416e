//! Synchronization error types.
//!
//! Errors fall into three groups that decide how far they propagate:
//!
//! - **scan-fatal**: [`SyncError::SourceUnreachable`], [`SyncError::Protocol`]
//!   abort the current scan; the scheduler retries on the next interval.
//! - **write-fatal**: [`SyncError::IndexUnreachable`] aborts the remaining
//!   writes of the current scan; the scheduler retries on the next interval.
//! - **per-entry**: [`SyncError::MissingIdentifier`] is recorded in the scan
//!   outcome and never leaves the scan.
//!
//! [`SyncError::Configuration`] is the only error that stops polling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while synchronizing a directory source.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Invalid source configuration, or the directory rejected the
    /// configured search itself (bad base DN, bad filter).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection, TLS or bind failure against the directory.
    #[error("Directory source unreachable: {0}")]
    SourceUnreachable(String),

    /// Malformed or unexpected directory response.
    #[error("Directory protocol error: {0}")]
    Protocol(String),

    /// An entry lacks the attribute used to derive its document identifier.
    #[error("Entry '{dn}' has no value for identifier '{attribute}'")]
    MissingIdentifier {
        /// Distinguished name of the rejected entry.
        dn: String,
        /// Attribute (or RDN) the identifier was expected in.
        attribute: String,
    },

    /// The document index could not be reached or refused a whole batch.
    #[error("Index unreachable: {0}")]
    IndexUnreachable(String),

    /// No source is registered under this identifier.
    #[error("Source not found: {0}")]
    UnknownSource(String),

    /// A source is already registered under this identifier.
    #[error("Source already registered: {0}")]
    DuplicateSource(String),

    /// Another strict-mode source already writes to this index target.
    #[error("Index target {target} is already synchronized in strict mode by source '{owner}'")]
    TargetConflict {
        /// The contested target.
        target: String,
        /// Source that owns the target.
        owner: String,
    },

    /// The source's scheduler is not running.
    #[error("Source is not running: {0}")]
    SourceStopped(String),

    /// The scan was cancelled before it completed.
    #[error("Scan cancelled")]
    Cancelled,

    /// Internal error.
    #[error("Internal synchronization error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a source-unreachable error.
    #[must_use]
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::SourceUnreachable(msg.into())
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates an index-unreachable error.
    #[must_use]
    pub fn index_unreachable(msg: impl Into<String>) -> Self {
        Self::IndexUnreachable(msg.into())
    }

    /// Creates a missing-identifier error.
    #[must_use]
    pub fn missing_identifier(dn: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingIdentifier {
            dn: dn.into(),
            attribute: attribute.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::SourceUnreachable(_) => ErrorKind::SourceUnreachable,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::MissingIdentifier { .. } => ErrorKind::MissingIdentifier,
            Self::IndexUnreachable(_) => ErrorKind::IndexUnreachable,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::UnknownSource(_)
            | Self::DuplicateSource(_)
            | Self::TargetConflict { .. }
            | Self::SourceStopped(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Checks if the scheduler should keep polling after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Checks if this error must stop the source's scheduler.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

/// Serializable classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Invalid configuration.
    Configuration,
    /// Directory connectivity or bind failure.
    SourceUnreachable,
    /// Malformed directory response.
    Protocol,
    /// Entry without identifier.
    MissingIdentifier,
    /// Index connectivity failure.
    IndexUnreachable,
    /// Scan cancelled.
    Cancelled,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Transient errors are retried on the next normal interval.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnreachable | Self::Protocol | Self::IndexUnreachable
        )
    }

    /// Fatal errors stop polling until the source is re-registered.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration)
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(SyncError::unreachable("refused").is_transient());
        assert!(SyncError::protocol("bad cookie").is_transient());
        assert!(SyncError::index_unreachable("503").is_transient());
        assert!(!SyncError::config("empty base DN").is_transient());

        assert!(SyncError::config("empty base DN").is_fatal());
        assert!(!SyncError::unreachable("refused").is_fatal());
        assert!(!SyncError::Cancelled.is_fatal());
    }

    #[test]
    fn missing_identifier_message() {
        let err = SyncError::missing_identifier("cn=nobody,ou=system", "uid");
        assert_eq!(err.kind(), ErrorKind::MissingIdentifier);
        assert!(err.to_string().contains("cn=nobody,ou=system"));
        assert!(err.to_string().contains("uid"));
    }

    #[test]
    fn kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SourceUnreachable).unwrap();
        assert_eq!(json, "\"SOURCE_UNREACHABLE\"");
    }
}
