//! LDAP-specific error types.
//!
//! ## Security Note
//!
//! Error messages must not carry bind passwords.

use dirsync_core::SyncError;
use thiserror::Error;

/// Result code: success.
pub const RC_SUCCESS: u32 = 0;
/// Result code: sizeLimitExceeded.
pub const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
/// Result code: noSuchObject.
pub const RC_NO_SUCH_OBJECT: u32 = 32;
/// Result code: invalidDNSyntax.
pub const RC_INVALID_DN_SYNTAX: u32 = 34;
/// Result code: invalidCredentials.
pub const RC_INVALID_CREDENTIALS: u32 = 49;
/// Result code: busy.
pub const RC_BUSY: u32 = 51;
/// Result code: unavailable.
pub const RC_UNAVAILABLE: u32 = 52;
/// Result code: filterError (client-side filter rejection).
pub const RC_FILTER_ERROR: u32 = 87;

/// LDAP-specific errors.
#[derive(Debug, Error)]
pub enum LdapError {
    /// Invalid configuration.
    #[error("LDAP configuration error: {0}")]
    Configuration(String),

    /// Connection failed.
    #[error("LDAP connection failed: {0}")]
    Connection(String),

    /// TLS/SSL error.
    #[error("LDAP TLS error: {0}")]
    Tls(String),

    /// Bind (authentication) failed.
    #[error("LDAP bind failed: {0}")]
    Bind(String),

    /// The server rejected the configured search (base DN or filter).
    #[error("LDAP search rejected (rc={code}): {message}")]
    SearchRejected {
        /// LDAP result code.
        code: u32,
        /// Diagnostic message.
        message: String,
    },

    /// The server is busy or unavailable.
    #[error("LDAP server unavailable (rc={code}): {message}")]
    Unavailable {
        /// LDAP result code.
        code: u32,
        /// Diagnostic message.
        message: String,
    },

    /// Timeout error.
    #[error("LDAP operation timed out")]
    Timeout,

    /// Protocol error from LDAP server.
    #[error("LDAP protocol error: {0}")]
    Protocol(String),

    /// Malformed LDIF input.
    #[error("LDIF parse error at line {line}: {message}")]
    Ldif {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Underlying ldap3 error.
    #[error("LDAP error: {0}")]
    Ldap3(#[from] ldap3::LdapError),
}

impl LdapError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a TLS error.
    #[must_use]
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates an LDIF error.
    #[must_use]
    pub fn ldif(line: usize, msg: impl Into<String>) -> Self {
        Self::Ldif {
            line,
            message: msg.into(),
        }
    }

    /// Classifies a non-success search result code.
    #[must_use]
    pub fn from_result_code(code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            RC_NO_SUCH_OBJECT | RC_INVALID_DN_SYNTAX | RC_FILTER_ERROR => {
                Self::SearchRejected { code, message }
            }
            RC_BUSY | RC_UNAVAILABLE => Self::Unavailable { code, message },
            RC_INVALID_CREDENTIALS => Self::Bind(message),
            _ => Self::Protocol(format!("rc={code}: {message}")),
        }
    }
}

/// Result type for LDAP operations.
pub type LdapResult<T> = Result<T, LdapError>;

impl From<LdapError> for SyncError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::Configuration(msg) => SyncError::Configuration(msg),
            LdapError::SearchRejected { .. } | LdapError::Ldif { .. } => {
                SyncError::Configuration(err.to_string())
            }
            LdapError::Protocol(msg) => SyncError::Protocol(msg),
            LdapError::Connection(_)
            | LdapError::Tls(_)
            | LdapError::Bind(_)
            | LdapError::Unavailable { .. }
            | LdapError::Timeout
            | LdapError::Ldap3(_) => SyncError::SourceUnreachable(err.to_string()),
        }
    }
}
