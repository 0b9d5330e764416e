//! LDAP connection settings.
//!
//! Derived from a [`SourceConfig`]; only the transport-related part of the
//! source configuration ends up here.

use std::time::Duration;

use dirsync_core::SourceConfig;
use ldap3::LdapConnSettings;

use crate::error::{LdapError, LdapResult};

/// Transport settings for one directory connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapSettings {
    /// `ldap://` or `ldaps://` URL.
    pub url: String,

    /// Upgrade with StartTLS after connecting.
    pub starttls: bool,

    /// Whether to validate server certificates.
    pub verify_certificates: bool,

    /// Connect timeout.
    pub connect_timeout: Duration,

    /// Timeout applied to every operation.
    pub operation_timeout: Duration,
}

impl LdapSettings {
    /// Builds settings for a source.
    pub fn from_source(config: &SourceConfig) -> LdapResult<Self> {
        let settings = Self {
            url: config.url(),
            starttls: config.starttls,
            verify_certificates: config.verify_certificates,
            connect_timeout: config.connect_timeout,
            operation_timeout: config.operation_timeout,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Checks scheme and TLS option consistency.
    pub fn validate(&self) -> LdapResult<()> {
        let ldaps = self.url.starts_with("ldaps://");
        if !ldaps && !self.url.starts_with("ldap://") {
            return Err(LdapError::config(format!(
                "URL must start with 'ldap://' or 'ldaps://': '{}'",
                self.url
            )));
        }
        if ldaps && self.starttls {
            return Err(LdapError::config("StartTLS cannot be combined with ldaps://"));
        }
        if self.connect_timeout.is_zero() || self.operation_timeout.is_zero() {
            return Err(LdapError::config("timeouts must be greater than zero"));
        }
        Ok(())
    }

    /// Checks if the connection is encrypted.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.starttls || self.url.starts_with("ldaps://")
    }

    /// Converts to `ldap3` connection settings.
    #[must_use]
    pub fn to_conn_settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.connect_timeout)
            .set_starttls(self.starttls)
            .set_no_tls_verify(!self.verify_certificates)
    }
}
