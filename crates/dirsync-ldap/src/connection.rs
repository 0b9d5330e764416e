//! LDAP connection handling.
//!
//! One connection is opened per scan and closed when the scan ends, so
//! there is no pooling here.

use dirsync_core::BindCredentials;
use ldap3::{Ldap, LdapConnAsync};

use crate::config::LdapSettings;
use crate::error::{LdapError, LdapResult, RC_SUCCESS};

/// An open LDAP connection.
pub struct LdapConnection {
    ldap: Ldap,
    settings: LdapSettings,
}

impl LdapConnection {
    /// Opens a connection and spawns its driver task.
    pub async fn open(settings: LdapSettings) -> LdapResult<Self> {
        let (conn, ldap) =
            LdapConnAsync::with_settings(settings.to_conn_settings(), &settings.url)
                .await
                .map_err(|e| classify_connect_error(&e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!("LDAP connection driver error: {}", e);
            }
        });

        tracing::debug!(url = %settings.url, secure = settings.is_secure(), "LDAP connection opened");
        Ok(Self { ldap, settings })
    }

    /// Binds with credentials, or anonymously when `None`.
    pub async fn bind(&mut self, credentials: Option<&BindCredentials>) -> LdapResult<()> {
        let (dn, password) = match credentials {
            Some(c) => (c.bind_dn.as_str(), c.password.as_str()),
            None => ("", ""),
        };

        let result = self
            .ldap
            .with_timeout(self.settings.operation_timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| LdapError::Bind(e.to_string()))?;

        if result.rc != RC_SUCCESS {
            return Err(LdapError::Bind(format!(
                "rc={}: {}",
                result.rc, result.text
            )));
        }

        tracing::debug!(bind_dn = dn, anonymous = credentials.is_none(), "LDAP bind succeeded");
        Ok(())
    }

    /// Returns the connection settings.
    #[must_use]
    pub fn settings(&self) -> &LdapSettings {
        &self.settings
    }

    /// Returns a mutable reference to the LDAP handle.
    #[must_use]
    pub fn ldap_mut(&mut self) -> &mut Ldap {
        &mut self.ldap
    }

    /// Unbinds and closes the connection.
    pub async fn close(&mut self) -> LdapResult<()> {
        self.ldap.unbind().await?;
        Ok(())
    }
}

fn classify_connect_error(err: &ldap3::LdapError) -> LdapError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("tls") || lower.contains("certificate") {
        LdapError::tls(message)
    } else if lower.contains("timed out") || lower.contains("timeout") {
        LdapError::Timeout
    } else {
        LdapError::connection(message)
    }
}
