//! LDAP implementation of the directory source contract.

use async_trait::async_trait;
use dirsync_core::{
    BindCredentials, DirectoryConnector, DirectorySession, PageCookie, SearchPage, SearchRequest,
    SourceConfig, SyncResult,
};

use crate::config::LdapSettings;
use crate::connection::LdapConnection;
use crate::search::LdapSearcher;

/// Opens LDAP sessions with `ldap3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

impl LdapConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self, config: &SourceConfig) -> SyncResult<Box<dyn DirectorySession>> {
        let settings = LdapSettings::from_source(config)?;
        let conn = LdapConnection::open(settings).await?;
        Ok(Box::new(LdapSession { conn }))
    }
}

/// A bound (or bindable) LDAP session.
pub struct LdapSession {
    conn: LdapConnection,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, credentials: Option<&BindCredentials>) -> SyncResult<()> {
        Ok(self.conn.bind(credentials).await?)
    }

    async fn search_page(
        &mut self,
        request: &SearchRequest,
        cookie: Option<PageCookie>,
    ) -> SyncResult<SearchPage> {
        let page = LdapSearcher::new(&mut self.conn)
            .fetch_page(request, cookie)
            .await?;

        tracing::trace!(
            url = %self.conn.settings().url,
            entries = page.entries.len(),
            referrals = page.referrals,
            more = page.next.is_some(),
            "LDAP page received"
        );
        Ok(page)
    }

    async fn unbind(&mut self) -> SyncResult<()> {
        Ok(self.conn.close().await?)
    }
}
