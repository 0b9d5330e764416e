//! Directory source contract.
//!
//! A [`DirectoryConnector`] opens one [`DirectorySession`] per scan. The
//! session is bound, searched page by page and unbound when the scan ends.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BindCredentials, SearchScope, SourceConfig};
use crate::entry::RawEntry;
use crate::error::SyncResult;

/// Opaque continuation token for paged searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCookie(pub Vec<u8>);

impl PageCookie {
    /// Creates a cookie; an empty cookie means "no more pages".
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self(bytes))
        }
    }

    /// Returns the raw cookie bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Parameters of a paged search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Base DN.
    pub base_dn: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Filter expression.
    pub filter: String,
    /// Attributes to return.
    pub attributes: Vec<String>,
    /// Entries per page.
    pub page_size: u32,
    /// Timeout for each page request.
    pub timeout: Duration,
}

impl SearchRequest {
    /// Builds the search request for a source.
    #[must_use]
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            base_dn: config.base_dn.clone(),
            scope: config.scope,
            filter: config.filter.clone(),
            attributes: config.fetch_attributes(),
            page_size: config.page_size,
            timeout: config.operation_timeout,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Entries on this page.
    pub entries: Vec<RawEntry>,
    /// Search result references on this page (never followed).
    pub referrals: usize,
    /// Cookie for the next page, `None` on the last page.
    pub next: Option<PageCookie>,
    /// The server stopped early (size limit); entries past this page exist
    /// but were not returned.
    pub truncated: bool,
}

/// Opens directory sessions.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connects to the source's directory.
    ///
    /// Connection and TLS failures are [`SyncError::SourceUnreachable`].
    ///
    /// [`SyncError::SourceUnreachable`]: crate::SyncError::SourceUnreachable
    async fn connect(&self, config: &SourceConfig) -> SyncResult<Box<dyn DirectorySession>>;
}

/// An open directory session.
#[async_trait]
pub trait DirectorySession: Send {
    /// Binds with credentials, or anonymously when `None`.
    async fn bind(&mut self, credentials: Option<&BindCredentials>) -> SyncResult<()>;

    /// Fetches one page; `cookie` is `None` for the first page.
    async fn search_page(
        &mut self,
        request: &SearchRequest,
        cookie: Option<PageCookie>,
    ) -> SyncResult<SearchPage>;

    /// Closes the session.
    async fn unbind(&mut self) -> SyncResult<()>;
}
