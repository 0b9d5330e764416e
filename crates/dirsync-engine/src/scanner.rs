//! Directory Scanner.
//!
//! Pulls entries from a directory session one page at a time and hands them
//! out one by one through [`DirectoryScanner::next_entry`]. Only one page is
//! buffered. Container and referral entries are dropped and counted here;
//! search result references were already counted by the session.

use std::collections::VecDeque;

use dirsync_core::{
    DirectoryConnector, DirectorySession, PageCookie, RawEntry, SearchRequest, SourceConfig,
    SyncError, SyncResult,
};
use tokio_util::sync::CancellationToken;

const REFERRAL_CLASS: &str = "referral";

/// Counters collected while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Pages fetched.
    pub pages: u32,
    /// Entries and references returned by the directory.
    pub entries_seen: usize,
    /// Entries dropped for a container object class.
    pub skipped_containers: usize,
    /// Referral entries and references dropped.
    pub skipped_referrals: usize,
    /// The directory returned an incomplete result set.
    pub truncated: bool,
}

/// Lazy, non-restartable sequence of leaf entries from one search.
pub struct DirectoryScanner<'a> {
    config: &'a SourceConfig,
    session: Box<dyn DirectorySession>,
    request: SearchRequest,
    cancel: CancellationToken,
    buffer: VecDeque<RawEntry>,
    cookie: Option<PageCookie>,
    exhausted: bool,
    stats: ScanStats,
}

impl<'a> DirectoryScanner<'a> {
    /// Connects and binds a fresh session for one scan.
    pub async fn open(
        connector: &dyn DirectoryConnector,
        config: &'a SourceConfig,
        cancel: CancellationToken,
    ) -> SyncResult<Self> {
        let mut session = connector.connect(config).await?;
        if let Err(e) = session.bind(config.credentials.as_ref()).await {
            let _ = session.unbind().await;
            return Err(e);
        }

        Ok(Self {
            config,
            session,
            request: SearchRequest::from_config(config),
            cancel,
            buffer: VecDeque::new(),
            cookie: None,
            exhausted: false,
            stats: ScanStats::default(),
        })
    }

    /// Returns the next leaf entry, or `None` when the search is complete.
    ///
    /// ## Errors
    ///
    /// - [`SyncError::Cancelled`] if cancellation was requested before a page fetch
    /// - [`SyncError::Protocol`] if the page cap is exceeded or the server
    ///   repeats a paging cookie
    /// - Any error the session reports for a page
    pub async fn next_entry(&mut self) -> SyncResult<Option<RawEntry>> {
        loop {
            while let Some(entry) = self.buffer.pop_front() {
                if entry.has_object_class(REFERRAL_CLASS) {
                    self.stats.skipped_referrals += 1;
                    tracing::debug!(dn = %entry.dn, "Skipping referral entry");
                } else if entry
                    .object_classes()
                    .iter()
                    .any(|c| self.config.is_skipped_class(c))
                {
                    self.stats.skipped_containers += 1;
                    tracing::debug!(dn = %entry.dn, "Skipping container entry");
                } else {
                    return Ok(Some(entry));
                }
            }

            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if let Some(max) = self.config.max_pages {
            if self.stats.pages >= max {
                return Err(SyncError::protocol(format!(
                    "search did not finish within {max} pages"
                )));
            }
        }

        let sent = self.cookie.take();
        let page = self.session.search_page(&self.request, sent.clone()).await?;

        if page.next.is_some() && page.next == sent {
            return Err(SyncError::protocol("server repeated the paging cookie"));
        }

        self.stats.pages += 1;
        self.stats.entries_seen += page.entries.len() + page.referrals;
        self.stats.skipped_referrals += page.referrals;
        if page.truncated {
            self.stats.truncated = true;
            tracing::warn!(
                source_id = %self.config.id,
                page = self.stats.pages,
                "Directory truncated the search result"
            );
        }
        self.exhausted = page.next.is_none() || page.truncated;
        self.cookie = page.next;
        self.buffer.extend(page.entries);

        tracing::trace!(
            source_id = %self.config.id,
            page = self.stats.pages,
            buffered = self.buffer.len(),
            more = !self.exhausted,
            "Fetched directory page"
        );
        Ok(())
    }

    /// Returns the counters collected so far.
    #[must_use]
    pub const fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Unbinds the session. Errors are logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.session.unbind().await {
            tracing::debug!(source_id = %self.config.id, error = %e, "Unbind failed");
        }
    }
}
