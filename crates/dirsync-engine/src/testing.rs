//! Test doubles for engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dirsync_core::{
    BindCredentials, DirectoryConnector, DirectorySession, DocumentIndex, IndexTarget, ItemResult,
    MappedDocument, PageCookie, RawEntry, SearchPage, SearchRequest, SourceConfig, SyncError,
    SyncResult,
};
use dirsync_index::MemoryIndex;
use parking_lot::Mutex;

/// A person entry below `ou=users,ou=system`.
pub fn person(uid: &str) -> RawEntry {
    RawEntry::new(format!("uid={uid},ou=users,ou=system"))
        .with_attr("objectClass", ["uidObject", "person", "top"])
        .with_attr("uid", [uid])
        .with_attr("cn", [format!("{uid} name")])
        .with_attr("sn", [uid])
}

#[derive(Default)]
struct Script {
    entries: Mutex<Vec<RawEntry>>,
    page_size: AtomicUsize,
    references_per_page: AtomicUsize,
    stuck_cookie: AtomicBool,
    failing_bind: AtomicBool,
    connect_error: Mutex<Option<SyncError>>,
    page_error: Mutex<Option<(usize, SyncError)>>,
    truncate_at: Mutex<Option<usize>>,
    page_delay: Mutex<Duration>,
    open: AtomicUsize,
    max_open: AtomicUsize,
    connects: AtomicUsize,
    connect_times: Mutex<Vec<tokio::time::Instant>>,
}

/// Directory returning a fixed entry list in fixed-size pages.
#[derive(Clone, Default)]
pub struct ScriptedDirectory {
    script: Arc<Script>,
}

impl ScriptedDirectory {
    pub fn paged(entries: Vec<RawEntry>, page_size: usize) -> Self {
        let directory = Self::default();
        *directory.script.entries.lock() = entries;
        directory.script.page_size.store(page_size.max(1), Ordering::SeqCst);
        directory
    }

    pub fn with_references(self, per_page: usize) -> Self {
        self.script.references_per_page.store(per_page, Ordering::SeqCst);
        self
    }

    pub fn stuck_cookie(self) -> Self {
        self.script.stuck_cookie.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_bind(self) -> Self {
        self.script.failing_bind.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_page_delay(self, delay: Duration) -> Self {
        *self.script.page_delay.lock() = delay;
        self
    }

    pub fn set_entries(&self, entries: Vec<RawEntry>) {
        *self.script.entries.lock() = entries;
    }

    pub fn fail_connect(&self, error: Option<SyncError>) {
        *self.script.connect_error.lock() = error;
    }

    pub fn fail_page(&self, page: usize, error: SyncError) {
        *self.script.page_error.lock() = Some((page, error));
    }

    /// Ends the search at `page` as a server size limit would.
    pub fn truncate_at(&self, page: usize) {
        *self.script.truncate_at.lock() = Some(page);
    }

    pub fn open_sessions(&self) -> usize {
        self.script.open.load(Ordering::SeqCst)
    }

    pub fn max_open_sessions(&self) -> usize {
        self.script.max_open.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub fn connect_times(&self) -> Vec<tokio::time::Instant> {
        self.script.connect_times.lock().clone()
    }
}

#[async_trait]
impl DirectoryConnector for ScriptedDirectory {
    async fn connect(&self, _config: &SourceConfig) -> SyncResult<Box<dyn DirectorySession>> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        self.script
            .connect_times
            .lock()
            .push(tokio::time::Instant::now());

        if let Some(err) = self.script.connect_error.lock().clone() {
            return Err(err);
        }

        let open = self.script.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.max_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            pages: 0,
            closed: false,
        }))
    }
}

struct ScriptedSession {
    script: Arc<Script>,
    pages: usize,
    closed: bool,
}

fn cookie(page: usize) -> Option<PageCookie> {
    PageCookie::new((page as u64).to_be_bytes().to_vec())
}

#[async_trait]
impl DirectorySession for ScriptedSession {
    async fn bind(&mut self, _credentials: Option<&BindCredentials>) -> SyncResult<()> {
        if self.script.failing_bind.load(Ordering::SeqCst) {
            return Err(SyncError::unreachable("invalid credentials"));
        }
        Ok(())
    }

    async fn search_page(
        &mut self,
        _request: &SearchRequest,
        _cookie: Option<PageCookie>,
    ) -> SyncResult<SearchPage> {
        let delay = *self.script.page_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let page_index = self.pages;
        self.pages += 1;

        if let Some((page, err)) = self.script.page_error.lock().clone() {
            if page == page_index {
                return Err(err);
            }
        }

        let size = self.script.page_size.load(Ordering::SeqCst);
        let entries = self.script.entries.lock().clone();
        let start = page_index * size;
        let end = (start + size).min(entries.len());
        let chunk = entries.get(start..end).map(<[RawEntry]>::to_vec).unwrap_or_default();

        let truncated = *self.script.truncate_at.lock() == Some(page_index);
        let next = if truncated {
            None
        } else if self.script.stuck_cookie.load(Ordering::SeqCst) {
            cookie(1)
        } else if end < entries.len() {
            cookie(page_index + 1)
        } else {
            None
        };

        Ok(SearchPage {
            entries: chunk,
            referrals: self.script.references_per_page.load(Ordering::SeqCst),
            next,
            truncated,
        })
    }

    async fn unbind(&mut self) -> SyncResult<()> {
        if !self.closed {
            self.closed = true;
            self.script.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Memory index with injectable failures.
#[derive(Default)]
pub struct FlakyIndex {
    pub inner: MemoryIndex,
    fail_all: AtomicBool,
    fail_after_upsert_calls: Mutex<Option<usize>>,
    fail_upsert_call: Mutex<Option<usize>>,
    truncate_results: AtomicBool,
    upsert_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    call_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FlakyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_after_upsert_calls(&self, calls: usize) {
        *self.fail_after_upsert_calls.lock() = Some(calls);
    }

    /// Fails only the `call`-th upsert (0-based).
    pub fn fail_upsert_call(&self, call: usize) {
        *self.fail_upsert_call.lock() = Some(call);
    }

    pub fn truncate_results(&self) {
        self.truncate_results.store(true, Ordering::SeqCst);
    }

    pub fn with_call_delay(self, delay: Duration) -> Self {
        *self.call_delay.lock() = delay;
        self
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> SyncResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.call_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all.load(Ordering::SeqCst) {
            return Err(SyncError::index_unreachable("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for FlakyIndex {
    async fn bulk_upsert(
        &self,
        target: &IndexTarget,
        documents: &[MappedDocument],
    ) -> SyncResult<Vec<ItemResult>> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        if let Some(limit) = *self.fail_after_upsert_calls.lock() {
            if call >= limit {
                return Err(SyncError::index_unreachable("503 Service Unavailable"));
            }
        }
        if *self.fail_upsert_call.lock() == Some(call) {
            return Err(SyncError::index_unreachable("connection reset"));
        }

        let mut results = self.inner.bulk_upsert(target, documents).await?;
        if self.truncate_results.load(Ordering::SeqCst) {
            results.pop();
        }
        Ok(results)
    }

    async fn bulk_delete(
        &self,
        target: &IndexTarget,
        ids: &[String],
    ) -> SyncResult<Vec<ItemResult>> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.inner.bulk_delete(target, ids).await
    }

    async fn list_document_ids(&self, target: &IndexTarget) -> SyncResult<HashSet<String>> {
        self.enter().await?;
        self.inner.list_document_ids(target).await
    }
}
