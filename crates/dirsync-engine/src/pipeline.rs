//! One scan, end to end.
//!
//! Scanner → Mapper → Reconciler → Writer. Errors that end the scan are
//! folded into the returned [`SyncOutcome`]; nothing propagates past it.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dirsync_core::{
    DirectoryConnector, DocumentIndex, ItemFailure, ScanStatus, SourceConfig, SyncError,
    SyncOutcome, SyncResult,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::mapper::AttributeMapper;
use crate::reconciler::Reconciler;
use crate::scanner::DirectoryScanner;
use crate::writer::IndexWriter;

/// Runs scans against a directory connector and an index.
///
/// Shared by every source's scheduler; holds no per-source state.
pub struct SyncEngine {
    connector: Arc<dyn DirectoryConnector>,
    index: Arc<dyn DocumentIndex>,
}

impl SyncEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(connector: Arc<dyn DirectoryConnector>, index: Arc<dyn DocumentIndex>) -> Self {
        Self { connector, index }
    }

    /// Returns the index collaborator.
    #[must_use]
    pub fn index(&self) -> &Arc<dyn DocumentIndex> {
        &self.index
    }

    /// Runs one full scan of a source.
    ///
    /// Deletions are only computed when the directory scan finished without
    /// error or cancellation and returned the complete result set.
    #[instrument(skip_all, fields(source_id = %config.id, index = %config.target.index, doc_kind = %config.target.doc_kind))]
    pub async fn run_scan(&self, config: &SourceConfig, cancel: &CancellationToken) -> SyncOutcome {
        let started = Instant::now();
        let mut outcome = SyncOutcome::begin(&config.id, config.sync_mode);

        if let Err(e) = self.execute(config, cancel, &mut outcome).await {
            outcome.status = ScanStatus::failed(&e);
        }

        outcome.completed_at = Utc::now();
        outcome.duration = started.elapsed();

        let duration_ms = u64::try_from(outcome.duration.as_millis()).unwrap_or(u64::MAX);
        match &outcome.status {
            ScanStatus::Succeeded => tracing::info!(
                entries_seen = outcome.entries_seen,
                skipped = outcome.skipped,
                created = outcome.created,
                updated = outcome.updated,
                unchanged = outcome.unchanged,
                deleted = outcome.deleted,
                failures = outcome.failures.len(),
                duration_ms,
                "Scan completed"
            ),
            ScanStatus::Cancelled => tracing::info!(
                upserts = outcome.upserts(),
                duration_ms,
                "Scan cancelled"
            ),
            ScanStatus::Failed { kind, message } => tracing::warn!(
                ?kind,
                error = %message,
                upserts = outcome.upserts(),
                duration_ms,
                "Scan failed"
            ),
        }

        outcome
    }

    async fn execute(
        &self,
        config: &SourceConfig,
        cancel: &CancellationToken,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<()> {
        let mapper = AttributeMapper::new(config);
        let mut reconciler = Reconciler::new(config.sync_mode);

        let mut scanner =
            DirectoryScanner::open(self.connector.as_ref(), config, cancel.clone()).await?;
        let drained = drain(&mut scanner, &mapper, &mut reconciler).await;
        let stats = scanner.stats();
        scanner.close().await;

        outcome.entries_seen = stats.entries_seen;
        outcome.skipped = stats.skipped_containers + stats.skipped_referrals;
        drained?;

        let existing = if !config.sync_mode.deletes() {
            None
        } else if stats.truncated {
            tracing::warn!("Incomplete directory view; skipping deletions");
            None
        } else {
            Some(self.index.list_document_ids(&config.target).await?)
        };

        let mut plan = reconciler.finish(existing.as_ref());
        plan.result.skipped_containers = stats.skipped_containers;
        plan.result.skipped_referrals = stats.skipped_referrals;
        plan.result.entries_seen = stats.entries_seen;
        tracing::debug!(
            pages = stats.pages,
            entries_seen = plan.result.entries_seen,
            skipped = plan.result.skipped(),
            duplicates = plan.result.duplicates,
            upserts = plan.upserts.len(),
            deletes = plan.deletes.len(),
            "Reconciled scan"
        );
        outcome.failures.append(&mut plan.result.failures);

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let writer = IndexWriter::new(self.index.clone(), config);
        let mut report = writer.apply(plan.upserts, plan.deletes, cancel).await;

        outcome.created = report.created;
        outcome.updated = report.updated;
        outcome.unchanged = report.unchanged;
        outcome.deleted = report.deleted;
        outcome.failures.append(&mut report.failures);

        report.aborted.map_or(Ok(()), Err)
    }
}

async fn drain(
    scanner: &mut DirectoryScanner<'_>,
    mapper: &AttributeMapper,
    reconciler: &mut Reconciler,
) -> SyncResult<()> {
    while let Some(entry) = scanner.next_entry().await? {
        match mapper.map(&entry) {
            Ok(document) => reconciler.accept(document),
            Err(e @ SyncError::MissingIdentifier { .. }) => {
                tracing::warn!(dn = %entry.dn, error = %e, "Skipping entry");
                reconciler.reject(ItemFailure::from_error(&e));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FlakyIndex, ScriptedDirectory, person};
    use dirsync_core::{ErrorKind, FailureKind, IndexTarget, RawEntry, SyncMode};

    fn config(mode: SyncMode) -> SourceConfig {
        SourceConfig::builder()
            .id("ldapserver0")
            .host("localhost")
            .base_dn("ou=system")
            .filter("(objectClass=person)")
            .attributes(["sn", "cn", "objectClass"])
            .fields(["_id", "name", "groups"])
            .target("ldapserver0", "person")
            .page_size(2)
            .sync_mode(mode)
            .build()
            .unwrap()
    }

    fn target() -> IndexTarget {
        IndexTarget::new("ldapserver0", "person")
    }

    fn people() -> Vec<RawEntry> {
        vec![
            person("john"),
            person("christopher"),
            RawEntry::new("ou=Computers,uid=clint,ou=users,ou=system")
                .with_attr("objectClass", ["organizationalUnit", "top"]),
            person("clint"),
            RawEntry::new("uid=admin,ou=system")
                .with_attr("objectClass", ["person", "top"])
                .with_attr("sn", ["administrator"])
                .with_attr("cn", ["system administrator"]),
        ]
    }

    fn engine(directory: &ScriptedDirectory, index: &Arc<FlakyIndex>) -> SyncEngine {
        SyncEngine::new(Arc::new(directory.clone()), index.clone())
    }

    #[tokio::test]
    async fn scan_indexes_leaf_entries() {
        let directory = ScriptedDirectory::paged(people(), 2);
        let index = Arc::new(FlakyIndex::new());

        let outcome = engine(&directory, &index)
            .run_scan(&config(SyncMode::Strict), &CancellationToken::new())
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.status);
        assert_eq!(outcome.created, 4);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.entries_seen, 5);
        assert_eq!(
            index.inner.ids(&target()),
            vec!["administrator", "christopher", "clint", "john"]
        );
        assert_eq!(directory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn second_scan_is_idempotent() {
        let directory = ScriptedDirectory::paged(people(), 2);
        let index = Arc::new(FlakyIndex::new());
        let engine = engine(&directory, &index);
        let config = config(SyncMode::Strict);

        engine.run_scan(&config, &CancellationToken::new()).await;
        let second = engine.run_scan(&config, &CancellationToken::new()).await;

        assert!(second.is_success());
        assert_eq!(second.changed(), 0);
        assert_eq!(second.unchanged, 4);
        assert_eq!(second.deleted, 0);
    }

    #[tokio::test]
    async fn vanished_entry_is_deleted() {
        let directory = ScriptedDirectory::paged(people(), 2);
        let index = Arc::new(FlakyIndex::new());
        let engine = engine(&directory, &index);
        let config = config(SyncMode::Strict);

        engine.run_scan(&config, &CancellationToken::new()).await;
        let mut remaining = people();
        remaining.remove(1);
        directory.set_entries(remaining);

        let second = engine.run_scan(&config, &CancellationToken::new()).await;
        assert_eq!(second.deleted, 1);
        assert!(index.inner.get(&target(), "christopher").is_none());
    }

    #[tokio::test]
    async fn append_only_keeps_vanished_documents() {
        let directory = ScriptedDirectory::paged(people(), 2);
        let index = Arc::new(FlakyIndex::new());
        let engine = engine(&directory, &index);
        let config = config(SyncMode::AppendOnly);

        engine.run_scan(&config, &CancellationToken::new()).await;
        directory.set_entries(vec![person("john")]);

        let second = engine.run_scan(&config, &CancellationToken::new()).await;
        assert_eq!(second.deleted, 0);
        assert_eq!(index.inner.count(&target()), 4);
    }

    #[tokio::test]
    async fn missing_identifier_is_isolated() {
        let mut entries: Vec<RawEntry> = ["a", "b", "c", "d"].iter().map(|u| person(u)).collect();
        entries.insert(
            2,
            RawEntry::new("cn=nobody,ou=users,ou=system")
                .with_attr("objectClass", ["person"])
                .with_attr("cn", ["nobody"]),
        );
        let directory = ScriptedDirectory::paged(entries, 2);
        let index = Arc::new(FlakyIndex::new());

        let outcome = engine(&directory, &index)
            .run_scan(&config(SyncMode::Strict), &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures_of(FailureKind::MissingIdentifier), 1);
        assert_eq!(outcome.upserts(), 4);
    }

    #[tokio::test]
    async fn failed_page_performs_no_deletions() {
        let directory = ScriptedDirectory::paged(people(), 2);
        let index = Arc::new(FlakyIndex::new());
        let engine = engine(&directory, &index);
        let config = config(SyncMode::Strict);
        engine.run_scan(&config, &CancellationToken::new()).await;

        directory.fail_page(1, SyncError::protocol("malformed control"));
        let outcome = engine.run_scan(&config, &CancellationToken::new()).await;

        assert_eq!(outcome.status.error_kind(), Some(ErrorKind::Protocol));
        assert_eq!(outcome.deleted, 0);
        assert_eq!(index.inner.count(&target()), 4);
        assert_eq!(directory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn truncated_search_performs_no_deletions() {
        let directory = ScriptedDirectory::paged(people(), 2);
        let index = Arc::new(FlakyIndex::new());
        let engine = engine(&directory, &index);
        let config = config(SyncMode::Strict);
        engine.run_scan(&config, &CancellationToken::new()).await;

        // Only the first page arrives; the server reports its size limit.
        directory.truncate_at(0);
        let outcome = engine.run_scan(&config, &CancellationToken::new()).await;

        assert!(outcome.is_success(), "{:?}", outcome.status);
        assert_eq!(outcome.unchanged, 2);
        assert_eq!(outcome.deleted, 0);
        assert_eq!(index.inner.count(&target()), 4);
    }

    #[tokio::test]
    async fn cancelled_scan_performs_no_deletions() {
        let directory = ScriptedDirectory::paged(people(), 2);
        let index = Arc::new(FlakyIndex::new());
        let engine = engine(&directory, &index);
        let config = config(SyncMode::Strict);
        engine.run_scan(&config, &CancellationToken::new()).await;

        directory.set_entries(vec![person("john")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = engine.run_scan(&config, &cancel).await;

        assert_eq!(outcome.status, ScanStatus::Cancelled);
        assert_eq!(outcome.deleted, 0);
        assert_eq!(index.inner.count(&target()), 4);
    }

    #[tokio::test]
    async fn unreachable_index_fails_the_scan() {
        let directory = ScriptedDirectory::paged(people(), 2);
        let index = Arc::new(FlakyIndex::new());
        index.fail_all(true);

        let outcome = engine(&directory, &index)
            .run_scan(&config(SyncMode::Strict), &CancellationToken::new())
            .await;
        assert_eq!(outcome.status.error_kind(), Some(ErrorKind::IndexUnreachable));
    }
}
