//! Index Writer.
//!
//! Applies a reconcile plan in bounded bulk batches. All upsert batches run
//! before any delete batch. Up to `bulk_concurrency` batches are in flight at
//! once; results are consumed in submission order.
//!
//! A per-item failure is recorded and the batch continues. A batch-level
//! failure stops the writer: batches not yet started are never sent, while
//! batches already sent run to completion and their results are recorded.

use std::sync::Arc;

use dirsync_core::{
    DocumentIndex, IndexTarget, ItemFailure, ItemResult, ItemStatus, MappedDocument, SourceConfig,
    SyncError, SyncResult,
};
use futures::stream::{FuturesOrdered, StreamExt};
use tokio_util::sync::CancellationToken;

/// Totals of one write pass.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Documents created.
    pub created: usize,
    /// Documents updated.
    pub updated: usize,
    /// Documents rewritten unchanged.
    pub unchanged: usize,
    /// Documents deleted (including deletes of already-missing documents).
    pub deleted: usize,
    /// Per-item failures.
    pub failures: Vec<ItemFailure>,
    /// Batches sent.
    pub batches: usize,
    /// Error that stopped the writer, if any.
    pub aborted: Option<SyncError>,
}

impl WriteReport {
    fn record(&mut self, requested: &[String], results: Vec<ItemResult>) {
        let returned = results.len();
        for result in results {
            match result.status {
                ItemStatus::Created => self.created += 1,
                ItemStatus::Updated => self.updated += 1,
                ItemStatus::Unchanged => self.unchanged += 1,
                ItemStatus::Deleted | ItemStatus::NotFound => self.deleted += 1,
                ItemStatus::Failed(reason) => {
                    tracing::warn!(id = %result.id, %reason, "Index rejected item");
                    self.failures.push(ItemFailure::rejected(result.id, reason));
                }
            }
        }
        for id in requested.iter().skip(returned) {
            tracing::warn!(%id, "No result returned for item");
            self.failures
                .push(ItemFailure::rejected(id.clone(), "no result returned by index"));
        }
    }
}

enum Batch {
    Upsert(Vec<MappedDocument>),
    Delete(Vec<String>),
}

impl Batch {
    fn ids(&self) -> Vec<String> {
        match self {
            Self::Upsert(docs) => docs.iter().map(|d| d.id.clone()).collect(),
            Self::Delete(ids) => ids.clone(),
        }
    }
}

/// Sends documents and deletions to the index.
pub struct IndexWriter {
    index: Arc<dyn DocumentIndex>,
    target: IndexTarget,
    bulk_size: usize,
    concurrency: usize,
}

impl IndexWriter {
    /// Creates a writer for a source's target and batch settings.
    #[must_use]
    pub fn new(index: Arc<dyn DocumentIndex>, config: &SourceConfig) -> Self {
        Self {
            index,
            target: config.target.clone(),
            bulk_size: config.bulk_size.max(1),
            concurrency: config.bulk_concurrency.max(1),
        }
    }

    /// Applies upserts, then deletes.
    ///
    /// Cancellation is checked before each batch is sent; a cancelled pass
    /// reports [`SyncError::Cancelled`] in `aborted`.
    pub async fn apply(
        &self,
        upserts: Vec<MappedDocument>,
        deletes: Vec<String>,
        cancel: &CancellationToken,
    ) -> WriteReport {
        let mut report = WriteReport::default();

        let upsert_batches = upserts
            .chunks(self.bulk_size)
            .map(|chunk| Batch::Upsert(chunk.to_vec()))
            .collect();
        self.run_phase(upsert_batches, cancel, &mut report).await;

        if report.aborted.is_none() && !deletes.is_empty() {
            let delete_batches = deletes
                .chunks(self.bulk_size)
                .map(|chunk| Batch::Delete(chunk.to_vec()))
                .collect();
            self.run_phase(delete_batches, cancel, &mut report).await;
        }

        report
    }

    async fn run_phase(
        &self,
        batches: Vec<Batch>,
        cancel: &CancellationToken,
        report: &mut WriteReport,
    ) {
        let mut pending = batches.into_iter();
        let mut in_flight = FuturesOrdered::new();
        let mut stopped = report.aborted.is_some();

        loop {
            while !stopped && in_flight.len() < self.concurrency {
                let Some(batch) = pending.next() else {
                    break;
                };
                if cancel.is_cancelled() {
                    report.aborted.get_or_insert(SyncError::Cancelled);
                    stopped = true;
                    break;
                }
                in_flight.push_back(async move {
                    let result = self.send(&batch).await;
                    (batch.ids(), result)
                });
            }

            let Some((ids, result)) = in_flight.next().await else {
                break;
            };
            match result {
                Ok(items) => {
                    report.batches += 1;
                    report.record(&ids, items);
                }
                Err(e) => {
                    if !stopped {
                        tracing::error!(
                            index = %self.target.index,
                            doc_kind = %self.target.doc_kind,
                            error = %e,
                            in_flight = in_flight.len(),
                            "Bulk request failed; abandoning remaining batches"
                        );
                    }
                    stopped = true;
                    report.aborted.get_or_insert(e);
                }
            }
        }
    }

    async fn send(&self, batch: &Batch) -> SyncResult<Vec<ItemResult>> {
        match batch {
            Batch::Upsert(docs) => self.index.bulk_upsert(&self.target, docs).await,
            Batch::Delete(ids) => self.index.bulk_delete(&self.target, ids).await,
        }
    }
}
