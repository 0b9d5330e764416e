//! Reconciler.
//!
//! Accumulates the documents of one scan and, once the scan is complete,
//! diffs them against the identifiers already in the index.

use std::collections::{HashMap, HashSet};

use dirsync_core::{ItemFailure, MappedDocument, ScanResult, SyncMode};

/// Upserts and deletes computed for one scan.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Every document seen in the scan, in fetch order.
    pub upserts: Vec<MappedDocument>,
    /// Identifiers to delete, sorted. Always empty in append-only mode.
    pub deletes: Vec<String>,
    /// Scan bookkeeping (seen ids, duplicates, per-entry failures).
    pub result: ScanResult,
}

/// Accumulates a scan and computes its index delta.
#[derive(Debug)]
pub struct Reconciler {
    mode: SyncMode,
    result: ScanResult,
    positions: HashMap<String, usize>,
}

impl Reconciler {
    /// Creates a reconciler for one scan.
    #[must_use]
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            result: ScanResult::default(),
            positions: HashMap::new(),
        }
    }

    /// Records a mapped document. A later document with the same
    /// identifier replaces the earlier one in place.
    pub fn accept(&mut self, document: MappedDocument) {
        if let Some(&pos) = self.positions.get(&document.id) {
            tracing::info!(
                id = %document.id,
                previous_dn = %self.result.documents[pos].dn,
                dn = %document.dn,
                "Duplicate document identifier in scan; keeping the later entry"
            );
            self.result.duplicates += 1;
            self.result.documents[pos] = document;
            return;
        }

        self.positions
            .insert(document.id.clone(), self.result.documents.len());
        self.result.seen_ids.insert(document.id.clone());
        self.result.documents.push(document);
    }

    /// Records a per-entry failure.
    pub fn reject(&mut self, failure: ItemFailure) {
        self.result.failures.push(failure);
    }

    /// Returns the number of distinct documents so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.result.documents.len()
    }

    /// Checks if no document was accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.result.documents.is_empty()
    }

    /// Completes the scan.
    ///
    /// `existing` is the index's identifier set for the target; it is only
    /// consulted in strict mode.
    #[must_use]
    pub fn finish(mut self, existing: Option<&HashSet<String>>) -> ReconcilePlan {
        let deletes = match (self.mode, existing) {
            (SyncMode::Strict, Some(existing)) => {
                let mut gone: Vec<String> = existing
                    .difference(&self.result.seen_ids)
                    .cloned()
                    .collect();
                gone.sort();
                gone
            }
            _ => Vec::new(),
        };

        ReconcilePlan {
            upserts: std::mem::take(&mut self.result.documents),
            deletes,
            result: self.result,
        }
    }
}
