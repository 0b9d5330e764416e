//! Scan results and outcomes.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SyncMode;
use crate::entry::MappedDocument;
use crate::error::{ErrorKind, SyncError};

/// Kind of a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The entry had no identifying value.
    MissingIdentifier,
    /// The index rejected the document or delete.
    Rejected,
}

/// A failure affecting a single entry or document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Document identifier, when one could be derived.
    pub id: Option<String>,
    /// Source DN, when known.
    pub dn: Option<String>,
    /// Failure kind.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
}

impl ItemFailure {
    /// Creates a failure from a rejected entry.
    #[must_use]
    pub fn from_error(err: &SyncError) -> Self {
        match err {
            SyncError::MissingIdentifier { dn, .. } => Self {
                id: None,
                dn: Some(dn.clone()),
                kind: FailureKind::MissingIdentifier,
                message: err.to_string(),
            },
            other => Self {
                id: None,
                dn: None,
                kind: FailureKind::Rejected,
                message: other.to_string(),
            },
        }
    }

    /// Creates a failure for a document the index rejected.
    #[must_use]
    pub fn rejected(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            dn: None,
            kind: FailureKind::Rejected,
            message: message.into(),
        }
    }
}

/// Accumulated result of one directory scan, before writing.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Every identifier seen in this scan.
    pub seen_ids: HashSet<String>,
    /// Entries dropped because of a container object class.
    pub skipped_containers: usize,
    /// Referral entries and search references dropped.
    pub skipped_referrals: usize,
    /// Documents in fetch order; a later duplicate replaces the earlier one.
    pub documents: Vec<MappedDocument>,
    /// Per-entry failures.
    pub failures: Vec<ItemFailure>,
    /// Identifiers seen more than once.
    pub duplicates: usize,
    /// Entries returned by the directory, including skipped ones.
    pub entries_seen: usize,
}

impl ScanResult {
    /// Returns the total number of skipped entries.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped_containers + self.skipped_referrals
    }
}

/// Final status of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    /// Scan and writes completed (per-item failures may still exist).
    Succeeded,
    /// A scan-fatal or write-fatal error ended the scan.
    Failed {
        /// Error classification.
        kind: ErrorKind,
        /// Error message.
        message: String,
    },
    /// The scan was cancelled between pages or batches.
    Cancelled,
}

impl ScanStatus {
    /// Creates a failed status from an error.
    #[must_use]
    pub fn failed(err: &SyncError) -> Self {
        if matches!(err, SyncError::Cancelled) {
            return Self::Cancelled;
        }
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Returns the failure kind, if any.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Summary of one scan, handed to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Source identifier.
    pub source_id: String,
    /// Unique scan identifier.
    pub scan_id: Uuid,
    /// Reconciliation mode used.
    pub mode: SyncMode,
    /// Scan start.
    pub started_at: DateTime<Utc>,
    /// Scan end.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Entries returned by the directory.
    pub entries_seen: usize,
    /// Container and referral entries dropped.
    pub skipped: usize,
    /// Documents newly created.
    pub created: usize,
    /// Documents whose content changed.
    pub updated: usize,
    /// Documents rewritten with identical content.
    pub unchanged: usize,
    /// Documents deleted.
    pub deleted: usize,
    /// Per-entry and per-item failures.
    pub failures: Vec<ItemFailure>,
    /// Final status.
    pub status: ScanStatus,
}

impl SyncOutcome {
    /// Creates an empty outcome for a scan starting now.
    #[must_use]
    pub fn begin(source_id: impl Into<String>, mode: SyncMode) -> Self {
        let now = Utc::now();
        Self {
            source_id: source_id.into(),
            scan_id: Uuid::now_v7(),
            mode,
            started_at: now,
            completed_at: now,
            duration: Duration::ZERO,
            entries_seen: 0,
            skipped: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            failures: Vec::new(),
            status: ScanStatus::Succeeded,
        }
    }

    /// Total successful upserts.
    #[must_use]
    pub const fn upserts(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    /// Upserts that changed index content.
    #[must_use]
    pub const fn changed(&self) -> usize {
        self.created + self.updated
    }

    /// Counts failures of one kind.
    #[must_use]
    pub fn failures_of(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    /// Checks if the scan succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ScanStatus::Succeeded
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
