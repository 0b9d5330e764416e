//! Document index contract.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::IndexTarget;
use crate::entry::MappedDocument;
use crate::error::SyncResult;

/// Result of one item inside a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// Document did not exist before.
    Created,
    /// Document existed with different content.
    Updated,
    /// Document existed with identical content.
    Unchanged,
    /// Document was deleted.
    Deleted,
    /// Delete target did not exist.
    NotFound,
    /// Item was rejected.
    Failed(String),
}

impl ItemStatus {
    /// Checks if the item was applied (or was already in the requested state).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Per-item result of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    /// Document identifier.
    pub id: String,
    /// Item status.
    pub status: ItemStatus,
}

impl ItemResult {
    /// Creates an item result.
    #[must_use]
    pub fn new(id: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }

    /// Creates a failed item result.
    #[must_use]
    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(id, ItemStatus::Failed(reason.into()))
    }
}

/// Document index collaborator.
///
/// Implementations must be safe for concurrent use by several sources.
/// An `Err` from any method fails the whole request; per-item problems
/// are reported as [`ItemStatus::Failed`] entries.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Creates or replaces documents.
    async fn bulk_upsert(
        &self,
        target: &IndexTarget,
        documents: &[MappedDocument],
    ) -> SyncResult<Vec<ItemResult>>;

    /// Deletes documents by identifier.
    async fn bulk_delete(&self, target: &IndexTarget, ids: &[String])
        -> SyncResult<Vec<ItemResult>>;

    /// Lists the identifiers currently stored for a target.
    async fn list_document_ids(&self, target: &IndexTarget) -> SyncResult<HashSet<String>>;
}
