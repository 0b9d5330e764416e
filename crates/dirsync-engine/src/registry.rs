//! Source registry.
//!
//! Process-wide map from source identifier to its running scheduler. Adding
//! a source starts its scheduler; removing it stops the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use dirsync_core::{SourceConfig, SyncError, SyncMode, SyncResult};
use parking_lot::RwLock;

use crate::pipeline::SyncEngine;
use crate::scheduler::{SourceScheduler, SourceStatus};

/// Registry of running sources.
pub struct SourceRegistry {
    engine: Arc<SyncEngine>,
    sources: RwLock<HashMap<String, Arc<SourceScheduler>>>,
}

impl SourceRegistry {
    /// Creates an empty registry whose sources scan through `engine`.
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a source and starts its scheduler.
    ///
    /// ## Errors
    ///
    /// - [`SyncError::DuplicateSource`] if the identifier is taken
    /// - [`SyncError::TargetConflict`] if a strict-mode source already
    ///   writes to the same index target while either source is strict
    pub fn add(&self, config: SourceConfig) -> SyncResult<SourceStatus> {
        let mut sources = self.sources.write();

        if sources.contains_key(&config.id) {
            return Err(SyncError::DuplicateSource(config.id));
        }

        let conflict = sources.values().map(|s| s.config()).find(|existing| {
            existing.target == config.target
                && (existing.sync_mode == SyncMode::Strict || config.sync_mode == SyncMode::Strict)
        });
        if let Some(existing) = conflict {
            return Err(SyncError::TargetConflict {
                target: config.target.to_string(),
                owner: existing.id.clone(),
            });
        }

        let id = config.id.clone();
        let scheduler = SourceScheduler::start(Arc::new(config), self.engine.clone());
        let status = scheduler.status();
        sources.insert(id, scheduler);
        Ok(status)
    }

    /// Deregisters a source, waiting for its in-flight scan to finish.
    ///
    /// ## Errors
    ///
    /// [`SyncError::UnknownSource`] if no such source is registered.
    pub async fn remove(&self, id: &str) -> SyncResult<()> {
        let scheduler = self
            .sources
            .write()
            .remove(id)
            .ok_or_else(|| SyncError::UnknownSource(id.to_string()))?;

        scheduler.stop().await;
        tracing::info!(source_id = %id, "Source removed");
        Ok(())
    }

    /// Runs a scan of a source now.
    ///
    /// ## Errors
    ///
    /// - [`SyncError::UnknownSource`] if no such source is registered
    /// - [`SyncError::SourceStopped`] if its scheduler has stopped
    pub fn trigger_scan_now(&self, id: &str) -> SyncResult<()> {
        self.get(id)?.trigger_scan_now()
    }

    /// Returns the status of one source.
    ///
    /// ## Errors
    ///
    /// [`SyncError::UnknownSource`] if no such source is registered.
    pub fn status(&self, id: &str) -> SyncResult<SourceStatus> {
        Ok(self.get(id)?.status())
    }

    /// Returns the status of every source, ordered by identifier.
    #[must_use]
    pub fn list(&self) -> Vec<SourceStatus> {
        let mut statuses: Vec<SourceStatus> =
            self.sources.read().values().map(|s| s.status()).collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Returns the number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    /// Checks if no source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// Checks if a source is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sources.read().contains_key(id)
    }

    /// Stops every scheduler and empties the registry.
    pub async fn shutdown(&self) {
        let schedulers: Vec<Arc<SourceScheduler>> =
            self.sources.write().drain().map(|(_, s)| s).collect();
        if schedulers.is_empty() {
            return;
        }

        tracing::info!(sources = schedulers.len(), "Stopping source schedulers");
        futures::future::join_all(schedulers.iter().map(|s| s.stop())).await;
    }

    fn get(&self, id: &str) -> SyncResult<Arc<SourceScheduler>> {
        self.sources
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownSource(id.to_string()))
    }
}
