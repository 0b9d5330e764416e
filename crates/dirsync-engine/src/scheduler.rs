//! Per-source scheduler.
//!
//! Each source owns one background task that runs scans on a fixed-delay
//! timeline: the poll interval is measured from the end of one scan to the
//! start of the next. Scans of one source never overlap because a single task
//! runs them in sequence.
//!
//! ```text
//! Stopped ──start──▶ Scanning ──▶ Idle ──(interval | trigger)──▶ Scanning
//!                        │          │
//!                        └──stop────┴──▶ Stopping ──▶ Stopped
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dirsync_core::{IndexTarget, SourceConfig, SyncError, SyncMode, SyncOutcome, SyncResult};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::SyncEngine;

/// Lifecycle state of a source's scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerState {
    /// Not polling.
    Stopped,
    /// Waiting for the next scan.
    Idle,
    /// A scan is in progress.
    Scanning,
    /// Stop requested; the in-flight scan is finishing.
    Stopping,
}

impl SchedulerState {
    /// Idle or scanning.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Idle | Self::Scanning)
    }
}

/// Snapshot returned by status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    /// Source identifier.
    pub id: String,
    /// Scheduler state.
    pub state: SchedulerState,
    /// Index target.
    pub target: IndexTarget,
    /// Reconciliation mode.
    pub sync_mode: SyncMode,
    /// Outcome of the most recent completed scan.
    pub last_outcome: Option<SyncOutcome>,
    /// When the next scan is due, if one is scheduled.
    pub next_scan_at: Option<DateTime<Utc>>,
    /// Failed scans since the last successful one.
    pub consecutive_failures: u32,
    /// Scans completed since start.
    pub scans_completed: u64,
}

#[derive(Debug)]
struct Progress {
    state: SchedulerState,
    last_outcome: Option<SyncOutcome>,
    next_scan_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    scans_completed: u64,
}

/// Scheduler driving the scans of one source.
pub struct SourceScheduler {
    config: Arc<SourceConfig>,
    progress: Arc<Mutex<Progress>>,
    trigger: Arc<Notify>,
    shutdown: CancellationToken,
    scan_cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SourceScheduler {
    /// Starts polling a source. The first scan begins immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: Arc<SourceConfig>, engine: Arc<SyncEngine>) -> Arc<Self> {
        let progress = Arc::new(Mutex::new(Progress {
            state: SchedulerState::Scanning,
            last_outcome: None,
            next_scan_at: None,
            consecutive_failures: 0,
            scans_completed: 0,
        }));
        let trigger = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let scan_cancel = CancellationToken::new();

        tracing::info!(
            source_id = %config.id,
            url = %config.url(),
            base_dn = %config.base_dn,
            target = %config.target,
            mode = ?config.sync_mode,
            poll_interval_ms = u64::try_from(config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Starting source scheduler"
        );

        let task = PollLoop {
            config: config.clone(),
            engine,
            progress: progress.clone(),
            trigger: trigger.clone(),
            shutdown: shutdown.clone(),
            scan_cancel: scan_cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        Arc::new(Self {
            config,
            progress,
            trigger,
            shutdown,
            scan_cancel,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Returns the source configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<SourceConfig> {
        &self.config
    }

    /// Starts a scan without waiting out the interval.
    ///
    /// A trigger during a running scan schedules exactly one follow-up scan,
    /// however many triggers arrive.
    ///
    /// ## Errors
    ///
    /// [`SyncError::SourceStopped`] if the scheduler is stopped or stopping.
    pub fn trigger_scan_now(&self) -> SyncResult<()> {
        let state = self.progress.lock().state;
        if !state.is_running() {
            return Err(SyncError::SourceStopped(self.config.id.clone()));
        }
        tracing::debug!(source_id = %self.config.id, ?state, "Scan triggered");
        self.trigger.notify_one();
        Ok(())
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn status(&self) -> SourceStatus {
        let progress = self.progress.lock();
        SourceStatus {
            id: self.config.id.clone(),
            state: progress.state,
            target: self.config.target.clone(),
            sync_mode: self.config.sync_mode,
            last_outcome: progress.last_outcome.clone(),
            next_scan_at: progress.next_scan_at,
            consecutive_failures: progress.consecutive_failures,
            scans_completed: progress.scans_completed,
        }
    }

    /// Checks if the scheduler is polling.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.progress.lock().state.is_running()
    }

    /// Stops polling and waits for an in-flight scan to finish.
    pub async fn stop(&self) {
        {
            let mut progress = self.progress.lock();
            if progress.state.is_running() {
                progress.state = SchedulerState::Stopping;
            }
        }
        self.shutdown.cancel();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(source_id = %self.config.id, error = %e, "Scheduler task failed");
                self.progress.lock().state = SchedulerState::Stopped;
            }
        }
    }

    /// Stops polling and cancels the in-flight scan at its next page or
    /// batch boundary.
    pub async fn cancel(&self) {
        self.scan_cancel.cancel();
        self.stop().await;
    }
}

struct PollLoop {
    config: Arc<SourceConfig>,
    engine: Arc<SyncEngine>,
    progress: Arc<Mutex<Progress>>,
    trigger: Arc<Notify>,
    shutdown: CancellationToken,
    scan_cancel: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.set_scanning();

            let outcome = self.engine.run_scan(&self.config, &self.scan_cancel).await;
            let fatal = outcome.status.error_kind().is_some_and(|kind| kind.is_fatal());
            let failures = self.record(outcome);

            if fatal {
                tracing::error!(
                    source_id = %self.config.id,
                    "Configuration error; source scheduler stopped"
                );
                break;
            }
            if self.shutdown.is_cancelled() {
                break;
            }

            let delay = self.config.backoff.delay(self.config.poll_interval, failures);
            self.set_idle(delay);

            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = self.trigger.notified() => {}
                () = tokio::time::sleep(delay) => {}
            }
        }

        let mut progress = self.progress.lock();
        progress.state = SchedulerState::Stopped;
        progress.next_scan_at = None;
        drop(progress);
        tracing::info!(source_id = %self.config.id, "Source scheduler stopped");
    }

    fn set_scanning(&self) {
        let mut progress = self.progress.lock();
        if progress.state != SchedulerState::Stopping {
            progress.state = SchedulerState::Scanning;
        }
        progress.next_scan_at = None;
    }

    fn set_idle(&self, delay: Duration) {
        let mut progress = self.progress.lock();
        if progress.state != SchedulerState::Stopping {
            progress.state = SchedulerState::Idle;
        }
        progress.next_scan_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
    }

    /// Stores an outcome and returns the consecutive failure count.
    fn record(&self, outcome: SyncOutcome) -> u32 {
        let mut progress = self.progress.lock();
        progress.scans_completed += 1;
        if outcome.is_success() {
            progress.consecutive_failures = 0;
        } else if outcome.status.error_kind().is_some() {
            progress.consecutive_failures = progress.consecutive_failures.saturating_add(1);
        }
        progress.last_outcome = Some(outcome);
        progress.consecutive_failures
    }
}
