//! # dirsync-engine
//!
//! Synchronization engine for directory sources.
//!
//! A scan flows through these stages:
//!
//! 1. [`DirectoryScanner`] pulls entries page by page and drops containers
//!    and referrals
//! 2. [`AttributeMapper`] turns each entry into a document
//! 3. [`Reconciler`] collects the documents and computes deletions
//! 4. [`IndexWriter`] applies the result in bulk batches
//!
//! [`SyncEngine`] runs one scan; [`SourceScheduler`] runs scans of one source
//! on a fixed-delay timeline; [`SourceRegistry`] owns every scheduler.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod mapper;
pub mod pipeline;
pub mod reconciler;
pub mod registry;
pub mod scanner;
pub mod scheduler;
pub mod writer;

#[cfg(test)]
mod testing;

pub use mapper::AttributeMapper;
pub use pipeline::SyncEngine;
pub use reconciler::{ReconcilePlan, Reconciler};
pub use registry::SourceRegistry;
pub use scanner::{DirectoryScanner, ScanStats};
pub use scheduler::{SchedulerState, SourceScheduler, SourceStatus};
pub use writer::{IndexWriter, WriteReport};
