//! # dirsync-core
//!
//! Core types for synchronizing a directory source into a document index.
//!
//! This crate contains:
//! - Source configuration and the validated attribute-to-field mapping
//! - Directory entries, mapped documents and scan outcomes
//! - The error taxonomy shared by every crate
//! - The [`DirectoryConnector`] and [`DocumentIndex`] collaborator contracts
//!
//! It performs no I/O; the engine, directory and index crates build on it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod index;
pub mod outcome;
pub mod source;

pub use config::{
    BackoffPolicy, BindCredentials, FieldMapping, FieldRule, IdentifierSource, IndexTarget,
    SearchScope, SourceConfig, SourceConfigBuilder, SourceDefinition, SyncMode, ID_FIELD,
};
pub use entry::{FieldValue, MappedDocument, RawEntry, OBJECT_CLASS};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use filter::SearchFilter;
pub use index::{DocumentIndex, ItemResult, ItemStatus};
pub use outcome::{FailureKind, ItemFailure, ScanResult, ScanStatus, SyncOutcome};
pub use source::{DirectoryConnector, DirectorySession, PageCookie, SearchPage, SearchRequest};
