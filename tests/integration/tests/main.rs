//! End-to-End Integration Tests
//!
//! These tests run the synchronization engine against an in-memory LDIF
//! directory and an in-memory index.

mod common;
mod scenarios;
mod scheduling;
mod sync;
