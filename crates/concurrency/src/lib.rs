//! Concurrency layer for docstore
//!
//! This crate implements the single-writer transaction model:
//! - TransactionManager: reentrant per-thread writer lock with a nesting
//!   counter and a configurable wait policy (block, fail fast, timeout)
//! - TransactionContext: copy-on-write working state plus the writeset
//!   that becomes the commit record
//!
//! Readers never take the writer lock; they read committed snapshots.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;

pub use manager::{TransactionManager, TransactionMetrics, WaitPolicy};
pub use transaction::{PendingOperations, TransactionContext};
