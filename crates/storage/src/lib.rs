//! Storage layer for docstore
//!
//! This crate implements the single-writer, log-structured file store:
//! - DatabasePaths: single-file vs bundle (directory) layout
//! - FileHeader: magic, format version and storage-engine selector
//! - CommitRecord: length-prefixed, CRC32-checked commit records
//! - Writeset / Mutation: the binary encoding of one transaction's changes
//! - StoreState: in-memory document, sequence, expiration and raw tables
//! - ExpirationIndex: expiry time → documents, at most one entry per doc
//! - LogStore: replay on open, append-then-publish commit, compaction
//!
//! Readers work on `Arc<StoreState>` snapshots. A commit appends its record
//! to the log, syncs it, and only then swaps in the new state, so readers
//! never observe uncommitted data.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod header;
pub mod log;
pub mod paths;
pub mod record;
pub mod state;
pub mod store;
pub mod ttl;
pub mod writeset;

pub use error::LogError;
pub use header::{FileHeader, FORMAT_VERSION, HEADER_SIZE, LOG_ENGINE};
pub use log::LogFile;
pub use paths::DatabasePaths;
pub use record::CommitRecord;
pub use state::{DocRecord, RawRecord, StoreState};
pub use store::{CommitInfo, LogStore, StoreOptions, SyncMode};
pub use ttl::ExpirationIndex;
pub use writeset::{Mutation, Writeset};
