//! Database engine for docstore
//!
//! This crate ties the storage and concurrency layers together:
//! - Database: open/close/delete, the path registry, UUIDs and compaction
//! - Transactions: nestable manual API plus closure helpers with retry
//! - Documents: revision-tracked put/get/purge with conflict detection
//! - Enumerators: by-ID ranges, explicit ID lists and change feeds
//! - Expiration: per-document timestamps, enumeration and purge
//! - Raw stores: unversioned named key/value tables
//!
//! Every handle (documents, enumerators) keeps the database's shared state
//! alive, so using one after `close` fails with `NotOpen`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod document;
pub mod enumerator;
pub mod expiry;
pub mod raw;

pub use database::{
    Database, DatabaseConfig, DatabaseFlags, RetryConfig, INFO_STORE, PRIVATE_UUID_KEY,
    PUBLIC_UUID_KEY,
};
pub use document::{Document, DocumentInfo, PutRequest, Revision, RevisionBody};
pub use enumerator::{DocEnumerator, EnumeratorFlags, EnumeratorOptions};
pub use expiry::ExpiryEnumerator;
pub use raw::RawDocument;

pub use docstore_concurrency::{TransactionMetrics, WaitPolicy};
pub use docstore_storage::SyncMode;
