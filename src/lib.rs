//! docstore - embedded transactional, versioned document store
//!
//! A database is a single file (or a bundle directory) holding revisioned
//! documents, unversioned raw key/value stores and per-document
//! expiration times. All writes happen inside transactions; readers on
//! other threads see committed state only.
//!
//! # Quick Start
//!
//! ```ignore
//! use docstore::{Database, DatabaseConfig, PutRequest};
//!
//! let db = Database::open("app.db", &DatabaseConfig::default())?;
//! let doc = db.transaction(|db| db.put_document(&PutRequest::new("doc-1").body("{}")))?;
//! assert_eq!(db.get_document("doc-1")?.rev_id(), doc.rev_id());
//! ```
//!
//! # Architecture
//!
//! - `docstore-core`: slices, buffers, errors and document metadata types
//! - `docstore-storage`: the append-only commit log and in-memory tables
//! - `docstore-concurrency`: the single-writer transaction manager
//! - `docstore-engine`: the `Database` API built on the layers above
//!
//! Only the engine and core types are re-exported here.

pub use docstore_core::*;
pub use docstore_engine::*;
