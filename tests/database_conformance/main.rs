//! Database Conformance Test Suite
//!
//! End-to-end behavior of the public `docstore` API, each scenario run
//! against both storage layouts (single file and bundle directory).
//!
//! ## Areas
//!
//! - **Database info**: counts, sequences, UUID persistence
//! - **Bundles**: open/reopen, bad engine names, missing paths, delete
//! - **Transactions**: nesting depth and the outermost decision
//! - **Raw documents**: put/get/delete in named stores
//! - **All docs**: full scans, ranges, ID lists, deleted documents
//! - **Changes**: sequence-ordered change feeds
//! - **Expiration**: scheduling, enumeration, purge and cancel
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test database_conformance
//! ```

mod test_utils;

mod all_docs;
mod bundles;
mod changes;
mod database_info;
mod expiration;
mod raw_documents;
mod transactions;
