//! Core types for docstore
//!
//! This crate defines the foundational types used throughout the system:
//! - Slice / OwnedBuffer: byte-range views with value equality and an
//!   explicit null state
//! - Error: `(domain, code)` pairs with a total message function
//! - Sequence, RevId, DocumentFlags, RevisionFlags: document metadata
//! - Expiration constants and the persisted database UUID pair

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod slice;
pub mod types;

pub use error::{describe, EncodingStatus, Error, ErrorCode, ErrorDomain, Result, StoreStatus};
pub use slice::{OwnedBuffer, Slice};
pub use types::{
    unix_now, DatabaseUuids, DocumentFlags, RevId, RevisionFlags, Sequence, CANCEL_EXPIRATION,
    MAX_REV_HISTORY, NO_EXPIRATION,
};
