//! Document metadata types
//!
//! - `Sequence`: commit-order counter, 0 means "no sequence"
//! - `RevId`: `<generation>-<digest>` revision identifier
//! - `DocumentFlags` / `RevisionFlags`: bit sets stored with each document
//! - Expiration: absolute Unix seconds, with reserved sentinels
//! - `DatabaseUuids`: the public/private identifier pair

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{Error, ErrorCode, Result};

/// Database sequence number
///
/// Assigned once per stored revision, strictly increasing in commit order.
/// Zero is never assigned and marks placeholder entries.
pub type Sequence = u64;

/// Expiration value meaning "cancel any scheduled expiration"
pub const CANCEL_EXPIRATION: u64 = u64::MAX;

/// Expiration value meaning "nothing scheduled"
pub const NO_EXPIRATION: u64 = 0;

/// Maximum number of ancestor revision IDs kept per document
pub const MAX_REV_HISTORY: usize = 20;

/// Current time in Unix seconds
///
/// Returns 0 if the system clock is before the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ============================================================================
// Revision IDs
// ============================================================================

/// Revision identifier, `<generation>-<digest>`
///
/// Generation is a positive decimal integer; digest is a non-empty run of
/// ASCII alphanumerics.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevId(String);

impl RevId {
    /// Build from a generation and digest
    pub fn new(generation: u32, digest: &str) -> Result<Self> {
        Self::parse(&format!("{}-{}", generation, digest))
    }

    /// Parse and validate
    ///
    /// # Errors
    ///
    /// `BadRevisionID` if the text is not `<generation>-<digest>`.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = || Error::engine(ErrorCode::BadRevisionID);
        let (generation, digest) = text.split_once('-').ok_or_else(bad)?;
        if generation.is_empty() || !generation.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let generation: u32 = generation.parse().map_err(|_| bad())?;
        if generation == 0
            || digest.is_empty()
            || !digest.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(bad());
        }
        Ok(RevId(text.to_string()))
    }

    /// Parse from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text =
            std::str::from_utf8(bytes).map_err(|_| Error::engine(ErrorCode::BadRevisionID))?;
        Self::parse(text)
    }

    /// Generation number
    pub fn generation(&self) -> u32 {
        self.0
            .split_once('-')
            .and_then(|(g, _)| g.parse().ok())
            .unwrap_or(0)
    }

    /// Digest part
    pub fn digest(&self) -> &str {
        self.0.split_once('-').map_or("", |(_, d)| d)
    }

    /// The full text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The full text as bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevId({})", self.0)
    }
}

impl fmt::Display for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RevId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RevId::parse(s)
    }
}

// ============================================================================
// Flags
// ============================================================================

bitflags! {
    /// Document-level flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct DocumentFlags: u32 {
        /// The current revision is a deletion (tombstone)
        const DELETED = 0x01;
        /// The document has unresolved conflicting revisions
        const CONFLICTED = 0x02;
        /// The current revision references attachments
        const HAS_ATTACHMENTS = 0x04;
        /// The document exists in the database
        const EXISTS = 0x1000;
    }
}

bitflags! {
    /// Revision-level flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct RevisionFlags: u8 {
        /// The revision is a deletion
        const DELETED = 0x01;
        /// The revision has no children
        const LEAF = 0x02;
        /// The revision was created by this handle and not yet re-read
        const NEW = 0x04;
        /// The revision references attachments
        const HAS_ATTACHMENTS = 0x08;
    }
}

// ============================================================================
// UUIDs
// ============================================================================

/// Public and private database identifiers
///
/// Generated once when a database file is created and persisted with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseUuids {
    /// Identifier that may be shared with peers
    pub public: Uuid,
    /// Identifier that never leaves the device
    pub private: Uuid,
}

impl DatabaseUuids {
    /// Generate a fresh, distinct pair of version-4 UUIDs
    pub fn generate() -> Self {
        let public = Uuid::new_v4();
        let mut private = Uuid::new_v4();
        while private == public {
            private = Uuid::new_v4();
        }
        DatabaseUuids { public, private }
    }

    /// True if `uuid` has the version-4 / RFC 4122 variant bit layout
    pub fn is_conformant(uuid: &Uuid) -> bool {
        let bytes = uuid.as_bytes();
        bytes[6] & 0xF0 == 0x40 && bytes[8] & 0xC0 == 0x80
    }
}
