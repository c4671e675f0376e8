//! Document expiration
//!
//! Each document has at most one expiration timestamp (Unix seconds),
//! kept in an index ordered by time. Setting `CANCEL_EXPIRATION` (or 0)
//! removes the entry.
//!
//! `enumerate_expired` captures every entry due at creation time. Its
//! `purge_expired` clears the captured entries from the index, skipping any
//! that have since been cancelled or moved to a different time. Removing
//! the documents themselves is left to the caller (`purge_document`).

use std::fmt;
use std::sync::Arc;

use docstore_core::{
    unix_now, Error, ErrorCode, OwnedBuffer, Result, CANCEL_EXPIRATION, NO_EXPIRATION,
};
use docstore_storage::Mutation;
use tracing::{debug, info};

use crate::database::{Database, DatabaseInner};

impl Database {
    /// Schedule `doc_id` to expire at `timestamp`
    ///
    /// Opens and commits a transaction of its own if the calling thread
    /// has none. Setting the timestamp it already has is a no-op.
    ///
    /// # Errors
    ///
    /// `NotFound` if the document doesn't exist.
    pub fn set_expiration(&self, doc_id: impl AsRef<[u8]>, timestamp: u64) -> Result<()> {
        let doc_id = doc_id.as_ref();
        self.inner().write_implicit(|context| {
            if context.state().document(doc_id).is_none() {
                return Err(Error::engine(ErrorCode::NotFound));
            }
            let existing = context.state().expirations().get(doc_id);
            if timestamp == CANCEL_EXPIRATION || timestamp == NO_EXPIRATION {
                if existing.is_some() {
                    context.apply(Mutation::ClearExpiration {
                        doc_id: doc_id.to_vec(),
                    })?;
                }
            } else if existing != Some(timestamp) {
                context.apply(Mutation::SetExpiration {
                    doc_id: doc_id.to_vec(),
                    expires_at: timestamp,
                })?;
            }
            Ok(())
        })?;
        debug!(target: "docstore::expiry", timestamp, "Set expiration");
        Ok(())
    }

    /// Expiration timestamp of `doc_id`, or 0 if none is scheduled
    pub fn get_expiration(&self, doc_id: impl AsRef<[u8]>) -> Result<u64> {
        let state = self.inner().read_state()?;
        Ok(state
            .expirations()
            .get(doc_id.as_ref())
            .unwrap_or(NO_EXPIRATION))
    }

    /// Earliest scheduled expiration, or 0 if none
    pub fn next_expiration(&self) -> Result<u64> {
        let state = self.inner().read_state()?;
        Ok(state.expirations().next().unwrap_or(NO_EXPIRATION))
    }

    /// Enumerate documents due to expire by now
    pub fn enumerate_expired(&self) -> Result<ExpiryEnumerator> {
        self.enumerate_expired_at(unix_now())
    }

    /// Enumerate documents due to expire at or before `now`
    pub fn enumerate_expired_at(&self, now: u64) -> Result<ExpiryEnumerator> {
        let state = self.inner().read_state()?;
        let entries = state.expirations().find_expired(now);
        debug!(target: "docstore::expiry", now, due = entries.len(), "Enumerating expired");
        Ok(ExpiryEnumerator {
            db: Arc::clone(self.inner()),
            entries,
            next: 0,
            current: None,
            closed: false,
        })
    }
}

/// Cursor over expired documents, fixed at creation
pub struct ExpiryEnumerator {
    db: Arc<DatabaseInner>,
    /// `(doc ID, timestamp)` in expiration order
    entries: Vec<(Vec<u8>, u64)>,
    next: usize,
    current: Option<usize>,
    closed: bool,
}

impl ExpiryEnumerator {
    /// Move to the next expired document
    ///
    /// Returns false when there are no more, and on every call after that.
    pub fn advance(&mut self) -> Result<bool> {
        if self.closed || self.next >= self.entries.len() {
            self.current = None;
            return Ok(false);
        }
        self.db.ensure_open()?;
        self.current = Some(self.next);
        self.next += 1;
        Ok(true)
    }

    fn current(&self) -> Result<&(Vec<u8>, u64)> {
        self.current
            .and_then(|idx| self.entries.get(idx))
            .ok_or_else(|| Error::engine(ErrorCode::InvalidParameter))
    }

    /// ID of the current document
    ///
    /// # Errors
    ///
    /// `InvalidParameter` unless positioned by a successful `advance`.
    pub fn doc_id(&self) -> Result<OwnedBuffer> {
        self.current()
            .map(|(doc_id, _)| OwnedBuffer::copy_from(doc_id))
    }

    /// Expiration timestamp of the current document
    pub fn expires_at(&self) -> Result<u64> {
        self.current().map(|(_, timestamp)| *timestamp)
    }

    /// Number of entries captured
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was due
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear every captured entry whose expiration is unchanged
    ///
    /// The documents stay in the database; only their expiration is
    /// removed. Runs in its own transaction unless the calling thread has
    /// one open. Returns the number of entries cleared.
    ///
    /// # Errors
    ///
    /// `NotOpen` if the enumerator or the database was closed.
    pub fn purge_expired(&mut self) -> Result<usize> {
        if self.closed {
            return Err(Error::engine(ErrorCode::NotOpen));
        }
        let entries = &self.entries;
        let cleared = self.db.write_implicit(|context| {
            let mut cleared = 0;
            for (doc_id, timestamp) in entries {
                if context.state().expirations().get(doc_id) != Some(*timestamp) {
                    continue;
                }
                context.apply(Mutation::ClearExpiration {
                    doc_id: doc_id.clone(),
                })?;
                cleared += 1;
            }
            Ok(cleared)
        })?;
        info!(
            target: "docstore::expiry",
            captured = self.entries.len(),
            cleared,
            "Cleared expired entries"
        );
        Ok(cleared)
    }

    /// Release the captured entries. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
        self.current = None;
        self.entries = Vec::new();
    }
}

impl fmt::Debug for ExpiryEnumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiryEnumerator")
            .field("entries", &self.entries.len())
            .field("next", &self.next)
            .field("closed", &self.closed)
            .finish()
    }
}
