//! Raw document store
//!
//! Named key/value tables with no revisions, sequences or expiration.
//! The engine keeps its own bookkeeping here, such as the UUID pair in
//! the `"info"` store.

use docstore_core::{Error, ErrorCode, OwnedBuffer, Result};
use docstore_storage::{Mutation, RawRecord};

use crate::database::Database;

/// A raw document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Key within its store
    pub key: OwnedBuffer,
    /// Metadata
    pub meta: OwnedBuffer,
    /// Body
    pub body: OwnedBuffer,
}

impl Database {
    /// Write a raw document
    ///
    /// Must be called inside a transaction. Empty `meta` and `body`
    /// together delete the document.
    pub fn raw_put(
        &self,
        store: &str,
        key: impl AsRef<[u8]>,
        meta: impl AsRef<[u8]>,
        body: impl AsRef<[u8]>,
    ) -> Result<()> {
        let (key, meta, body) = (key.as_ref(), meta.as_ref(), body.as_ref());
        if store.is_empty() {
            return Err(Error::engine(ErrorCode::InvalidParameter));
        }
        let mutation = if meta.is_empty() && body.is_empty() {
            Mutation::DeleteRaw {
                store: store.to_string(),
                key: key.to_vec(),
            }
        } else {
            Mutation::PutRaw {
                store: store.to_string(),
                key: key.to_vec(),
                record: RawRecord {
                    meta: OwnedBuffer::copy_from(meta),
                    body: OwnedBuffer::copy_from(body),
                },
            }
        };
        self.inner().write(|context| context.apply(mutation))
    }

    /// Read a raw document
    ///
    /// # Errors
    ///
    /// `NotFound` if there is none.
    pub fn raw_get(&self, store: &str, key: impl AsRef<[u8]>) -> Result<RawDocument> {
        let key = key.as_ref();
        let state = self.inner().read_state()?;
        let record = state
            .raw(store, key)
            .ok_or_else(|| Error::engine(ErrorCode::NotFound))?;
        Ok(RawDocument {
            key: OwnedBuffer::copy_from(key),
            meta: record.meta.clone(),
            body: record.body.clone(),
        })
    }

    /// Delete a raw document; same as `raw_put` with empty meta and body
    pub fn raw_delete(&self, store: &str, key: impl AsRef<[u8]>) -> Result<()> {
        self.raw_put(store, key, b"", b"")
    }
}
