//! Expiration index for per-document expiry
//!
//! This module provides ExpirationIndex, which answers "which documents are
//! due" without scanning the document table:
//! - Maps expiry timestamp → set of doc IDs in a sorted map
//! - Keeps a reverse doc ID → timestamp map so each document has at most
//!   one entry, and re-setting overwrites instead of duplicating
//! - find_expired() is O(expired count), not O(total documents)
//!
//! Both maps are persistent (`im`), so cloning the index shares structure
//! with the original and costs O(1).

use im::{OrdMap, OrdSet};

/// Expiration index: expiry timestamp (Unix seconds) → doc IDs
#[derive(Debug, Clone, Default)]
pub struct ExpirationIndex {
    /// Timestamp → documents expiring at that time
    by_time: OrdMap<u64, OrdSet<Vec<u8>>>,
    /// Document → its single scheduled timestamp
    by_doc: OrdMap<Vec<u8>, u64>,
}

impl ExpirationIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `doc_id` to expire at `expires_at`
    ///
    /// Replaces any existing entry for the document. Returns the previous
    /// timestamp, if there was one.
    pub fn set(&mut self, doc_id: &[u8], expires_at: u64) -> Option<u64> {
        let previous = self.remove(doc_id);
        let mut docs = self.by_time.get(&expires_at).cloned().unwrap_or_default();
        docs.insert(doc_id.to_vec());
        self.by_time.insert(expires_at, docs);
        self.by_doc.insert(doc_id.to_vec(), expires_at);
        previous
    }

    /// Remove the entry for `doc_id`, returning its timestamp
    ///
    /// If the timestamp's set becomes empty, the timestamp is dropped.
    pub fn remove(&mut self, doc_id: &[u8]) -> Option<u64> {
        let ts = self.by_doc.remove(doc_id)?;
        if let Some(mut docs) = self.by_time.get(&ts).cloned() {
            docs.remove(doc_id);
            if docs.is_empty() {
                self.by_time.remove(&ts);
            } else {
                self.by_time.insert(ts, docs);
            }
        }
        Some(ts)
    }

    /// The timestamp scheduled for `doc_id`
    pub fn get(&self, doc_id: &[u8]) -> Option<u64> {
        self.by_doc.get(doc_id).copied()
    }

    /// The earliest scheduled timestamp
    pub fn next(&self) -> Option<u64> {
        self.by_time.get_min().map(|(ts, _)| *ts)
    }

    /// All `(doc_id, timestamp)` entries with timestamp ≤ `now`
    ///
    /// Ordered by timestamp, then doc ID.
    pub fn find_expired(&self, now: u64) -> Vec<(Vec<u8>, u64)> {
        self.by_time
            .range::<_, u64>(..=now)
            .flat_map(|(ts, docs)| docs.iter().map(move |doc| (doc.clone(), *ts)))
            .collect()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.by_doc.is_empty()
    }

    /// Number of documents with a scheduled expiration
    pub fn len(&self) -> usize {
        self.by_doc.len()
    }

    /// Number of distinct expiry timestamps
    pub fn timestamp_count(&self) -> usize {
        self.by_time.len()
    }

    /// Iterate `(doc_id, timestamp)` in timestamp order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> + '_ {
        self.by_time
            .iter()
            .flat_map(|(ts, docs)| docs.iter().map(move |doc| (doc.as_slice(), *ts)))
    }
}
