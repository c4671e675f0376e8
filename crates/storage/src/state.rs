//! In-memory store state
//!
//! `StoreState` is the materialized result of replaying the log. The
//! committed state is shared read-only behind an `Arc`; a transaction works
//! on its own clone and hands the result back on commit. The tables are
//! persistent maps (`im`), so that clone shares every node with the
//! committed state and a write copies only the path it touches.
//!
//! `apply` is the only way state changes, both during replay and inside
//! transactions, so a replayed log always reproduces what the writer saw.

use std::ops::Bound;

use im::OrdMap;

use docstore_core::{DocumentFlags, OwnedBuffer, RevId, Sequence};

use crate::error::LogError;
use crate::ttl::ExpirationIndex;
use crate::writeset::{Mutation, Writeset};

/// Current revision of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRecord {
    /// Document ID
    pub doc_id: Vec<u8>,
    /// Current revision ID
    pub rev_id: RevId,
    /// Sequence assigned when this revision was stored
    pub sequence: Sequence,
    /// Document flags
    pub flags: DocumentFlags,
    /// Body of the current revision; null for deletions
    pub body: OwnedBuffer,
    /// Ancestor revision IDs, newest first
    pub history: Vec<RevId>,
}

impl DocRecord {
    /// True if the current revision is a deletion
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(DocumentFlags::DELETED)
    }
}

/// Value of one raw document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Metadata
    pub meta: OwnedBuffer,
    /// Body
    pub body: OwnedBuffer,
}

/// Materialized database contents
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    docs: OrdMap<Vec<u8>, DocRecord>,
    by_sequence: OrdMap<Sequence, Vec<u8>>,
    expirations: ExpirationIndex,
    raw: OrdMap<String, OrdMap<Vec<u8>, RawRecord>>,
    last_sequence: Sequence,
    live_count: u64,
}

impl StoreState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every mutation of a committed writeset
    pub fn apply_writeset(&mut self, writeset: &Writeset) -> Result<(), LogError> {
        for mutation in &writeset.mutations {
            self.apply(mutation)?;
        }
        self.last_sequence = self.last_sequence.max(writeset.last_sequence);
        Ok(())
    }

    /// Apply one mutation
    ///
    /// # Errors
    ///
    /// `Encoding` if a document revision does not carry a sequence greater
    /// than every sequence applied so far.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), LogError> {
        match mutation {
            Mutation::PutDocument(record) => {
                if record.sequence <= self.last_sequence {
                    return Err(LogError::Encoding(format!(
                        "sequence {} does not follow {}",
                        record.sequence, self.last_sequence
                    )));
                }
                if let Some(old) = self.docs.get(&record.doc_id) {
                    self.by_sequence.remove(&old.sequence);
                    if !old.is_deleted() {
                        self.live_count -= 1;
                    }
                }
                if !record.is_deleted() {
                    self.live_count += 1;
                }
                self.by_sequence
                    .insert(record.sequence, record.doc_id.clone());
                self.last_sequence = record.sequence;
                self.docs.insert(record.doc_id.clone(), record.clone());
            }
            Mutation::PurgeDocument { doc_id } => {
                if let Some(old) = self.docs.remove(doc_id) {
                    self.by_sequence.remove(&old.sequence);
                    if !old.is_deleted() {
                        self.live_count -= 1;
                    }
                }
                self.expirations.remove(doc_id);
            }
            Mutation::SetExpiration { doc_id, expires_at } => {
                self.expirations.set(doc_id, *expires_at);
            }
            Mutation::ClearExpiration { doc_id } => {
                self.expirations.remove(doc_id);
            }
            Mutation::PutRaw { store, key, record } => {
                let mut table = self.raw.get(store).cloned().unwrap_or_default();
                table.insert(key.clone(), record.clone());
                self.raw.insert(store.clone(), table);
            }
            Mutation::DeleteRaw { store, key } => {
                if let Some(mut table) = self.raw.get(store).cloned() {
                    table.remove(key);
                    if table.is_empty() {
                        self.raw.remove(store);
                    } else {
                        self.raw.insert(store.clone(), table);
                    }
                }
            }
        }
        Ok(())
    }

    /// Look up a document by ID
    pub fn document(&self, doc_id: &[u8]) -> Option<&DocRecord> {
        self.docs.get(doc_id)
    }

    /// Look up a document by the sequence of its current revision
    pub fn document_by_sequence(&self, sequence: Sequence) -> Option<&DocRecord> {
        self.by_sequence
            .get(&sequence)
            .and_then(|id| self.docs.get(id))
    }

    /// Documents with IDs inside the given bounds, in ascending ID order
    ///
    /// Inverted bounds yield nothing.
    pub fn documents_in<'a>(
        &'a self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
    ) -> Box<dyn DoubleEndedIterator<Item = &'a DocRecord> + 'a> {
        if !bounds_are_ordered(lower, upper) {
            return Box::new(std::iter::empty());
        }
        Box::new(
            self.docs
                .range::<_, [u8]>((lower, upper))
                .map(|(_, record)| record),
        )
    }

    /// Documents whose current sequence lies in the given bounds, in
    /// ascending sequence order
    pub fn documents_by_sequence<'a>(
        &'a self,
        lower: Bound<Sequence>,
        upper: Bound<Sequence>,
    ) -> Box<dyn DoubleEndedIterator<Item = &'a DocRecord> + 'a> {
        if !bounds_are_ordered(lower.as_ref(), upper.as_ref()) {
            return Box::new(std::iter::empty());
        }
        Box::new(
            self.by_sequence
                .range::<_, Sequence>((lower, upper))
                .filter_map(move |(_, id)| self.docs.get(id)),
        )
    }

    /// The expiration index
    pub fn expirations(&self) -> &ExpirationIndex {
        &self.expirations
    }

    /// Look up a raw document
    pub fn raw(&self, store: &str, key: &[u8]) -> Option<&RawRecord> {
        self.raw.get(store).and_then(|table| table.get(key))
    }

    /// Iterate all raw documents as `(store, key, record)`
    pub fn raw_entries(&self) -> impl Iterator<Item = (&str, &[u8], &RawRecord)> + '_ {
        self.raw.iter().flat_map(|(store, table)| {
            table
                .iter()
                .map(move |(key, record)| (store.as_str(), key.as_slice(), record))
        })
    }

    /// Highest sequence ever assigned
    pub fn last_sequence(&self) -> Sequence {
        self.last_sequence
    }

    /// Number of documents whose current revision is not a deletion
    pub fn document_count(&self) -> u64 {
        self.live_count
    }

    /// Number of stored documents including deletions
    pub fn stored_document_count(&self) -> usize {
        self.docs.len()
    }

    /// A writeset that rebuilds this state from empty
    pub fn to_writeset(&self) -> Writeset {
        let mut writeset = Writeset::new(self.last_sequence);
        for id in self.by_sequence.values() {
            if let Some(record) = self.docs.get(id) {
                writeset.push(Mutation::PutDocument(record.clone()));
            }
        }
        for (doc_id, expires_at) in self.expirations.iter() {
            writeset.push(Mutation::SetExpiration {
                doc_id: doc_id.to_vec(),
                expires_at,
            });
        }
        for (store, key, record) in self.raw_entries() {
            writeset.push(Mutation::PutRaw {
                store: store.to_string(),
                key: key.to_vec(),
                record: record.clone(),
            });
        }
        writeset
    }
}

/// False when the bounds describe an inverted range
fn bounds_are_ordered<T: Ord + ?Sized>(lower: Bound<&T>, upper: Bound<&T>) -> bool {
    match (lower, upper) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Excluded(lo), Bound::Excluded(hi)) => lo < hi,
        (Bound::Included(lo), Bound::Included(hi))
        | (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi)) => lo <= hi,
    }
}
