//! Document enumerators
//!
//! A `DocEnumerator` walks a snapshot of the database taken when it was
//! created, in one of three modes:
//!
//! - **All docs**: document IDs in byte order, optionally bounded by an
//!   inclusive `[start, end]` range (a null or empty bound is open)
//! - **Some docs**: a caller-supplied ID list in the caller's order, one
//!   entry per occurrence; IDs with no document yield a placeholder with
//!   sequence 0
//! - **Changes**: current revisions with a sequence above a baseline, in
//!   sequence order
//!
//! The cursor keeps only its last position and re-seeks the snapshot on
//! each `advance`, so it never borrows from the snapshot between calls.
//!
//! ```text
//! Created --advance()=true--> Positioned --advance()=false--> Exhausted
//!                               |    ^                          |
//!                               +----+ advance()=true           +-- advance()=false ...
//! ```

use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use bitflags::bitflags;
use docstore_core::{Error, ErrorCode, OwnedBuffer, Result, Sequence, Slice};
use docstore_storage::{DocRecord, StoreState};
use tracing::trace;

use crate::database::{Database, DatabaseInner};
use crate::document::{Document, DocumentInfo};

// ============================================================================
// Options
// ============================================================================

bitflags! {
    /// Enumeration flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EnumeratorFlags: u16 {
        /// Walk from the end toward the start (ignored for ID lists)
        const DESCENDING = 0x01;
        /// Include documents whose current revision is a deletion
        const INCLUDE_DELETED = 0x08;
        /// Include documents without conflicts
        const INCLUDE_NON_CONFLICTED = 0x10;
        /// Load bodies of the documents returned
        const INCLUDE_BODIES = 0x20;
        /// Only documents with conflicts
        const ONLY_CONFLICTS = 0x40;
    }
}

impl Default for EnumeratorFlags {
    fn default() -> Self {
        EnumeratorFlags::INCLUDE_NON_CONFLICTED | EnumeratorFlags::INCLUDE_BODIES
    }
}

/// Enumeration options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumeratorOptions {
    /// Flags
    pub flags: EnumeratorFlags,
    /// Number of matching entries to skip
    pub skip: u64,
}

impl EnumeratorOptions {
    /// Options with `flag` added
    pub fn with(mut self, flag: EnumeratorFlags) -> Self {
        self.flags.insert(flag);
        self
    }

    /// Options with `flag` removed
    pub fn without(mut self, flag: EnumeratorFlags) -> Self {
        self.flags.remove(flag);
        self
    }

    /// Options skipping the first `skip` matches
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    fn has(&self, flag: EnumeratorFlags) -> bool {
        self.flags.contains(flag)
    }

    /// True if `record` passes the deleted/conflict filters
    fn accepts(&self, record: &DocRecord) -> bool {
        use docstore_core::DocumentFlags;

        if record.is_deleted() && !self.has(EnumeratorFlags::INCLUDE_DELETED) {
            return false;
        }
        if record.flags.contains(DocumentFlags::CONFLICTED) {
            true
        } else {
            self.has(EnumeratorFlags::INCLUDE_NON_CONFLICTED)
                && !self.has(EnumeratorFlags::ONLY_CONFLICTS)
        }
    }
}

// ============================================================================
// Enumerator
// ============================================================================

enum Source {
    AllDocs {
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
        /// Last ID visited
        cursor: Option<Vec<u8>>,
    },
    Changes {
        since: Sequence,
        /// Last sequence visited
        cursor: Option<Sequence>,
    },
    DocIds {
        ids: Vec<OwnedBuffer>,
        next: usize,
    },
}

enum Entry {
    Found(DocRecord),
    Missing(OwnedBuffer),
}

enum Position {
    Created,
    At(Entry),
    Exhausted,
}

/// Cursor over documents
///
/// Single-owner: it may be moved to another thread but not shared.
pub struct DocEnumerator {
    db: Arc<DatabaseInner>,
    /// None once closed
    snapshot: Option<Arc<StoreState>>,
    source: Source,
    options: EnumeratorOptions,
    skip_remaining: u64,
    position: Position,
}

impl DocEnumerator {
    fn new(db: &Database, source: Source, options: &EnumeratorOptions) -> Result<Self> {
        let snapshot = db.inner().read_state()?;
        Ok(DocEnumerator {
            db: Arc::clone(db.inner()),
            snapshot: Some(snapshot),
            source,
            options: *options,
            skip_remaining: options.skip,
            position: Position::Created,
        })
    }

    /// Move to the next entry
    ///
    /// Returns false once there are no more entries, and keeps returning
    /// false on every later call (also after `close`).
    ///
    /// # Errors
    ///
    /// `NotOpen` if the database was closed.
    pub fn advance(&mut self) -> Result<bool> {
        let snapshot = match (&self.position, &self.snapshot) {
            (Position::Exhausted, _) | (_, None) => return Ok(false),
            (_, Some(snapshot)) => Arc::clone(snapshot),
        };
        self.db.ensure_open()?;

        loop {
            let entry = match self.step(&snapshot) {
                Some(entry) => entry,
                None => {
                    self.position = Position::Exhausted;
                    trace!(target: "docstore::db", "Enumerator exhausted");
                    return Ok(false);
                }
            };
            if let Entry::Found(record) = &entry {
                if !matches!(self.source, Source::DocIds { .. }) && !self.options.accepts(record) {
                    continue;
                }
            }
            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                continue;
            }
            self.position = Position::At(entry);
            return Ok(true);
        }
    }

    /// Next raw entry from the source, before filtering
    fn step(&mut self, snapshot: &StoreState) -> Option<Entry> {
        let descending = self.options.has(EnumeratorFlags::DESCENDING);
        match &mut self.source {
            Source::AllDocs { start, end, cursor } => {
                let (lower, upper) = match (descending, cursor.as_deref()) {
                    (false, Some(last)) => (Bound::Excluded(last), bound(end)),
                    (true, Some(last)) => (bound(start), Bound::Excluded(last)),
                    (_, None) => (bound(start), bound(end)),
                };
                let mut range = snapshot.documents_in(lower, upper);
                let record = if descending {
                    range.next_back()
                } else {
                    range.next()
                }?
                .clone();
                *cursor = Some(record.doc_id.clone());
                Some(Entry::Found(record))
            }
            Source::Changes { since, cursor } => {
                let lower = Bound::Excluded(*since);
                let (lower, upper) = match (descending, *cursor) {
                    (false, Some(last)) => (Bound::Excluded(last), Bound::Unbounded),
                    (true, Some(last)) => (lower, Bound::Excluded(last)),
                    (_, None) => (lower, Bound::Unbounded),
                };
                let mut range = snapshot.documents_by_sequence(lower, upper);
                let record = if descending {
                    range.next_back()
                } else {
                    range.next()
                }?
                .clone();
                *cursor = Some(record.sequence);
                Some(Entry::Found(record))
            }
            Source::DocIds { ids, next } => {
                let doc_id = ids.get(*next)?.clone();
                *next += 1;
                Some(match snapshot.document(doc_id.as_bytes()) {
                    Some(record) => Entry::Found(record.clone()),
                    None => Entry::Missing(doc_id),
                })
            }
        }
    }

    fn current(&self) -> Result<&Entry> {
        match &self.position {
            Position::At(entry) if self.snapshot.is_some() => Ok(entry),
            _ => Err(Error::engine(ErrorCode::InvalidParameter)),
        }
    }

    /// The document at the current position
    ///
    /// Its body is loaded if the enumerator was created with
    /// `INCLUDE_BODIES`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` before the first `advance`, after exhaustion,
    /// or after `close`.
    pub fn get_document(&self) -> Result<Document> {
        let with_body = self.options.has(EnumeratorFlags::INCLUDE_BODIES);
        Ok(match self.current()? {
            Entry::Found(record) => Document::from_record(&self.db, record, with_body),
            Entry::Missing(doc_id) => Document::placeholder(&self.db, doc_id.as_bytes()),
        })
    }

    /// Metadata of the document at the current position
    ///
    /// # Errors
    ///
    /// As `get_document`.
    pub fn get_info(&self) -> Result<DocumentInfo> {
        Ok(match self.current()? {
            Entry::Found(record) => DocumentInfo::from_record(record),
            Entry::Missing(doc_id) => DocumentInfo::missing(doc_id.as_bytes()),
        })
    }

    /// Advance and return the next document, or None when exhausted
    pub fn next_document(&mut self) -> Result<Option<Document>> {
        if self.advance()? {
            self.get_document().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Release the snapshot. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.snapshot.take().is_some() {
            self.position = Position::Exhausted;
        }
    }
}

fn bound(key: &Option<Vec<u8>>) -> Bound<&[u8]> {
    match key {
        Some(key) => Bound::Included(key.as_slice()),
        None => Bound::Unbounded,
    }
}

fn open_bound(key: Slice<'_>) -> Option<Vec<u8>> {
    (!key.is_empty()).then(|| key.as_bytes().to_vec())
}

impl Iterator for DocEnumerator {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_document() {
            Ok(Some(doc)) => Some(Ok(doc)),
            Ok(None) => None,
            Err(e) => {
                self.position = Position::Exhausted;
                Some(Err(e))
            }
        }
    }
}

impl fmt::Debug for DocEnumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.source {
            Source::AllDocs { .. } => "all_docs",
            Source::Changes { .. } => "changes",
            Source::DocIds { .. } => "doc_ids",
        };
        f.debug_struct("DocEnumerator")
            .field("mode", &mode)
            .field("options", &self.options)
            .field("closed", &self.snapshot.is_none())
            .finish()
    }
}

// ============================================================================
// Database API
// ============================================================================

impl Database {
    /// Enumerate documents by ID within the inclusive range `[start, end]`
    ///
    /// A null or empty bound leaves that side open.
    pub fn enumerate_all_docs<'a>(
        &self,
        start: impl Into<Slice<'a>>,
        end: impl Into<Slice<'a>>,
        options: &EnumeratorOptions,
    ) -> Result<DocEnumerator> {
        let source = Source::AllDocs {
            start: open_bound(start.into()),
            end: open_bound(end.into()),
            cursor: None,
        };
        DocEnumerator::new(self, source, options)
    }

    /// Enumerate the given document IDs in the given order
    pub fn enumerate_some_docs<I, S>(
        &self,
        doc_ids: I,
        options: &EnumeratorOptions,
    ) -> Result<DocEnumerator>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let ids = doc_ids
            .into_iter()
            .map(|id| OwnedBuffer::copy_from(id.as_ref()))
            .collect();
        DocEnumerator::new(self, Source::DocIds { ids, next: 0 }, options)
    }

    /// Enumerate documents changed after sequence `since`
    pub fn enumerate_changes(
        &self,
        since: Sequence,
        options: &EnumeratorOptions,
    ) -> Result<DocEnumerator> {
        DocEnumerator::new(
            self,
            Source::Changes {
                since,
                cursor: None,
            },
            options,
        )
    }
}
