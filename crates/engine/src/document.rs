//! Document & revision store
//!
//! A `Document` is a handle on one document's current revision as of the
//! moment it was read. Its body may be left unloaded; `load_body` fetches
//! it later, provided the revision is still current.
//!
//! ## Conflict rules for `put_document`
//!
//! | parent given | current revision | outcome              |
//! |--------------|------------------|----------------------|
//! | yes          | none             | `NotFound`           |
//! | yes          | different rev    | `Conflict`           |
//! | yes          | same rev         | new child revision   |
//! | no           | none             | first revision       |
//! | no           | live             | `Conflict`           |
//! | no           | deleted          | child of the deletion|
//!
//! Revision IDs are `<generation>-<digest>`, where the digest is the first
//! 16 bytes of SHA-256 over the parent revision, the deleted flag and the
//! body, in hex.

use std::fmt;
use std::sync::Arc;

use docstore_core::{
    DocumentFlags, Error, ErrorCode, OwnedBuffer, Result, RevId, RevisionFlags, Sequence,
    MAX_REV_HISTORY,
};
use docstore_storage::{DocRecord, Mutation};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::database::{Database, DatabaseInner};

// ============================================================================
// Revisions
// ============================================================================

/// Body of a revision, which may not have been read yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionBody {
    /// Not read yet; see `Document::load_body`
    NotLoaded,
    /// Loaded. Null for deletions.
    Loaded(OwnedBuffer),
}

/// The selected revision of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    rev_id: RevId,
    flags: RevisionFlags,
    sequence: Sequence,
    body: RevisionBody,
}

impl Revision {
    /// Revision ID
    pub fn rev_id(&self) -> &RevId {
        &self.rev_id
    }

    /// Revision flags
    pub fn flags(&self) -> RevisionFlags {
        self.flags
    }

    /// Sequence assigned when the revision was stored
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// The body, if loaded
    pub fn body(&self) -> Option<&OwnedBuffer> {
        match &self.body {
            RevisionBody::Loaded(body) => Some(body),
            RevisionBody::NotLoaded => None,
        }
    }

    /// True once the body has been read
    pub fn is_body_loaded(&self) -> bool {
        matches!(self.body, RevisionBody::Loaded(_))
    }
}

// ============================================================================
// Document
// ============================================================================

/// Lightweight projection of a document, without its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Document ID
    pub doc_id: OwnedBuffer,
    /// Current revision; None if the document doesn't exist
    pub rev_id: Option<RevId>,
    /// Sequence of the current revision; 0 if the document doesn't exist
    pub sequence: Sequence,
    /// Document flags
    pub flags: DocumentFlags,
}

impl DocumentInfo {
    pub(crate) fn from_record(record: &DocRecord) -> Self {
        DocumentInfo {
            doc_id: OwnedBuffer::copy_from(&record.doc_id),
            rev_id: Some(record.rev_id.clone()),
            sequence: record.sequence,
            flags: record.flags,
        }
    }

    pub(crate) fn missing(doc_id: &[u8]) -> Self {
        DocumentInfo {
            doc_id: OwnedBuffer::copy_from(doc_id),
            rev_id: None,
            sequence: 0,
            flags: DocumentFlags::empty(),
        }
    }

    /// True if the document exists
    pub fn exists(&self) -> bool {
        self.sequence != 0
    }
}

/// A document and its selected revision
pub struct Document {
    db: Arc<DatabaseInner>,
    doc_id: OwnedBuffer,
    flags: DocumentFlags,
    sequence: Sequence,
    /// None for a document that doesn't exist
    selected: Option<Revision>,
    history: Vec<RevId>,
}

impl Document {
    pub(crate) fn from_record(db: &Arc<DatabaseInner>, record: &DocRecord, with_body: bool) -> Self {
        let mut flags = RevisionFlags::LEAF;
        if record.is_deleted() {
            flags.insert(RevisionFlags::DELETED);
        }
        if record.flags.contains(DocumentFlags::HAS_ATTACHMENTS) {
            flags.insert(RevisionFlags::HAS_ATTACHMENTS);
        }
        let body = if with_body {
            RevisionBody::Loaded(record.body.clone())
        } else {
            RevisionBody::NotLoaded
        };
        Document {
            db: Arc::clone(db),
            doc_id: OwnedBuffer::copy_from(&record.doc_id),
            flags: record.flags,
            sequence: record.sequence,
            selected: Some(Revision {
                rev_id: record.rev_id.clone(),
                flags,
                sequence: record.sequence,
                body,
            }),
            history: record.history.clone(),
        }
    }

    /// Handle for an ID with no document
    pub(crate) fn placeholder(db: &Arc<DatabaseInner>, doc_id: &[u8]) -> Self {
        Document {
            db: Arc::clone(db),
            doc_id: OwnedBuffer::copy_from(doc_id),
            flags: DocumentFlags::empty(),
            sequence: 0,
            selected: None,
            history: Vec::new(),
        }
    }

    /// Document ID
    pub fn doc_id(&self) -> &OwnedBuffer {
        &self.doc_id
    }

    /// ID of the selected revision
    pub fn rev_id(&self) -> Option<&RevId> {
        self.selected.as_ref().map(|rev| &rev.rev_id)
    }

    /// Document flags
    pub fn flags(&self) -> DocumentFlags {
        self.flags
    }

    /// Sequence of the current revision; 0 for a missing document
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// True if the document exists (possibly as a deletion)
    pub fn exists(&self) -> bool {
        self.flags.contains(DocumentFlags::EXISTS)
    }

    /// True if the current revision is a deletion
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(DocumentFlags::DELETED)
    }

    /// The selected revision
    pub fn selected_revision(&self) -> Option<&Revision> {
        self.selected.as_ref()
    }

    /// Body of the selected revision, if loaded
    pub fn body(&self) -> Option<&OwnedBuffer> {
        self.selected.as_ref().and_then(Revision::body)
    }

    /// Ancestors of the current revision, newest first
    pub fn rev_history(&self) -> &[RevId] {
        &self.history
    }

    /// The metadata without the body
    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            doc_id: self.doc_id.clone(),
            rev_id: self.rev_id().cloned(),
            sequence: self.sequence,
            flags: self.flags,
        }
    }

    /// Read the selected revision's body if it isn't loaded yet
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing document, or if the revision has since been
    /// replaced or purged; `NotOpen` if the database was closed.
    pub fn load_body(&mut self) -> Result<()> {
        let revision = self
            .selected
            .as_mut()
            .ok_or_else(|| Error::engine(ErrorCode::NotFound))?;
        if revision.is_body_loaded() {
            return Ok(());
        }

        let state = self.db.read_state()?;
        let record = state
            .document(self.doc_id.as_bytes())
            .filter(|record| record.rev_id == revision.rev_id)
            .ok_or_else(|| Error::engine(ErrorCode::NotFound))?;
        revision.body = RevisionBody::Loaded(record.body.clone());
        trace!(target: "docstore::db", rev = %revision.rev_id, "Loaded body");
        Ok(())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("doc_id", &self.doc_id)
            .field("flags", &self.flags)
            .field("sequence", &self.sequence)
            .field("selected", &self.selected)
            .finish()
    }
}

// ============================================================================
// Put requests
// ============================================================================

/// Parameters of a new revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    doc_id: OwnedBuffer,
    parent_rev_id: Option<String>,
    rev_id: Option<String>,
    body: OwnedBuffer,
    flags: RevisionFlags,
}

impl PutRequest {
    /// A new revision of `doc_id` with an empty body
    pub fn new(doc_id: impl AsRef<[u8]>) -> Self {
        PutRequest {
            doc_id: OwnedBuffer::copy_from(doc_id.as_ref()),
            parent_rev_id: None,
            rev_id: None,
            body: OwnedBuffer::null(),
            flags: RevisionFlags::empty(),
        }
    }

    /// The revision this one replaces
    pub fn parent_rev_id(mut self, parent: impl Into<String>) -> Self {
        self.parent_rev_id = Some(parent.into());
        self
    }

    /// Store under this revision ID instead of generating one
    pub fn rev_id(mut self, rev_id: impl Into<String>) -> Self {
        self.rev_id = Some(rev_id.into());
        self
    }

    /// The body
    pub fn body(mut self, body: impl Into<OwnedBuffer>) -> Self {
        self.body = body.into();
        self
    }

    /// Revision flags
    pub fn flags(mut self, flags: RevisionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Make this revision a deletion
    pub fn deleted(mut self) -> Self {
        self.flags.insert(RevisionFlags::DELETED);
        self
    }

    fn is_deletion(&self) -> bool {
        self.flags.contains(RevisionFlags::DELETED)
    }
}

/// Generated revision ID for a child of `parent`
pub(crate) fn generate_rev_id(parent: Option<&RevId>, deleted: bool, body: &[u8]) -> Result<RevId> {
    let mut hasher = Sha256::new();
    match parent {
        Some(parent) => {
            hasher.update([parent.as_bytes().len().min(u8::MAX as usize) as u8]);
            hasher.update(parent.as_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update([deleted as u8]);
    hasher.update(body);
    let digest = hasher.finalize();

    let hex: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
    let generation = parent.map_or(1, |p| p.generation().saturating_add(1));
    RevId::new(generation, &hex)
}

// ============================================================================
// Database API
// ============================================================================

impl Database {
    /// Store a new revision
    ///
    /// Must be called inside a transaction. The revision gets the next
    /// sequence; for a deletion the stored body is null whatever body the
    /// request carried.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for an empty document ID
    /// - `BadRevisionID` for a malformed parent or explicit revision ID, or
    ///   an explicit one that does not descend from the parent
    /// - `NotFound` / `Conflict` per the module-level table
    /// - `NoTransaction`, `NotWriteable`, `NotOpen`
    pub fn put_document(&self, request: &PutRequest) -> Result<Document> {
        if request.doc_id.is_empty() {
            return Err(Error::engine(ErrorCode::InvalidParameter));
        }
        let parent = request
            .parent_rev_id
            .as_deref()
            .map(RevId::parse)
            .transpose()?;
        let explicit = request.rev_id.as_deref().map(RevId::parse).transpose()?;
        let deleted = request.is_deletion();
        let body = if deleted {
            OwnedBuffer::null()
        } else {
            request.body.clone()
        };
        let doc_id = request.doc_id.as_bytes();

        let record = self.inner().write(|context| {
            let current = context.state().document(doc_id);
            let base = match (&parent, current) {
                (Some(_), None) => return Err(Error::engine(ErrorCode::NotFound)),
                (Some(parent), Some(current)) if current.rev_id != *parent => {
                    return Err(Error::engine(ErrorCode::Conflict))
                }
                (None, Some(current)) if !current.is_deleted() => {
                    return Err(Error::engine(ErrorCode::Conflict))
                }
                (_, current) => current,
            };

            let parent_rev = base.map(|record| &record.rev_id);
            let rev_id = match &explicit {
                Some(rev_id) => {
                    if rev_id.generation() <= parent_rev.map_or(0, RevId::generation) {
                        return Err(Error::engine(ErrorCode::BadRevisionID));
                    }
                    rev_id.clone()
                }
                None => generate_rev_id(parent_rev, deleted, body.as_bytes())?,
            };

            let mut history = Vec::new();
            if let Some(base) = base {
                history.push(base.rev_id.clone());
                history.extend(base.history.iter().cloned());
                history.truncate(MAX_REV_HISTORY);
            }

            let mut flags = DocumentFlags::EXISTS;
            if deleted {
                flags.insert(DocumentFlags::DELETED);
            }
            if request.flags.contains(RevisionFlags::HAS_ATTACHMENTS) {
                flags.insert(DocumentFlags::HAS_ATTACHMENTS);
            }

            let record = DocRecord {
                doc_id: doc_id.to_vec(),
                rev_id,
                sequence: context.next_sequence(),
                flags,
                body: body.clone(),
                history,
            };
            context.apply(Mutation::PutDocument(record.clone()))?;
            Ok(record)
        })?;

        trace!(
            target: "docstore::db",
            rev = %record.rev_id,
            sequence = record.sequence,
            deleted,
            "Stored revision"
        );
        let mut doc = Document::from_record(self.inner(), &record, true);
        if let Some(revision) = doc.selected.as_mut() {
            revision.flags.insert(RevisionFlags::NEW);
        }
        Ok(doc)
    }

    /// The current revision of `doc_id`, with its body loaded
    ///
    /// # Errors
    ///
    /// `NotFound` if the document never existed or was purged.
    pub fn get_document(&self, doc_id: impl AsRef<[u8]>) -> Result<Document> {
        let state = self.inner().read_state()?;
        state
            .document(doc_id.as_ref())
            .map(|record| Document::from_record(self.inner(), record, true))
            .ok_or_else(|| Error::engine(ErrorCode::NotFound))
    }

    /// The current revision of `doc_id` without reading its body
    pub fn get_document_metadata(&self, doc_id: impl AsRef<[u8]>) -> Result<Document> {
        let state = self.inner().read_state()?;
        state
            .document(doc_id.as_ref())
            .map(|record| Document::from_record(self.inner(), record, false))
            .ok_or_else(|| Error::engine(ErrorCode::NotFound))
    }

    /// Metadata of `doc_id`
    pub fn get_document_info(&self, doc_id: impl AsRef<[u8]>) -> Result<DocumentInfo> {
        let state = self.inner().read_state()?;
        state
            .document(doc_id.as_ref())
            .map(DocumentInfo::from_record)
            .ok_or_else(|| Error::engine(ErrorCode::NotFound))
    }

    /// The document whose current revision has `sequence`
    ///
    /// # Errors
    ///
    /// `NotFound` if no current revision has that sequence (it was never
    /// assigned, or the document has moved on or been purged).
    pub fn get_by_sequence(&self, sequence: Sequence) -> Result<Document> {
        let state = self.inner().read_state()?;
        state
            .document_by_sequence(sequence)
            .map(|record| Document::from_record(self.inner(), record, true))
            .ok_or_else(|| Error::engine(ErrorCode::NotFound))
    }

    /// Remove every trace of `doc_id`, including its expiration
    ///
    /// Must be called inside a transaction.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such document.
    pub fn purge_document(&self, doc_id: impl AsRef<[u8]>) -> Result<()> {
        let doc_id = doc_id.as_ref();
        self.inner().write(|context| {
            if context.state().document(doc_id).is_none() {
                return Err(Error::engine(ErrorCode::NotFound));
            }
            context.apply(Mutation::PurgeDocument {
                doc_id: doc_id.to_vec(),
            })
        })
    }
}
