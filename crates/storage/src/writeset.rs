//! Transaction writeset serialization format
//!
//! A writeset holds every mutation of one committed transaction and is the
//! payload of a commit record.
//!
//! # Format
//!
//! ```text
//! Writeset Layout:
//! ┌────────────────────┬──────────────────┬─────────────────────────────┐
//! │ LastSequence (8)   │ Count (4 bytes)  │ Mutations (variable)        │
//! └────────────────────┴──────────────────┴─────────────────────────────┘
//!
//! Mutation Layout:
//! ┌──────────────────┬─────────────────────────────────────────────────┐
//! │ Tag (1 byte)     │ Variant fields                                  │
//! └──────────────────┴─────────────────────────────────────────────────┘
//! ```
//!
//! Byte strings are a u32 length followed by the bytes. Nullable buffers
//! are prefixed by a presence byte. All integers are little-endian.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use docstore_core::{DocumentFlags, OwnedBuffer, RevId, Sequence};

use crate::error::LogError;
use crate::state::{DocRecord, RawRecord};

/// Mutation tag bytes
const MUTATION_PUT_DOCUMENT: u8 = 0x01;
const MUTATION_PURGE_DOCUMENT: u8 = 0x02;
const MUTATION_SET_EXPIRATION: u8 = 0x03;
const MUTATION_CLEAR_EXPIRATION: u8 = 0x04;
const MUTATION_PUT_RAW: u8 = 0x05;
const MUTATION_DELETE_RAW: u8 = 0x06;

/// A single change within a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Store a new current revision of a document
    PutDocument(DocRecord),

    /// Remove a document and all its metadata
    PurgeDocument {
        /// Document to remove
        doc_id: Vec<u8>,
    },

    /// Schedule a document's expiration
    SetExpiration {
        /// Document
        doc_id: Vec<u8>,
        /// Unix seconds
        expires_at: u64,
    },

    /// Cancel a document's expiration
    ClearExpiration {
        /// Document
        doc_id: Vec<u8>,
    },

    /// Store a raw document
    PutRaw {
        /// Namespace
        store: String,
        /// Key within the namespace
        key: Vec<u8>,
        /// Meta and body
        record: RawRecord,
    },

    /// Remove a raw document
    DeleteRaw {
        /// Namespace
        store: String,
        /// Key within the namespace
        key: Vec<u8>,
    },
}

/// All mutations of one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Writeset {
    /// Highest sequence assigned by the end of the transaction
    pub last_sequence: Sequence,
    /// Mutations in the order they were made
    pub mutations: Vec<Mutation>,
}

impl Writeset {
    /// Create an empty writeset
    pub fn new(last_sequence: Sequence) -> Self {
        Writeset {
            last_sequence,
            mutations: Vec::new(),
        }
    }

    /// Append a mutation
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Check if writeset is empty
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Number of mutations
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, LogError> {
        let mut out = Vec::new();
        out.write_u64::<LittleEndian>(self.last_sequence)?;
        out.write_u32::<LittleEndian>(len_u32(self.mutations.len())?)?;
        for mutation in &self.mutations {
            write_mutation(&mut out, mutation)?;
        }
        Ok(out)
    }

    /// Deserialize from bytes
    ///
    /// Trailing bytes after the last mutation are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogError> {
        let mut cursor = Cursor::new(bytes);
        let last_sequence = cursor.read_u64::<LittleEndian>().map_err(eof)?;
        let count = cursor.read_u32::<LittleEndian>().map_err(eof)? as usize;

        let mut mutations = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            mutations.push(read_mutation(&mut cursor)?);
        }
        if cursor.position() as usize != bytes.len() {
            return Err(LogError::Encoding(format!(
                "{} trailing bytes after writeset",
                bytes.len() - cursor.position() as usize
            )));
        }
        Ok(Writeset {
            last_sequence,
            mutations,
        })
    }
}

fn write_mutation<W: Write>(out: &mut W, mutation: &Mutation) -> Result<(), LogError> {
    match mutation {
        Mutation::PutDocument(record) => {
            out.write_u8(MUTATION_PUT_DOCUMENT)?;
            write_bytes(out, &record.doc_id)?;
            write_bytes(out, record.rev_id.as_bytes())?;
            out.write_u64::<LittleEndian>(record.sequence)?;
            out.write_u32::<LittleEndian>(record.flags.bits())?;
            write_buffer(out, &record.body)?;
            out.write_u32::<LittleEndian>(len_u32(record.history.len())?)?;
            for rev in &record.history {
                write_bytes(out, rev.as_bytes())?;
            }
        }
        Mutation::PurgeDocument { doc_id } => {
            out.write_u8(MUTATION_PURGE_DOCUMENT)?;
            write_bytes(out, doc_id)?;
        }
        Mutation::SetExpiration { doc_id, expires_at } => {
            out.write_u8(MUTATION_SET_EXPIRATION)?;
            write_bytes(out, doc_id)?;
            out.write_u64::<LittleEndian>(*expires_at)?;
        }
        Mutation::ClearExpiration { doc_id } => {
            out.write_u8(MUTATION_CLEAR_EXPIRATION)?;
            write_bytes(out, doc_id)?;
        }
        Mutation::PutRaw { store, key, record } => {
            out.write_u8(MUTATION_PUT_RAW)?;
            write_bytes(out, store.as_bytes())?;
            write_bytes(out, key)?;
            write_buffer(out, &record.meta)?;
            write_buffer(out, &record.body)?;
        }
        Mutation::DeleteRaw { store, key } => {
            out.write_u8(MUTATION_DELETE_RAW)?;
            write_bytes(out, store.as_bytes())?;
            write_bytes(out, key)?;
        }
    }
    Ok(())
}

fn read_mutation(cursor: &mut Cursor<&[u8]>) -> Result<Mutation, LogError> {
    let tag = cursor.read_u8().map_err(eof)?;
    let mutation = match tag {
        MUTATION_PUT_DOCUMENT => {
            let doc_id = read_bytes(cursor)?;
            let rev_id = read_rev_id(cursor)?;
            let sequence = cursor.read_u64::<LittleEndian>().map_err(eof)?;
            let flags = DocumentFlags::from_bits_retain(cursor.read_u32::<LittleEndian>().map_err(eof)?);
            let body = read_buffer(cursor)?;
            let history_len = cursor.read_u32::<LittleEndian>().map_err(eof)? as usize;
            let mut history = Vec::with_capacity(history_len.min(64));
            for _ in 0..history_len {
                history.push(read_rev_id(cursor)?);
            }
            Mutation::PutDocument(DocRecord {
                doc_id,
                rev_id,
                sequence,
                flags,
                body,
                history,
            })
        }
        MUTATION_PURGE_DOCUMENT => Mutation::PurgeDocument {
            doc_id: read_bytes(cursor)?,
        },
        MUTATION_SET_EXPIRATION => Mutation::SetExpiration {
            doc_id: read_bytes(cursor)?,
            expires_at: cursor.read_u64::<LittleEndian>().map_err(eof)?,
        },
        MUTATION_CLEAR_EXPIRATION => Mutation::ClearExpiration {
            doc_id: read_bytes(cursor)?,
        },
        MUTATION_PUT_RAW => Mutation::PutRaw {
            store: read_string(cursor)?,
            key: read_bytes(cursor)?,
            record: RawRecord {
                meta: read_buffer(cursor)?,
                body: read_buffer(cursor)?,
            },
        },
        MUTATION_DELETE_RAW => Mutation::DeleteRaw {
            store: read_string(cursor)?,
            key: read_bytes(cursor)?,
        },
        other => {
            return Err(LogError::Encoding(format!(
                "unknown mutation tag {:#04x}",
                other
            )))
        }
    };
    Ok(mutation)
}

fn len_u32(len: usize) -> Result<u32, LogError> {
    u32::try_from(len).map_err(|_| LogError::Encoding(format!("length {} exceeds u32", len)))
}

fn write_bytes<W: Write>(out: &mut W, bytes: &[u8]) -> Result<(), LogError> {
    out.write_u32::<LittleEndian>(len_u32(bytes.len())?)?;
    out.write_all(bytes)?;
    Ok(())
}

fn write_buffer<W: Write>(out: &mut W, buffer: &OwnedBuffer) -> Result<(), LogError> {
    if buffer.is_null() {
        out.write_u8(0)?;
    } else {
        out.write_u8(1)?;
        write_bytes(out, buffer.as_bytes())?;
    }
    Ok(())
}

fn read_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>, LogError> {
    let len = cursor.read_u32::<LittleEndian>().map_err(eof)? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(LogError::Encoding(format!(
            "byte string of {} overruns writeset ({} left)",
            len, remaining
        )));
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes).map_err(eof)?;
    Ok(bytes)
}

fn read_buffer(cursor: &mut Cursor<&[u8]>) -> Result<OwnedBuffer, LogError> {
    match cursor.read_u8().map_err(eof)? {
        0 => Ok(OwnedBuffer::null()),
        1 => Ok(OwnedBuffer::new(read_bytes(cursor)?)),
        other => Err(LogError::Encoding(format!(
            "bad buffer presence byte {}",
            other
        ))),
    }
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, LogError> {
    String::from_utf8(read_bytes(cursor)?)
        .map_err(|_| LogError::Encoding("store name is not UTF-8".to_string()))
}

fn read_rev_id(cursor: &mut Cursor<&[u8]>) -> Result<RevId, LogError> {
    let bytes = read_bytes(cursor)?;
    RevId::from_bytes(&bytes).map_err(|_| {
        LogError::Encoding(format!(
            "invalid revision ID {:?}",
            String::from_utf8_lossy(&bytes)
        ))
    })
}

fn eof(e: std::io::Error) -> LogError {
    LogError::Encoding(format!("writeset ended early: {}", e))
}
