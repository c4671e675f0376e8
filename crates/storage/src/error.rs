//! Storage-layer errors
//!
//! `LogError` carries enough context for logging; conversion into the
//! public `(domain, code)` error happens at the crate boundary.

use docstore_core::{EncodingStatus, Error, ErrorCode, StoreStatus};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the log store
#[derive(Debug, Error)]
pub enum LogError {
    /// I/O error from the filesystem
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No database exists at the path
    #[error("database not found at {}", path.display())]
    NotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// The path exists but has the wrong shape for the requested layout
    #[error("path {} does not match the requested layout: {reason}", path.display())]
    WrongLayout {
        /// Offending path
        path: PathBuf,
        /// What was expected
        reason: &'static str,
    },

    /// The file does not start with a valid header
    #[error("bad file header: {0}")]
    BadHeader(String),

    /// The file was written by a format version this build cannot read
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    /// The file was created by a different storage engine
    #[error("storage engine mismatch: file uses '{found}', requested '{requested}'")]
    EngineMismatch {
        /// Engine recorded in the file header
        found: String,
        /// Engine requested by the caller
        requested: String,
    },

    /// No storage engine has the requested name
    #[error("unknown storage engine '{0}'")]
    UnknownEngine(String),

    /// A record's checksum does not match its payload
    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// CRC stored in the record
        expected: u32,
        /// CRC computed over the payload
        computed: u32,
    },

    /// A record ends before its declared length
    #[error("truncated record")]
    Truncated,

    /// A record's payload cannot be decoded
    #[error("invalid encoding: {0}")]
    Encoding(String),

    /// A write was attempted on a read-only store
    #[error("store is read-only")]
    ReadOnly,

    /// A commit was built on a state that is no longer the committed one
    #[error("commit based on generation {base}, but committed generation is {current}")]
    StaleBase {
        /// Generation the transaction started from
        base: u64,
        /// Generation currently committed
        current: u64,
    },
}

impl From<LogError> for Error {
    fn from(e: LogError) -> Self {
        match e {
            LogError::Io(io_err) => Error::from(io_err),
            LogError::NotFound { .. } => Error::engine(ErrorCode::CantOpenFile),
            LogError::WrongLayout { .. } => Error::engine(ErrorCode::CantOpenFile),
            LogError::BadHeader(_) => Error::engine(ErrorCode::NotADatabaseFile),
            LogError::UnsupportedVersion(_) => Error::engine(ErrorCode::WrongFormat),
            LogError::EngineMismatch { .. } => Error::engine(ErrorCode::WrongFormat),
            LogError::UnknownEngine(_) => Error::engine(ErrorCode::InvalidParameter),
            LogError::ChecksumMismatch { .. } => Error::store(StoreStatus::ChecksumMismatch),
            LogError::Truncated => Error::store(StoreStatus::TruncatedRecord),
            LogError::Encoding(_) => Error::encoding(EncodingStatus::InvalidData),
            LogError::ReadOnly => Error::engine(ErrorCode::NotWriteable),
            e @ LogError::StaleBase { .. } => Error::assertion_failed(&e.to_string()),
        }
    }
}
