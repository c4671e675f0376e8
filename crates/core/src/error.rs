//! Error types for docstore
//!
//! Every fallible operation reports a `(domain, code)` pair. The domain is
//! a closed set of tags; the code is only meaningful inside its domain.
//! `describe` is total: unknown domains and unmapped codes still produce a
//! message, and code 0 (no error) produces none.

use std::fmt;
use std::io;
use tracing::error;

/// Result type alias for docstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// Engine-internal codes (see [`ErrorCode`])
    Engine,
    /// POSIX errno values
    Posix,
    /// Codes of the underlying log store (see [`StoreStatus`])
    Store,
    /// Codes of the record encoding layer (see [`EncodingStatus`])
    Encoding,
    /// A domain this build does not know, carrying its raw tag
    ///
    /// Only meaningful for unassigned tags. `Unknown(1..=4)` names a known
    /// domain and is folded into it by `from_raw`, `Error::new` and
    /// `describe`.
    Unknown(i32),
}

impl ErrorDomain {
    /// Numeric tag of the domain
    pub const fn as_raw(&self) -> i32 {
        match self {
            ErrorDomain::Engine => 1,
            ErrorDomain::Posix => 2,
            ErrorDomain::Store => 3,
            ErrorDomain::Encoding => 4,
            ErrorDomain::Unknown(raw) => *raw,
        }
    }

    /// Domain for a numeric tag
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            1 => ErrorDomain::Engine,
            2 => ErrorDomain::Posix,
            3 => ErrorDomain::Store,
            4 => ErrorDomain::Encoding,
            other => ErrorDomain::Unknown(other),
        }
    }

    /// The known domain for an `Unknown` holding an assigned tag
    pub const fn normalized(self) -> Self {
        ErrorDomain::from_raw(self.as_raw())
    }
}

/// Engine-internal error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum ErrorCode {
    AssertionFailed = 1,
    Unimplemented = 2,
    NoSequences = 3,
    UnsupportedEncryption = 4,
    NoTransaction = 5,
    BadRevisionID = 6,
    BadVersionVector = 7,
    CorruptRevisionData = 8,
    CorruptIndexData = 9,
    TokenizerError = 10,
    NotOpen = 11,
    NotFound = 12,
    Deleted = 13,
    Conflict = 14,
    InvalidParameter = 15,
    DatabaseError = 16,
    UnexpectedError = 17,
    CantOpenFile = 18,
    IOError = 19,
    CommitFailed = 20,
    MemoryError = 21,
    NotWriteable = 22,
    CorruptData = 23,
    Busy = 24,
    NotInTransaction = 25,
    TransactionNotClosed = 26,
    IndexBusy = 27,
    Unsupported = 28,
    NotADatabaseFile = 29,
    WrongFormat = 30,
    Crypto = 31,
    InvalidQuery = 32,
    MissingIndex = 33,
}

const ENGINE_MESSAGES: [&str; 34] = [
    "no error",
    "assertion failed",
    "unimplemented function called",
    "database doesn't support sequences",
    "unsupported encryption algorithm",
    "call must be made in a transaction",
    "bad revision ID",
    "bad version vector",
    "corrupt revision data",
    "corrupt index",
    "text tokenizer error",
    "database not open",
    "not found",
    "deleted",
    "conflict",
    "invalid parameter",
    "database error",
    "unexpected exception",
    "can't open file",
    "file I/O error",
    "commit failed",
    "memory allocation failed",
    "not writeable",
    "file data is corrupted",
    "database busy/locked",
    "must be called during a transaction",
    "transaction not closed",
    "index busy; can't close view",
    "unsupported operation for this database type",
    "file is not a database (or encryption key is invalid/missing)",
    "file/data is not in the requested format",
    "encryption/decryption error",
    "query syntax error",
    "missing database index",
];

impl ErrorCode {
    /// Code for a raw value, if it names one
    pub fn from_raw(raw: i32) -> Option<Self> {
        use ErrorCode::*;
        const ALL: [ErrorCode; 33] = [
            AssertionFailed,
            Unimplemented,
            NoSequences,
            UnsupportedEncryption,
            NoTransaction,
            BadRevisionID,
            BadVersionVector,
            CorruptRevisionData,
            CorruptIndexData,
            TokenizerError,
            NotOpen,
            NotFound,
            Deleted,
            Conflict,
            InvalidParameter,
            DatabaseError,
            UnexpectedError,
            CantOpenFile,
            IOError,
            CommitFailed,
            MemoryError,
            NotWriteable,
            CorruptData,
            Busy,
            NotInTransaction,
            TransactionNotClosed,
            IndexBusy,
            Unsupported,
            NotADatabaseFile,
            WrongFormat,
            Crypto,
            InvalidQuery,
            MissingIndex,
        ];
        ALL.iter().copied().find(|c| *c as i32 == raw)
    }

    /// Human-readable message
    pub fn message(self) -> &'static str {
        ENGINE_MESSAGES[self as usize]
    }
}

/// Codes of the log store domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StoreStatus {
    /// A record's CRC did not match its payload
    ChecksumMismatch = 1,
    /// A record ended before its declared length
    TruncatedRecord = 2,
    /// The file header is missing or malformed
    BadHeader = 3,
    /// The file was written by an unsupported format version
    UnsupportedVersion = 4,
    /// The file is held by another writer
    Locked = 5,
    /// The file was opened read-only
    ReadOnly = 6,
}

impl StoreStatus {
    fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(StoreStatus::ChecksumMismatch),
            2 => Some(StoreStatus::TruncatedRecord),
            3 => Some(StoreStatus::BadHeader),
            4 => Some(StoreStatus::UnsupportedVersion),
            5 => Some(StoreStatus::Locked),
            6 => Some(StoreStatus::ReadOnly),
            _ => None,
        }
    }

    fn message(self) -> &'static str {
        match self {
            StoreStatus::ChecksumMismatch => "record checksum mismatch",
            StoreStatus::TruncatedRecord => "record is truncated",
            StoreStatus::BadHeader => "file header is missing or malformed",
            StoreStatus::UnsupportedVersion => "unsupported file format version",
            StoreStatus::Locked => "file is locked",
            StoreStatus::ReadOnly => "file is read-only",
        }
    }

    fn standard_code(self) -> ErrorCode {
        match self {
            StoreStatus::ChecksumMismatch | StoreStatus::TruncatedRecord => ErrorCode::CorruptData,
            StoreStatus::BadHeader => ErrorCode::NotADatabaseFile,
            StoreStatus::UnsupportedVersion => ErrorCode::WrongFormat,
            StoreStatus::Locked => ErrorCode::Busy,
            StoreStatus::ReadOnly => ErrorCode::NotWriteable,
        }
    }
}

/// Codes of the record encoding domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EncodingStatus {
    /// Allocation failed while decoding
    MemoryError = 2,
    /// A length or count is outside the valid range
    OutOfRange = 3,
    /// Bytes do not decode to a valid value
    InvalidData = 4,
    /// A value could not be encoded
    EncodeError = 5,
}

impl EncodingStatus {
    fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            2 => Some(EncodingStatus::MemoryError),
            3 => Some(EncodingStatus::OutOfRange),
            4 => Some(EncodingStatus::InvalidData),
            5 => Some(EncodingStatus::EncodeError),
            _ => None,
        }
    }

    fn message(self) -> &'static str {
        match self {
            EncodingStatus::MemoryError => "memory error",
            EncodingStatus::OutOfRange => "value out of range",
            EncodingStatus::InvalidData => "invalid encoded data",
            EncodingStatus::EncodeError => "encoder error",
        }
    }

    fn standard_code(self) -> ErrorCode {
        match self {
            EncodingStatus::MemoryError => ErrorCode::MemoryError,
            EncodingStatus::OutOfRange | EncodingStatus::InvalidData => {
                ErrorCode::CorruptRevisionData
            }
            EncodingStatus::EncodeError => ErrorCode::UnexpectedError,
        }
    }
}

const ENOENT: i32 = 2;

/// Message for a `(domain, code)` pair
///
/// Returns `None` for code 0, which means "no error" in every domain.
pub fn describe(domain: ErrorDomain, code: i32) -> Option<String> {
    if code == 0 {
        return None;
    }
    let message = match domain.normalized() {
        ErrorDomain::Engine => ErrorCode::from_raw(code)
            .map(ErrorCode::message)
            .unwrap_or("(unknown engine error)")
            .to_string(),
        ErrorDomain::Posix => posix_message(code),
        ErrorDomain::Store => StoreStatus::from_raw(code)
            .map(StoreStatus::message)
            .unwrap_or("(unknown store error)")
            .to_string(),
        ErrorDomain::Encoding => EncodingStatus::from_raw(code)
            .map(EncodingStatus::message)
            .unwrap_or("(unknown encoding error)")
            .to_string(),
        ErrorDomain::Unknown(_) => "unknown error domain".to_string(),
    };
    Some(message)
}

fn posix_message(code: i32) -> String {
    let text = io::Error::from_raw_os_error(code).to_string();
    // std appends " (os error N)"
    match text.rfind(" (os error ") {
        Some(idx) => text[..idx].to_string(),
        None => text,
    }
}

/// A `(domain, code)` error
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Error {
    domain: ErrorDomain,
    code: i32,
}

impl Error {
    /// Create an error from raw parts
    pub const fn new(domain: ErrorDomain, code: i32) -> Self {
        Error {
            domain: domain.normalized(),
            code,
        }
    }

    /// Engine-domain error
    pub const fn engine(code: ErrorCode) -> Self {
        Error {
            domain: ErrorDomain::Engine,
            code: code as i32,
        }
    }

    /// POSIX-domain error
    pub const fn posix(errno: i32) -> Self {
        Error {
            domain: ErrorDomain::Posix,
            code: errno,
        }
    }

    /// Store-domain error
    pub const fn store(status: StoreStatus) -> Self {
        Error {
            domain: ErrorDomain::Store,
            code: status as i32,
        }
    }

    /// Encoding-domain error
    pub const fn encoding(status: EncodingStatus) -> Self {
        Error {
            domain: ErrorDomain::Encoding,
            code: status as i32,
        }
    }

    /// An internal invariant did not hold. Logged, then surfaced.
    pub fn assertion_failed(what: &str) -> Self {
        error!(target: "docstore::error", what, "Assertion failed");
        Error::engine(ErrorCode::AssertionFailed)
    }

    /// An unexpected internal failure. Logged, then surfaced.
    pub fn unexpected(what: &str) -> Self {
        error!(target: "docstore::error", what, "Unexpected internal error");
        Error::engine(ErrorCode::UnexpectedError)
    }

    /// The error domain
    pub fn domain(&self) -> ErrorDomain {
        self.domain
    }

    /// The raw code within the domain
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The engine code, if this is an engine-domain error
    pub fn engine_code(&self) -> Option<ErrorCode> {
        match self.domain {
            ErrorDomain::Engine => ErrorCode::from_raw(self.code),
            _ => None,
        }
    }

    /// True if this is the engine-domain error `code`
    pub fn is(&self, code: ErrorCode) -> bool {
        self.domain == ErrorDomain::Engine && self.code == code as i32
    }

    /// True for errors where retrying with backoff is reasonable
    pub fn is_transient(&self) -> bool {
        self.standardized().is(ErrorCode::Busy)
    }

    /// Human-readable message
    pub fn message(&self) -> String {
        describe(self.domain, self.code).unwrap_or_else(|| "no error".to_string())
    }

    /// Map store, encoding and POSIX codes onto engine codes where one fits
    pub fn standardized(&self) -> Error {
        let mapped = match self.domain {
            ErrorDomain::Posix if self.code == ENOENT => Some(ErrorCode::NotFound),
            ErrorDomain::Store => StoreStatus::from_raw(self.code).map(StoreStatus::standard_code),
            ErrorDomain::Encoding => {
                EncodingStatus::from_raw(self.code).map(EncodingStatus::standard_code)
            }
            _ => None,
        };
        mapped.map(Error::engine).unwrap_or(*self)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error {{ domain: {:?}, code: {}, message: {:?} }}",
            self.domain,
            self.code,
            self.message()
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Error {}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::engine(code)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(errno) => Error::posix(errno),
            None => match e.kind() {
                io::ErrorKind::NotFound => Error::posix(ENOENT),
                io::ErrorKind::OutOfMemory => Error::engine(ErrorCode::MemoryError),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                    Error::engine(ErrorCode::CorruptData)
                }
                _ => Error::engine(ErrorCode::IOError),
            },
        }
    }
}
