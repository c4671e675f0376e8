//! Log file header
//!
//! # Layout
//!
//! ```text
//! ┌──────────┬──────────────┬────────────────────┬──────────────┐
//! │ Magic (4)│ Version (4)  │ Engine name (16)   │ Created (8)  │
//! └──────────┴──────────────┴────────────────────┴──────────────┘
//! ```
//!
//! The engine name is UTF-8, zero-padded. Opening a file with a different
//! engine selector than the one recorded here is a format error.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::LogError;

/// Magic bytes identifying a docstore log file: "DOCS"
pub const FILE_MAGIC: [u8; 4] = *b"DOCS";

/// Current file format version
pub const FORMAT_VERSION: u32 = 1;

/// Size of the header in bytes
pub const HEADER_SIZE: usize = 32;

/// Name of the log-structured storage engine
pub const LOG_ENGINE: &str = "log";

const ENGINE_FIELD_SIZE: usize = 16;

/// Log file header (32 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version the file was written with
    pub format_version: u32,
    /// Storage engine selector
    pub engine: String,
    /// Creation time, Unix seconds
    pub created_at: u64,
}

impl FileHeader {
    /// Header for a new file
    pub fn new(engine: &str, created_at: u64) -> Result<Self, LogError> {
        if engine.is_empty() || engine.len() > ENGINE_FIELD_SIZE || engine.contains('\0') {
            return Err(LogError::BadHeader(format!(
                "engine name '{}' does not fit the header",
                engine
            )));
        }
        Ok(FileHeader {
            format_version: FORMAT_VERSION,
            engine: engine.to_string(),
            created_at,
        })
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&FILE_MAGIC);
        LittleEndian::write_u32(&mut bytes[4..8], self.format_version);
        let name = self.engine.as_bytes();
        let n = name.len().min(ENGINE_FIELD_SIZE);
        bytes[8..8 + n].copy_from_slice(&name[..n]);
        LittleEndian::write_u64(&mut bytes[24..32], self.created_at);
        bytes
    }

    /// Parse and validate a header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LogError::BadHeader(format!(
                "file is {} bytes, header needs {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        if bytes[0..4] != FILE_MAGIC {
            return Err(LogError::BadHeader("bad magic".to_string()));
        }

        let format_version = LittleEndian::read_u32(&bytes[4..8]);
        if format_version != FORMAT_VERSION {
            return Err(LogError::UnsupportedVersion(format_version));
        }

        let field = &bytes[8..8 + ENGINE_FIELD_SIZE];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let engine = std::str::from_utf8(&field[..end])
            .map_err(|_| LogError::BadHeader("engine name is not UTF-8".to_string()))?
            .to_string();

        Ok(FileHeader {
            format_version,
            engine,
            created_at: LittleEndian::read_u64(&bytes[24..32]),
        })
    }

    /// Check the recorded engine against the requested one
    pub fn check_engine(&self, requested: &str) -> Result<(), LogError> {
        if self.engine != requested {
            return Err(LogError::EngineMismatch {
                found: self.engine.clone(),
                requested: requested.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FileHeader::new(LOG_ENGINE, 1_700_000_000).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"DOCS");
        assert_eq!(FileHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = FileHeader::new(LOG_ENGINE, 0).unwrap().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            FileHeader::from_bytes(&bytes),
            Err(LogError::BadHeader(_))
        ));
    }

    #[test]
    fn test_header_rejects_short_input() {
        assert!(matches!(
            FileHeader::from_bytes(b"DOCS"),
            Err(LogError::BadHeader(_))
        ));
    }

    #[test]
    fn test_header_rejects_future_version() {
        let mut bytes = FileHeader::new(LOG_ENGINE, 0).unwrap().to_bytes();
        LittleEndian::write_u32(&mut bytes[4..8], 99);
        assert!(matches!(
            FileHeader::from_bytes(&bytes),
            Err(LogError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_engine_check() {
        let header = FileHeader::new(LOG_ENGINE, 0).unwrap();
        assert!(header.check_engine("log").is_ok());
        assert!(matches!(
            header.check_engine("b0gus"),
            Err(LogError::EngineMismatch { .. })
        ));
    }

    #[test]
    fn test_engine_name_too_long() {
        assert!(FileHeader::new("an-engine-name-that-is-too-long", 0).is_err());
        assert!(FileHeader::new("", 0).is_err());
    }
}
