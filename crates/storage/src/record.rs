//! Commit record format
//!
//! Every committed transaction is appended to the log as one record.
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//!
//! Payload:
//! ┌──────────────┬──────────────┬─────────────────────────────┐
//! │ TxnId (8)    │ Timestamp (8)│ Writeset (variable)         │
//! └──────────────┴──────────────┴─────────────────────────────┘
//! ```
//!
//! The length covers format version, payload and CRC. The CRC covers the
//! format version and payload.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::LogError;

/// Current commit record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

// version (1) + txn_id (8) + timestamp (8)
const FIXED_PAYLOAD: usize = 17;

/// One committed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Commit counter, strictly increasing across the log
    pub txn_id: u64,
    /// Commit time, Unix seconds
    pub timestamp: u64,
    /// Encoded writeset
    pub writeset: Vec<u8>,
}

impl CommitRecord {
    /// Create a record
    pub fn new(txn_id: u64, timestamp: u64, writeset: Vec<u8>) -> Self {
        CommitRecord {
            txn_id,
            timestamp,
            writeset,
        }
    }

    /// Serialize for appending to the log
    pub fn to_bytes(&self) -> Result<Vec<u8>, LogError> {
        let mut payload = Vec::with_capacity(FIXED_PAYLOAD + self.writeset.len());
        payload.write_u8(RECORD_FORMAT_VERSION)?;
        payload.write_u64::<LittleEndian>(self.txn_id)?;
        payload.write_u64::<LittleEndian>(self.timestamp)?;
        payload.extend_from_slice(&self.writeset);

        let crc = compute_crc(&payload);

        let total_len = u32::try_from(payload.len() + 4).map_err(|_| {
            LogError::Encoding(format!("record of {} bytes is too large", payload.len()))
        })?;
        let mut record = Vec::with_capacity(4 + total_len as usize);
        record.write_u32::<LittleEndian>(total_len)?;
        record.extend_from_slice(&payload);
        record.write_u32::<LittleEndian>(crc)?;
        Ok(record)
    }

    /// Parse one record from the front of `bytes`
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), LogError> {
        let mut prefix = bytes;
        let length = prefix
            .read_u32::<LittleEndian>()
            .map_err(|_| LogError::Truncated)? as usize;
        if length < FIXED_PAYLOAD + 4 {
            return Err(LogError::Encoding(format!(
                "record length {} below minimum",
                length
            )));
        }
        if prefix.len() < length {
            return Err(LogError::Truncated);
        }

        let (payload, mut crc_bytes) = prefix[..length].split_at(length - 4);
        let stored = crc_bytes.read_u32::<LittleEndian>()?;
        let computed = compute_crc(payload);
        if stored != computed {
            return Err(LogError::ChecksumMismatch {
                expected: stored,
                computed,
            });
        }

        let mut fields = payload;
        let version = fields.read_u8()?;
        if version != RECORD_FORMAT_VERSION {
            return Err(LogError::UnsupportedVersion(u32::from(version)));
        }
        let txn_id = fields.read_u64::<LittleEndian>()?;
        let timestamp = fields.read_u64::<LittleEndian>()?;

        let record = CommitRecord {
            txn_id,
            timestamp,
            writeset: fields.to_vec(),
        };
        Ok((record, 4 + length))
    }
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = CommitRecord::new(7, 1_700_000_000, vec![1, 2, 3, 4]);
        let bytes = record.to_bytes().unwrap();
        let (parsed, consumed) = CommitRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_record_layout_is_little_endian() {
        let bytes = CommitRecord::new(0x0102, 0x0A0B, vec![0xEE]).to_bytes().unwrap();
        // length (4) + version (1) + txn_id (8) + timestamp (8) + writeset (1) + crc (4)
        assert_eq!(bytes.len(), 26);
        assert_eq!(&bytes[0..4], &22u32.to_le_bytes());
        assert_eq!(bytes[4], RECORD_FORMAT_VERSION);
        assert_eq!(&bytes[5..13], &0x0102u64.to_le_bytes());
        assert_eq!(&bytes[13..21], &0x0A0Bu64.to_le_bytes());
        assert_eq!(bytes[21], 0xEE);
        assert_eq!(&bytes[22..26], &compute_crc(&bytes[4..22]).to_le_bytes());
    }

    #[test]
    fn test_record_rejects_unknown_version() {
        let mut bytes = CommitRecord::new(1, 2, vec![3]).to_bytes().unwrap();
        bytes[4] = RECORD_FORMAT_VERSION + 1;
        let end = bytes.len() - 4;
        let crc = compute_crc(&bytes[4..end]);
        bytes[end..].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            CommitRecord::from_bytes(&bytes),
            Err(LogError::UnsupportedVersion(v)) if v == u32::from(RECORD_FORMAT_VERSION) + 1
        ));
    }

    #[test]
    fn test_record_empty_writeset() {
        let record = CommitRecord::new(1, 0, Vec::new());
        let bytes = record.to_bytes().unwrap();
        let (parsed, _) = CommitRecord::from_bytes(&bytes).unwrap();
        assert!(parsed.writeset.is_empty());
    }

    #[test]
    fn test_record_checksum_failure() {
        let mut bytes = CommitRecord::new(1, 2, vec![9; 16]).to_bytes().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(
            CommitRecord::from_bytes(&bytes),
            Err(LogError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_record_truncated() {
        let bytes = CommitRecord::new(1, 2, vec![9; 16]).to_bytes().unwrap();
        assert!(matches!(
            CommitRecord::from_bytes(&bytes[..bytes.len() - 1]),
            Err(LogError::Truncated)
        ));
        assert!(matches!(
            CommitRecord::from_bytes(&bytes[..2]),
            Err(LogError::Truncated)
        ));
    }

    #[test]
    fn test_consecutive_records() {
        let mut buf = Vec::new();
        for i in 1..=3u64 {
            buf.extend(CommitRecord::new(i, i * 10, vec![i as u8; i as usize]).to_bytes().unwrap());
        }
        let mut offset = 0;
        let mut seen = Vec::new();
        while offset < buf.len() {
            let (rec, n) = CommitRecord::from_bytes(&buf[offset..]).unwrap();
            seen.push(rec.txn_id);
            offset += n;
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
