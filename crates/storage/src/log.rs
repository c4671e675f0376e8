//! Append-only log file
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ File Header (32 bytes)             │
//! ├────────────────────────────────────┤
//! │ Commit Record 1                    │
//! ├────────────────────────────────────┤
//! │ Commit Record 2                    │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! A crash can leave a partially written record at the end of the file.
//! Reading stops at the first record that is short or fails its checksum;
//! when the file is writable everything from there on is truncated away.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::LogError;
use crate::header::{FileHeader, HEADER_SIZE};
use crate::record::CommitRecord;

/// Open log file handle
#[derive(Debug)]
pub struct LogFile {
    file: File,
    path: PathBuf,
    header: FileHeader,
    /// Current end of valid data
    write_position: u64,
    read_only: bool,
}

impl LogFile {
    /// Create a new log file and write its header
    ///
    /// Fails if the file already exists.
    pub fn create(path: &Path, header: FileHeader) -> Result<Self, LogError> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        debug!(target: "docstore::storage", path = %path.display(), engine = %header.engine, "Created log file");

        Ok(LogFile {
            file,
            path: path.to_path_buf(),
            header,
            write_position: HEADER_SIZE as u64,
            read_only: false,
        })
    }

    /// Open an existing log file and validate its header
    pub fn open(path: &Path, read_only: bool) -> Result<Self, LogError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;

        let mut header_bytes = Vec::with_capacity(HEADER_SIZE);
        (&mut file)
            .take(HEADER_SIZE as u64)
            .read_to_end(&mut header_bytes)?;
        let header = FileHeader::from_bytes(&header_bytes)?;

        let write_position = file.seek(SeekFrom::End(0))?;

        Ok(LogFile {
            file,
            path: path.to_path_buf(),
            header,
            write_position,
            read_only,
        })
    }

    /// The file header
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes
    pub fn size(&self) -> u64 {
        self.write_position
    }

    /// Read every intact record
    ///
    /// A damaged tail is dropped, and truncated from disk when writable.
    pub fn read_records(&mut self) -> Result<Vec<CommitRecord>, LogError> {
        self.file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match CommitRecord::from_bytes(&bytes[offset..]) {
                Ok((record, consumed)) => {
                    records.push(record);
                    offset += consumed;
                }
                Err(e) => {
                    let valid_end = HEADER_SIZE as u64 + offset as u64;
                    warn!(
                        target: "docstore::storage",
                        path = %self.path.display(),
                        offset = valid_end,
                        dropped = bytes.len() - offset,
                        error = %e,
                        "Discarding damaged log tail"
                    );
                    if !self.read_only {
                        self.truncate(valid_end)?;
                    } else {
                        self.write_position = valid_end;
                    }
                    break;
                }
            }
        }

        debug!(target: "docstore::storage", path = %self.path.display(), records = records.len(), "Read log");
        Ok(records)
    }

    /// Append a record
    ///
    /// On a failed write the file is cut back to its previous length so a
    /// later append cannot land after a partial record.
    pub fn append(&mut self, record: &CommitRecord, sync: bool) -> Result<(), LogError> {
        if self.read_only {
            return Err(LogError::ReadOnly);
        }
        let bytes = record.to_bytes()?;
        let start = self.write_position;

        self.file.seek(SeekFrom::Start(start))?;
        let written = self.file.write_all(&bytes).and_then(|_| {
            if sync {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            if let Err(undo) = self.truncate(start) {
                warn!(target: "docstore::storage", error = %undo, "Failed to cut back log after write error");
            }
            return Err(e.into());
        }

        self.write_position = start + bytes.len() as u64;
        Ok(())
    }

    /// Sync file contents to disk
    pub fn sync(&mut self) -> Result<(), LogError> {
        if !self.read_only {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn truncate(&mut self, position: u64) -> Result<(), LogError> {
        self.file.set_len(position)?;
        self.file.seek(SeekFrom::Start(position))?;
        self.write_position = position;
        Ok(())
    }
}
