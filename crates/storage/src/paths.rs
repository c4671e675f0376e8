//! Database file layout
//!
//! A database is either a single log file at the given path, or a
//! "bundle": a directory at the given path holding the log file.
//!
//! ```text
//! single file:            bundle:
//! mydb.docs               mydb.docs/
//!                         └── db.log
//! ```

use std::path::{Path, PathBuf};

use crate::error::LogError;

/// Name of the log file inside a bundle directory
pub const BUNDLE_LOG_FILE: &str = "db.log";

/// Database paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePaths {
    /// Path the caller supplied
    root: PathBuf,
    /// Whether the root is a bundle directory
    bundled: bool,
}

impl DatabasePaths {
    /// Create paths for a database at `root`
    pub fn new(root: impl AsRef<Path>, bundled: bool) -> Self {
        DatabasePaths {
            root: root.as_ref().to_path_buf(),
            bundled,
        }
    }

    /// The path the database was opened with
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether this is a bundle layout
    pub fn is_bundled(&self) -> bool {
        self.bundled
    }

    /// Path of the log file
    pub fn log_file(&self) -> PathBuf {
        if self.bundled {
            self.root.join(BUNDLE_LOG_FILE)
        } else {
            self.root.clone()
        }
    }

    /// Path used while compacting
    pub fn compact_file(&self) -> PathBuf {
        let mut name = self.log_file().into_os_string();
        name.push(".compact");
        PathBuf::from(name)
    }

    /// Check if a database exists at this path
    pub fn exists(&self) -> bool {
        self.log_file().is_file()
    }

    /// Validate that the path has the shape the layout requires
    pub fn validate(&self) -> Result<(), LogError> {
        if self.bundled && self.root.is_file() {
            return Err(LogError::WrongLayout {
                path: self.root.clone(),
                reason: "expected a bundle directory, found a file",
            });
        }
        if !self.bundled && self.root.is_dir() {
            return Err(LogError::WrongLayout {
                path: self.root.clone(),
                reason: "expected a database file, found a directory",
            });
        }
        Ok(())
    }

    /// Create the directories the layout needs
    pub fn create_directories(&self) -> std::io::Result<()> {
        if self.bundled {
            std::fs::create_dir_all(&self.root)?;
        } else if let Some(parent) = self.root.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Remove the database from disk
    ///
    /// Returns false if nothing existed at the path.
    pub fn remove(&self) -> std::io::Result<bool> {
        if self.bundled {
            if !self.root.is_dir() {
                return Ok(false);
            }
            std::fs::remove_dir_all(&self.root)?;
        } else {
            if !self.root.is_file() {
                return Ok(false);
            }
            std::fs::remove_file(&self.root)?;
        }
        Ok(true)
    }
}
