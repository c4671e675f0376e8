//! Database configuration
//!
//! A `DatabaseConfig` is handed to `Database::open` and fixed for the life
//! of the handle. It can be built in code or loaded from TOML:
//!
//! ```toml
//! flags = "CREATE | BUNDLED"
//! storage_engine = "log"
//! sync = "always"
//!
//! [wait_policy]
//! timeout = { millis = 250 }
//! ```

use std::path::Path;

use bitflags::bitflags;
use docstore_concurrency::WaitPolicy;
use docstore_core::{Error, ErrorCode, Result};
use docstore_storage::{StoreOptions, SyncMode, LOG_ENGINE};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// Flags
// ============================================================================

bitflags! {
    /// How a database is opened
    ///
    /// Serialized by name, e.g. `"CREATE | BUNDLED"`.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DatabaseFlags: u32 {
        /// Create the database if it doesn't exist
        const CREATE = 0x01;
        /// Refuse all writes
        const READ_ONLY = 0x02;
        /// The path is a directory holding the database files
        const BUNDLED = 0x04;
    }
}

// ============================================================================
// Config
// ============================================================================

/// Settings fixed when a database is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Open flags
    #[serde(default = "default_flags")]
    pub flags: DatabaseFlags,
    /// Storage engine selector, recorded in the file header
    #[serde(default = "default_storage_engine")]
    pub storage_engine: String,
    /// What a contended `begin_transaction` does
    #[serde(default)]
    pub wait_policy: WaitPolicy,
    /// Commit durability
    #[serde(default)]
    pub sync: SyncMode,
}

fn default_flags() -> DatabaseFlags {
    DatabaseFlags::CREATE
}

fn default_storage_engine() -> String {
    LOG_ENGINE.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            flags: default_flags(),
            storage_engine: default_storage_engine(),
            wait_policy: WaitPolicy::default(),
            sync: SyncMode::default(),
        }
    }
}

impl DatabaseConfig {
    /// Default config with the given flags
    pub fn with_flags(flags: DatabaseFlags) -> Self {
        DatabaseConfig {
            flags,
            ..Default::default()
        }
    }

    /// Set the storage engine selector
    pub fn storage_engine(mut self, engine: impl Into<String>) -> Self {
        self.storage_engine = engine.into();
        self
    }

    /// Set the wait policy
    pub fn wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait_policy = wait;
        self
    }

    /// Set the sync mode
    pub fn sync(mut self, sync: SyncMode) -> Self {
        self.sync = sync;
        self
    }

    /// True if `flag` is set
    pub fn has_flag(&self, flag: DatabaseFlags) -> bool {
        self.flags.contains(flag)
    }

    /// True if the database is opened read-only
    pub fn is_read_only(&self) -> bool {
        self.has_flag(DatabaseFlags::READ_ONLY)
    }

    /// True if the path is a bundle directory
    pub fn is_bundled(&self) -> bool {
        self.has_flag(DatabaseFlags::BUNDLED)
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            create: self.has_flag(DatabaseFlags::CREATE),
            read_only: self.is_read_only(),
            engine: self.storage_engine.clone(),
            sync: self.sync,
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# docstore database configuration
#
# Open flags, joined with "|": CREATE, READ_ONLY, BUNDLED
flags = "CREATE"

# Storage engine selector; "log" is the only engine in this build
storage_engine = "log"

# Commit durability: "always" (fsync per commit) or "never"
sync = "always"

# Contended begin_transaction: "block", "no_wait", or a bounded wait
wait_policy = "block"
# [wait_policy]
# timeout = { millis = 250 }
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the text is not a valid config.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            warn!(target: "docstore::db", error = %e, "Rejected database config");
            Error::from(ErrorCode::InvalidParameter)
        })
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// The I/O error if the file cannot be read, `InvalidParameter` if it
    /// cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!(
                target: "docstore::db",
                path = %path.display(),
                error = %e,
                "Failed to read config file"
            );
            Error::from(e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this config to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            warn!(target: "docstore::db", error = %e, "Failed to serialize config");
            Error::from(ErrorCode::InvalidParameter)
        })
    }
}
