//! Database handle and open/close logic
//!
//! A `Database` owns one `LogStore` and one `TransactionManager`:
//! - Open replays the log and, on first creation, persists the UUID pair
//! - Writes go through the calling thread's open transaction
//! - Reads see the transaction's working state on the owning thread and
//!   the committed state everywhere else
//!
//! ## Transaction API
//!
//! 1. **Manual API**: `begin_transaction()` + `end_transaction(commit)`,
//!    nestable on one thread; the outermost `end_transaction` decides
//! 2. **Closure API**: `db.transaction(|db| { ... })` commits on `Ok` and
//!    rolls back on `Err`
//!
//! Documents and enumerators keep a reference to the shared inner state,
//! so using them after `close` fails with `NotOpen` rather than touching
//! freed resources.

pub mod config;
mod registry;
mod transactions;

pub use config::{DatabaseConfig, DatabaseFlags};
pub use transactions::RetryConfig;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use docstore_concurrency::{TransactionContext, TransactionManager, TransactionMetrics};
use docstore_core::{DatabaseUuids, Error, ErrorCode, OwnedBuffer, Result, Sequence};
use docstore_storage::{DatabasePaths, LogStore, Mutation, RawRecord, StoreState};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw store holding engine bookkeeping
pub const INFO_STORE: &str = "info";
/// Key of the public UUID in [`INFO_STORE`]
pub const PUBLIC_UUID_KEY: &str = "publicUUID";
/// Key of the private UUID in [`INFO_STORE`]
pub const PRIVATE_UUID_KEY: &str = "privateUUID";

// ============================================================================
// Shared state
// ============================================================================

/// State shared by a `Database` and every handle it produced
#[derive(Debug)]
pub(crate) struct DatabaseInner {
    path: PathBuf,
    registry_key: PathBuf,
    config: DatabaseConfig,
    /// None once closed
    store: RwLock<Option<Arc<LogStore>>>,
    transactions: TransactionManager,
}

impl DatabaseInner {
    /// The open store
    ///
    /// # Errors
    ///
    /// `NotOpen` after close.
    pub(crate) fn store(&self) -> Result<Arc<LogStore>> {
        self.store
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| Error::engine(ErrorCode::NotOpen))
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.store().map(|_| ())
    }

    /// State visible to the calling thread
    pub(crate) fn read_state(&self) -> Result<Arc<StoreState>> {
        let store = self.store()?;
        Ok(self
            .transactions
            .inspect(TransactionContext::snapshot)
            .unwrap_or_else(|| store.snapshot()))
    }

    /// Run `f` against the calling thread's open transaction
    ///
    /// # Errors
    ///
    /// `NotOpen` after close, `NotWriteable` on a read-only handle,
    /// `NoTransaction` if the calling thread has no open transaction.
    pub(crate) fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut TransactionContext) -> Result<R>,
    {
        self.ensure_open()?;
        if self.config.is_read_only() {
            return Err(Error::engine(ErrorCode::NotWriteable));
        }
        self.transactions.with_context(f)
    }

    /// Like `write`, but opens (and commits) a transaction of its own when
    /// the calling thread has none
    pub(crate) fn write_implicit<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut TransactionContext) -> Result<R>,
    {
        if self.transactions.is_in_transaction() {
            return self.write(f);
        }
        self.begin()?;
        match self.write(f) {
            Ok(value) => {
                self.end(true)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(end_err) = self.end(false) {
                    warn!(target: "docstore::txn", error = %end_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    pub(crate) fn begin(&self) -> Result<()> {
        let store = self.store()?;
        self.transactions.begin(|| {
            let (snapshot, generation) = store.snapshot_with_generation();
            Ok(TransactionContext::new(snapshot, generation))
        })?;
        Ok(())
    }

    pub(crate) fn end(&self, commit: bool) -> Result<()> {
        let store = self.store()?;
        self.transactions.end(commit, |context, commit| {
            if !commit {
                debug!(
                    target: "docstore::txn",
                    discarded = context.pending_operations().total(),
                    "Transaction rolled back"
                );
                return Ok(());
            }
            let (base, writeset, state) = context.into_parts();
            let info = store.commit(base, &writeset, state).map_err(|e| {
                warn!(target: "docstore::txn", error = %e, "Commit failed");
                Error::from(e)
            })?;
            debug!(
                target: "docstore::txn",
                generation = info.generation,
                last_sequence = info.last_sequence,
                mutations = info.mutations,
                "Transaction committed"
            );
            Ok(())
        })?;
        Ok(())
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.transactions.is_in_transaction()
    }
}

// ============================================================================
// Database Struct
// ============================================================================

/// An open database
///
/// The handle is `Send + Sync`; share it between threads by reference or
/// `Arc`. One thread at a time can hold the write transaction; other
/// threads' `begin_transaction` waits or fails with `Busy` per the
/// configured `WaitPolicy`.
///
/// Dropping the handle closes it, discarding any uncommitted transaction.
#[derive(Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open (or create) the database at `path`
    ///
    /// # Errors
    ///
    /// - `CantOpenFile` if nothing exists at `path` and `CREATE` is not set,
    ///   or the path has the wrong shape for the `BUNDLED` flag
    /// - `WrongFormat` if the file was created with a different storage
    ///   engine or an unsupported format version
    /// - `InvalidParameter` if creating with an unknown storage engine
    /// - `NotADatabaseFile` if the file has no valid header
    /// - `Busy` if this process already has the path open
    pub fn open(path: impl AsRef<Path>, config: &DatabaseConfig) -> Result<Database> {
        let path = path.as_ref().to_path_buf();
        let registry_key = registry::registry_key(&path);
        if !registry::acquire(&registry_key) {
            warn!(
                target: "docstore::db",
                path = %path.display(),
                "Database is already open in this process"
            );
            return Err(Error::engine(ErrorCode::Busy));
        }

        let paths = DatabasePaths::new(&path, config.is_bundled());
        let store = match LogStore::open(paths, config.store_options()) {
            Ok(store) => store,
            Err(e) => {
                registry::release(&registry_key);
                warn!(
                    target: "docstore::db",
                    path = %path.display(),
                    error = %e,
                    "Failed to open database"
                );
                return Err(e.into());
            }
        };
        let created = store.was_created();

        let db = Database {
            inner: Arc::new(DatabaseInner {
                path,
                registry_key,
                config: config.clone(),
                store: RwLock::new(Some(Arc::new(store))),
                transactions: TransactionManager::new(config.wait_policy),
            }),
        };
        // Drop releases the registry entry if this fails
        db.ensure_uuids()?;

        info!(
            target: "docstore::db",
            path = %db.inner.path.display(),
            created,
            read_only = config.is_read_only(),
            "Opened database"
        );
        Ok(db)
    }

    /// Persist a fresh UUID pair if the database has none yet
    fn ensure_uuids(&self) -> Result<()> {
        if self.inner.config.is_read_only() {
            return Ok(());
        }
        let state = self.inner.read_state()?;
        if state.raw(INFO_STORE, PUBLIC_UUID_KEY.as_bytes()).is_some()
            && state.raw(INFO_STORE, PRIVATE_UUID_KEY.as_bytes()).is_some()
        {
            return Ok(());
        }

        let uuids = DatabaseUuids::generate();
        self.inner.write_implicit(|context| {
            for (key, uuid) in [
                (PUBLIC_UUID_KEY, uuids.public),
                (PRIVATE_UUID_KEY, uuids.private),
            ] {
                context.apply(Mutation::PutRaw {
                    store: INFO_STORE.to_string(),
                    key: key.as_bytes().to_vec(),
                    record: RawRecord {
                        meta: OwnedBuffer::null(),
                        body: OwnedBuffer::copy_from(uuid.as_bytes()),
                    },
                })?;
            }
            Ok(())
        })?;
        debug!(target: "docstore::db", public = %uuids.public, "Generated database UUIDs");
        Ok(())
    }

    /// Close the database
    ///
    /// Flushes the log and releases the path. Documents and enumerators
    /// created from this handle fail with `NotOpen` afterwards.
    ///
    /// # Errors
    ///
    /// `TransactionNotClosed` if any thread has a transaction open;
    /// `NotOpen` if already closed.
    pub fn close(&self) -> Result<()> {
        let store = {
            let mut guard = self.inner.store.write();
            if guard.is_none() {
                return Err(Error::engine(ErrorCode::NotOpen));
            }
            if self.inner.transactions.has_open_transaction() {
                return Err(Error::engine(ErrorCode::TransactionNotClosed));
            }
            guard.take()
        };
        registry::release(&self.inner.registry_key);

        if let Some(store) = store {
            if !self.inner.config.is_read_only() {
                store.sync().map_err(Error::from)?;
            }
        }
        info!(target: "docstore::db", path = %self.inner.path.display(), "Closed database");
        Ok(())
    }

    /// True until `close`
    pub fn is_open(&self) -> bool {
        self.inner.store.read().is_some()
    }

    /// Delete the database at `path`
    ///
    /// Returns false if nothing was there.
    ///
    /// # Errors
    ///
    /// `Busy` if this process has the database open.
    pub fn delete_at_path(path: impl AsRef<Path>, config: &DatabaseConfig) -> Result<bool> {
        let path = path.as_ref();
        if registry::is_open(&registry::registry_key(path)) {
            return Err(Error::engine(ErrorCode::Busy));
        }
        let paths = DatabasePaths::new(path, config.is_bundled());
        paths.validate().map_err(Error::from)?;
        let removed = paths.remove()?;
        info!(target: "docstore::db", path = %path.display(), removed, "Deleted database");
        Ok(removed)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a transaction, or nest inside the calling thread's open one
    ///
    /// # Errors
    ///
    /// `NotOpen` after close; `Busy` if another thread holds the
    /// transaction and the wait policy gives up.
    pub fn begin_transaction(&self) -> Result<()> {
        self.inner.begin()
    }

    /// End one level of the calling thread's transaction
    ///
    /// Only the outermost call commits or rolls back, using its own
    /// `commit` flag.
    ///
    /// # Errors
    ///
    /// `NotInTransaction` if the calling thread has no open transaction;
    /// the commit error if the write fails (the transaction is rolled back
    /// and the lock released either way).
    pub fn end_transaction(&self, commit: bool) -> Result<()> {
        self.inner.end(commit)
    }

    /// True while the calling thread has a transaction open
    pub fn is_in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    /// Nesting depth of the calling thread's transaction
    pub fn transaction_depth(&self) -> u32 {
        self.inner.transactions.depth()
    }

    /// Commit/abort counters
    pub fn transaction_metrics(&self) -> TransactionMetrics {
        self.inner.transactions.metrics()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The path the database was opened with
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// A copy of the configuration
    pub fn config(&self) -> DatabaseConfig {
        self.inner.config.clone()
    }

    /// Public and private UUIDs
    ///
    /// # Errors
    ///
    /// `NotFound` if the database has none (a read-only handle on a file
    /// that never had a writer); `CorruptData` if a stored value is not
    /// 16 bytes.
    pub fn get_uuids(&self) -> Result<DatabaseUuids> {
        let state = self.inner.read_state()?;
        let read = |key: &str| -> Result<Uuid> {
            let record = state
                .raw(INFO_STORE, key.as_bytes())
                .ok_or_else(|| Error::engine(ErrorCode::NotFound))?;
            Uuid::from_slice(record.body.as_bytes())
                .map_err(|_| Error::engine(ErrorCode::CorruptData))
        };
        Ok(DatabaseUuids {
            public: read(PUBLIC_UUID_KEY)?,
            private: read(PRIVATE_UUID_KEY)?,
        })
    }

    /// Number of documents that are not deleted
    pub fn document_count(&self) -> Result<u64> {
        Ok(self.inner.read_state()?.document_count())
    }

    /// Highest sequence assigned so far
    pub fn last_sequence(&self) -> Result<Sequence> {
        Ok(self.inner.read_state()?.last_sequence())
    }

    /// Rewrite the log so it holds only the current state
    ///
    /// # Errors
    ///
    /// `TransactionNotClosed` while any transaction is open,
    /// `NotWriteable` on a read-only handle.
    pub fn compact(&self) -> Result<()> {
        let store = self.inner.store()?;
        if self.inner.config.is_read_only() {
            return Err(Error::engine(ErrorCode::NotWriteable));
        }
        if self.inner.transactions.has_open_transaction() {
            return Err(Error::engine(ErrorCode::TransactionNotClosed));
        }
        store.compact().map_err(Error::from)
    }

    pub(crate) fn inner(&self) -> &Arc<DatabaseInner> {
        &self.inner
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let store = self.inner.store.write().take();
        if let Some(store) = store {
            registry::release(&self.inner.registry_key);
            if !self.inner.config.is_read_only() {
                if let Err(e) = store.sync() {
                    warn!(target: "docstore::db", error = %e, "Sync on drop failed");
                }
            }
            debug!(target: "docstore::db", path = %self.inner.path.display(), "Dropped open database");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
