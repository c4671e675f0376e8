//! Log-structured store
//!
//! `LogStore` owns the log file and the committed `StoreState`.
//!
//! # Commit protocol
//!
//! 1. Caller builds a new state and writeset from a snapshot at generation G
//! 2. `commit` checks the committed generation is still G
//! 3. The writeset is appended as one record (and synced, per `SyncMode`)
//! 4. The new state is published; generation becomes G + 1
//!
//! A failure before step 4 leaves the committed state untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use docstore_core::{unix_now, Sequence};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LogError;
use crate::header::{FileHeader, LOG_ENGINE};
use crate::log::LogFile;
use crate::paths::DatabasePaths;
use crate::record::CommitRecord;
use crate::state::StoreState;
use crate::writeset::Writeset;

/// When commits are flushed to disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// fsync every commit before it becomes visible
    #[default]
    Always,
    /// Leave flushing to the OS
    Never,
}

/// Options for opening a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Create the database if it doesn't exist
    pub create: bool,
    /// Open without write access
    pub read_only: bool,
    /// Storage engine selector
    pub engine: String,
    /// Commit durability
    pub sync: SyncMode,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            create: true,
            read_only: false,
            engine: LOG_ENGINE.to_string(),
            sync: SyncMode::Always,
        }
    }
}

/// Result of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    /// Generation after the commit
    pub generation: u64,
    /// Last sequence after the commit
    pub last_sequence: Sequence,
    /// Number of mutations written
    pub mutations: usize,
}

/// The durable store behind one open database
#[derive(Debug)]
pub struct LogStore {
    paths: DatabasePaths,
    options: StoreOptions,
    log: Mutex<LogFile>,
    committed: RwLock<Arc<StoreState>>,
    /// Number of records committed so far; equals the last record's txn ID
    generation: AtomicU64,
    created: bool,
}

impl LogStore {
    /// Open or create the store at `paths`
    ///
    /// # Errors
    ///
    /// - `NotFound` if nothing exists and `create` is off (or read-only)
    /// - `UnknownEngine` if creating with an engine name this build lacks
    /// - `EngineMismatch` if the file was created by another engine
    /// - `Encoding` if an intact record holds an undecodable writeset
    pub fn open(paths: DatabasePaths, options: StoreOptions) -> Result<Self, LogError> {
        paths.validate()?;

        let log_path = paths.log_file();
        let (mut log, created) = if paths.exists() {
            let log = LogFile::open(&log_path, options.read_only)?;
            log.header().check_engine(&options.engine)?;
            (log, false)
        } else {
            if !options.create || options.read_only {
                return Err(LogError::NotFound {
                    path: paths.root().to_path_buf(),
                });
            }
            if options.engine != LOG_ENGINE {
                return Err(LogError::UnknownEngine(options.engine.clone()));
            }
            paths.create_directories()?;
            let header = FileHeader::new(&options.engine, unix_now())?;
            (LogFile::create(&log_path, header)?, true)
        };

        let mut state = StoreState::new();
        let mut generation = 0;
        for record in log.read_records()? {
            let writeset = Writeset::from_bytes(&record.writeset)?;
            state.apply_writeset(&writeset)?;
            generation = record.txn_id;
        }

        info!(
            target: "docstore::storage",
            path = %paths.root().display(),
            created,
            generation,
            documents = state.document_count(),
            last_sequence = state.last_sequence(),
            "Opened store"
        );

        Ok(LogStore {
            paths,
            options,
            log: Mutex::new(log),
            committed: RwLock::new(Arc::new(state)),
            generation: AtomicU64::new(generation),
            created,
        })
    }

    /// True if `open` created the file
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// The file layout
    pub fn paths(&self) -> &DatabasePaths {
        &self.paths
    }

    /// The options the store was opened with
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The committed state
    pub fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.committed.read())
    }

    /// Snapshot together with its generation, read atomically
    pub fn snapshot_with_generation(&self) -> (Arc<StoreState>, u64) {
        let guard = self.committed.read();
        (Arc::clone(&guard), self.generation.load(Ordering::Acquire))
    }

    /// Number of commits applied
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Durably append `writeset` and publish `state`
    ///
    /// `state` must be the snapshot at `base_generation` with `writeset`
    /// applied. An empty writeset publishes nothing.
    pub fn commit(
        &self,
        base_generation: u64,
        writeset: &Writeset,
        state: Arc<StoreState>,
    ) -> Result<CommitInfo, LogError> {
        if self.options.read_only {
            return Err(LogError::ReadOnly);
        }
        let mut log = self.log.lock();
        let current = self.generation.load(Ordering::Acquire);
        if base_generation != current {
            return Err(LogError::StaleBase {
                base: base_generation,
                current,
            });
        }
        if writeset.is_empty() {
            return Ok(CommitInfo {
                generation: current,
                last_sequence: self.committed.read().last_sequence(),
                mutations: 0,
            });
        }

        let txn_id = current + 1;
        let record = CommitRecord::new(txn_id, unix_now(), writeset.to_bytes()?);
        log.append(&record, self.options.sync == SyncMode::Always)?;

        let last_sequence = state.last_sequence();
        {
            let mut committed = self.committed.write();
            *committed = state;
            self.generation.store(txn_id, Ordering::Release);
        }

        debug!(
            target: "docstore::storage",
            txn_id,
            mutations = writeset.len(),
            last_sequence,
            "Committed"
        );

        Ok(CommitInfo {
            generation: txn_id,
            last_sequence,
            mutations: writeset.len(),
        })
    }

    /// Rewrite the log as a single record holding the committed state
    ///
    /// The new file replaces the old one with a rename, so a crash leaves
    /// one or the other intact.
    pub fn compact(&self) -> Result<(), LogError> {
        if self.options.read_only {
            return Err(LogError::ReadOnly);
        }
        let mut log = self.log.lock();
        let generation = self.generation.load(Ordering::Acquire);
        let state = self.snapshot();
        let before = log.size();

        let tmp_path = self.paths.compact_file();
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path)?;
        }

        let mut compacted = LogFile::create(&tmp_path, log.header().clone())?;
        let writeset = state.to_writeset();
        if generation > 0 {
            let record = CommitRecord::new(generation, unix_now(), writeset.to_bytes()?);
            compacted.append(&record, true)?;
        }
        compacted.sync()?;
        drop(compacted);

        let log_path = self.paths.log_file();
        std::fs::rename(&tmp_path, &log_path)?;
        *log = LogFile::open(&log_path, false)?;

        info!(
            target: "docstore::storage",
            path = %self.paths.root().display(),
            before,
            after = log.size(),
            "Compacted log"
        );
        Ok(())
    }

    /// Flush the log to disk
    pub fn sync(&self) -> Result<(), LogError> {
        self.log.lock().sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DocRecord;
    use crate::writeset::Mutation;
    use docstore_core::{DocumentFlags, OwnedBuffer, RevId};
    use tempfile::TempDir;

    fn put(state: &mut StoreState, ws: &mut Writeset, id: &str, body: &str) {
        let record = DocRecord {
            doc_id: id.as_bytes().to_vec(),
            rev_id: RevId::new(1, "abc").unwrap(),
            sequence: state.last_sequence() + 1,
            flags: DocumentFlags::EXISTS,
            body: OwnedBuffer::from(body),
            history: Vec::new(),
        };
        let m = Mutation::PutDocument(record);
        state.apply(&m).unwrap();
        ws.push(m);
        ws.last_sequence = state.last_sequence();
    }

    fn commit_one(store: &LogStore, id: &str, body: &str) -> CommitInfo {
        let (snap, gen) = store.snapshot_with_generation();
        let mut state = (*snap).clone();
        let mut ws = Writeset::new(state.last_sequence());
        put(&mut state, &mut ws, id, body);
        store.commit(gen, &ws, Arc::new(state)).unwrap()
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let paths = DatabasePaths::new(dir.path().join("db"), false);
        let options = StoreOptions {
            create: false,
            ..StoreOptions::default()
        };
        assert!(matches!(
            LogStore::open(paths, options),
            Err(LogError::NotFound { .. })
        ));
    }

    #[test]
    fn test_commit_then_reopen() {
        let dir = TempDir::new().unwrap();
        let paths = DatabasePaths::new(dir.path().join("db"), true);

        let store = LogStore::open(paths.clone(), StoreOptions::default()).unwrap();
        assert!(store.was_created());
        let info = commit_one(&store, "a", "1");
        assert_eq!(info.generation, 1);
        assert_eq!(info.last_sequence, 1);
        commit_one(&store, "b", "2");
        drop(store);

        let store = LogStore::open(paths, StoreOptions::default()).unwrap();
        assert!(!store.was_created());
        assert_eq!(store.generation(), 2);
        let snap = store.snapshot();
        assert_eq!(snap.document_count(), 2);
        assert_eq!(snap.document(b"b").unwrap().body, "2");
    }

    #[test]
    fn test_stale_base_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store =
            LogStore::open(DatabasePaths::new(dir.path().join("db"), false), StoreOptions::default())
                .unwrap();
        let (snap, gen) = store.snapshot_with_generation();
        commit_one(&store, "a", "1");

        let mut state = (*snap).clone();
        let mut ws = Writeset::new(0);
        put(&mut state, &mut ws, "b", "2");
        assert!(matches!(
            store.commit(gen, &ws, Arc::new(state)),
            Err(LogError::StaleBase { .. })
        ));
        assert!(store.snapshot().document(b"b").is_none());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_commits() {
        let dir = TempDir::new().unwrap();
        let store =
            LogStore::open(DatabasePaths::new(dir.path().join("db"), false), StoreOptions::default())
                .unwrap();
        commit_one(&store, "a", "1");
        let before = store.snapshot();
        commit_one(&store, "b", "2");
        assert_eq!(before.document_count(), 1);
        assert_eq!(store.snapshot().document_count(), 2);
    }

    #[test]
    fn test_engine_selector_checks() {
        let dir = TempDir::new().unwrap();
        let paths = DatabasePaths::new(dir.path().join("db"), true);
        let bogus = StoreOptions {
            engine: "b0gus".to_string(),
            ..StoreOptions::default()
        };
        assert!(matches!(
            LogStore::open(paths.clone(), bogus.clone()),
            Err(LogError::UnknownEngine(_))
        ));

        drop(LogStore::open(paths.clone(), StoreOptions::default()).unwrap());
        assert!(matches!(
            LogStore::open(paths, bogus),
            Err(LogError::EngineMismatch { .. })
        ));
    }

    #[test]
    fn test_read_only_rejects_commit() {
        let dir = TempDir::new().unwrap();
        let paths = DatabasePaths::new(dir.path().join("db"), false);
        drop(LogStore::open(paths.clone(), StoreOptions::default()).unwrap());

        let store = LogStore::open(
            paths,
            StoreOptions {
                read_only: true,
                ..StoreOptions::default()
            },
        )
        .unwrap();
        let mut state = StoreState::new();
        let mut ws = Writeset::new(0);
        put(&mut state, &mut ws, "a", "1");
        assert!(matches!(
            store.commit(0, &ws, Arc::new(state)),
            Err(LogError::ReadOnly)
        ));
    }

    #[test]
    fn test_compact_preserves_state() {
        let dir = TempDir::new().unwrap();
        let paths = DatabasePaths::new(dir.path().join("db"), false);
        let store = LogStore::open(paths.clone(), StoreOptions::default()).unwrap();
        for i in 0..20 {
            commit_one(&store, "same", &i.to_string());
        }
        let before = std::fs::metadata(paths.log_file()).unwrap().len();
        store.compact().unwrap();
        let after = std::fs::metadata(paths.log_file()).unwrap().len();
        assert!(after < before);

        commit_one(&store, "other", "x");
        drop(store);

        let store = LogStore::open(paths, StoreOptions::default()).unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.document(b"same").unwrap().body, "19");
        assert_eq!(snap.last_sequence(), 21);
        assert_eq!(store.generation(), 21);
    }
}
