//! Transaction manager: the single writer lock
//!
//! One thread at a time owns the write transaction. The owning thread may
//! nest `begin`/`end` pairs; only the outermost `end` finishes the
//! transaction, using the commit flag passed to that call.
//!
//! ## Lifecycle
//!
//! ```text
//! begin  (depth 0 → 1)  wait per WaitPolicy, take ownership, build context
//! begin  (depth n → n+1) same thread, no wait
//! end    (depth n+1 → n) bookkeeping only
//! end    (depth 1 → 0)  run finish(context, commit), release, wake a waiter
//! ```
//!
//! Ownership is held while `finish` runs (so no other writer can start
//! from a stale snapshot), but the internal mutex is not, so queries like
//! `has_open_transaction` never wait on disk I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use docstore_core::{Error, ErrorCode, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::transaction::TransactionContext;

/// What `begin` does when another thread owns the transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Wait until the owner finishes
    #[default]
    Block,
    /// Fail immediately with `Busy`
    NoWait,
    /// Wait up to the given time, then fail with `Busy`
    Timeout {
        /// Maximum wait in milliseconds
        millis: u64,
    },
}

/// Transaction statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionMetrics {
    /// Outermost transactions started
    pub total_started: u64,
    /// Transactions that committed
    pub total_committed: u64,
    /// Transactions that rolled back (requested or after a failed commit)
    pub total_aborted: u64,
    /// Begin attempts rejected with `Busy`
    pub total_busy: u64,
}

impl TransactionMetrics {
    /// Committed plus aborted
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }
}

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: u32,
    context: Option<TransactionContext>,
}

/// Coordinates the one writer transaction of a database
///
/// The metric counters use Relaxed ordering; they are observational only.
#[derive(Debug)]
pub struct TransactionManager {
    state: Mutex<LockState>,
    released: Condvar,
    wait: WaitPolicy,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_busy: AtomicU64,
}

impl TransactionManager {
    /// Create a manager using `wait` for contended begins
    pub fn new(wait: WaitPolicy) -> Self {
        TransactionManager {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
            wait,
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
            total_busy: AtomicU64::new(0),
        }
    }

    /// The configured wait policy
    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    /// Begin (or nest) a transaction on the calling thread
    ///
    /// `start` builds the context and is only called for the outermost
    /// begin. Returns true if this call started a new transaction.
    ///
    /// # Errors
    ///
    /// `Busy` if another thread owns the transaction and the wait policy
    /// gives up; any error from `start`.
    pub fn begin<F>(&self, start: F) -> Result<bool>
    where
        F: FnOnce() -> Result<TransactionContext>,
    {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.depth += 1;
            trace!(target: "docstore::txn", depth = state.depth, "Nested begin");
            return Ok(false);
        }

        self.wait_for_release(&mut state)?;

        let context = start()?;
        debug!(
            target: "docstore::txn",
            base_generation = context.base_generation(),
            "Transaction started"
        );
        state.owner = Some(me);
        state.depth = 1;
        state.context = Some(context);
        self.total_started.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn wait_for_release(&self, state: &mut MutexGuard<'_, LockState>) -> Result<()> {
        match self.wait {
            WaitPolicy::Block => {
                while state.owner.is_some() {
                    self.released.wait(state);
                }
            }
            WaitPolicy::NoWait => {
                if state.owner.is_some() {
                    return Err(self.busy());
                }
            }
            WaitPolicy::Timeout { millis } => {
                let deadline = Instant::now() + Duration::from_millis(millis);
                while state.owner.is_some() {
                    if self.released.wait_until(state, deadline).timed_out()
                        && state.owner.is_some()
                    {
                        return Err(self.busy());
                    }
                }
            }
        }
        Ok(())
    }

    fn busy(&self) -> Error {
        self.total_busy.fetch_add(1, Ordering::Relaxed);
        debug!(target: "docstore::txn", policy = ?self.wait, "Transaction busy");
        Error::engine(ErrorCode::Busy)
    }

    /// End one nesting level on the calling thread
    ///
    /// At the outermost level, `finish` receives the context and the
    /// commit flag; its result is returned and the lock is released
    /// whether it succeeds or not. Returns true if this call finished the
    /// transaction.
    ///
    /// # Errors
    ///
    /// `NotInTransaction` if the calling thread has no open transaction.
    pub fn end<F>(&self, commit: bool, finish: F) -> Result<bool>
    where
        F: FnOnce(TransactionContext, bool) -> Result<()>,
    {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) || state.depth == 0 {
            return Err(Error::engine(ErrorCode::NotInTransaction));
        }

        state.depth -= 1;
        if state.depth > 0 {
            trace!(target: "docstore::txn", depth = state.depth, "Nested end");
            return Ok(false);
        }

        let result = match state.context.take() {
            Some(context) => MutexGuard::unlocked(&mut state, || finish(context, commit)),
            None => Err(Error::assertion_failed("open transaction has no context")),
        };

        state.owner = None;
        drop(state);
        self.released.notify_all();

        match &result {
            Ok(()) if commit => {
                self.total_committed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.total_aborted.fetch_add(1, Ordering::Relaxed);
            }
        }
        debug!(
            target: "docstore::txn",
            commit,
            ok = result.is_ok(),
            "Transaction finished"
        );
        result.map(|()| true)
    }

    /// Run `f` on the calling thread's open transaction
    ///
    /// # Errors
    ///
    /// `NoTransaction` if the calling thread has none.
    pub fn with_context<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut TransactionContext) -> Result<R>,
    {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return Err(Error::engine(ErrorCode::NoTransaction));
        }
        match state.context.as_mut() {
            Some(context) => f(context),
            None => Err(Error::assertion_failed("open transaction has no context")),
        }
    }

    /// Read the calling thread's transaction context, if it has one
    pub fn inspect<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&TransactionContext) -> R,
    {
        let me = thread::current().id();
        let state = self.state.lock();
        if state.owner != Some(me) {
            return None;
        }
        state.context.as_ref().map(f)
    }

    /// True if the calling thread has an open transaction
    pub fn is_in_transaction(&self) -> bool {
        let state = self.state.lock();
        state.owner == Some(thread::current().id()) && state.depth > 0
    }

    /// Nesting depth of the calling thread's transaction (0 if none)
    pub fn depth(&self) -> u32 {
        let state = self.state.lock();
        if state.owner == Some(thread::current().id()) {
            state.depth
        } else {
            0
        }
    }

    /// True if any thread has an open transaction
    pub fn has_open_transaction(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Current statistics
    pub fn metrics(&self) -> TransactionMetrics {
        TransactionMetrics {
            total_started: self.total_started.load(Ordering::Relaxed),
            total_committed: self.total_committed.load(Ordering::Relaxed),
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_busy: self.total_busy.load(Ordering::Relaxed),
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(WaitPolicy::default())
    }
}
