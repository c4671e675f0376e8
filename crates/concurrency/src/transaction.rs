//! Transaction context
//!
//! A `TransactionContext` is the private working copy of one writer
//! transaction. It starts as a shared reference to the committed state
//! and is copied on first write, so read-only transactions never clone.
//! `StoreState` tables are persistent maps, so that copy and every later
//! one (after a `snapshot` handed out for a read) share structure with
//! their source and cost the same at any database size.
//!
//! Every change goes through `apply`, which updates the working copy and
//! records the mutation for the commit record in the same step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use docstore_core::{Result, Sequence};
use docstore_storage::{Mutation, StoreState, Writeset};

/// Summary of what a transaction would write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOperations {
    /// Document revisions stored
    pub documents: usize,
    /// Documents purged
    pub purges: usize,
    /// Expirations set or cleared
    pub expirations: usize,
    /// Raw documents written or deleted
    pub raw: usize,
}

impl PendingOperations {
    /// Total number of mutations
    pub fn total(&self) -> usize {
        self.documents + self.purges + self.expirations + self.raw
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Working state of an open writer transaction
#[derive(Debug)]
pub struct TransactionContext {
    /// Store generation the transaction started from
    base_generation: u64,
    /// Committed state plus this transaction's changes
    working: Arc<StoreState>,
    /// Changes in the order they were made
    writeset: Writeset,
    started: Instant,
}

impl TransactionContext {
    /// Start from the committed `snapshot` at `base_generation`
    pub fn new(snapshot: Arc<StoreState>, base_generation: u64) -> Self {
        let writeset = Writeset::new(snapshot.last_sequence());
        TransactionContext {
            base_generation,
            working: snapshot,
            writeset,
            started: Instant::now(),
        }
    }

    /// Store generation the transaction started from
    pub fn base_generation(&self) -> u64 {
        self.base_generation
    }

    /// The working state
    pub fn state(&self) -> &StoreState {
        &self.working
    }

    /// Shared handle to the working state as of now
    ///
    /// Later writes in this transaction do not show through the handle.
    pub fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.working)
    }

    /// Sequence the next stored revision will get
    pub fn next_sequence(&self) -> Sequence {
        self.working.last_sequence() + 1
    }

    /// Apply a mutation to the working state and record it
    pub fn apply(&mut self, mutation: Mutation) -> Result<()> {
        Arc::make_mut(&mut self.working).apply(&mutation)?;
        self.writeset.push(mutation);
        Ok(())
    }

    /// What the transaction would write
    pub fn pending_operations(&self) -> PendingOperations {
        let mut pending = PendingOperations::default();
        for mutation in &self.writeset.mutations {
            match mutation {
                Mutation::PutDocument(_) => pending.documents += 1,
                Mutation::PurgeDocument { .. } => pending.purges += 1,
                Mutation::SetExpiration { .. } | Mutation::ClearExpiration { .. } => {
                    pending.expirations += 1
                }
                Mutation::PutRaw { .. } | Mutation::DeleteRaw { .. } => pending.raw += 1,
            }
        }
        pending
    }

    /// True if any mutation has been recorded
    pub fn has_pending_operations(&self) -> bool {
        !self.writeset.is_empty()
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Consume into `(base_generation, writeset, resulting state)`
    pub fn into_parts(self) -> (u64, Writeset, Arc<StoreState>) {
        let mut writeset = self.writeset;
        writeset.last_sequence = self.working.last_sequence();
        (self.base_generation, writeset, self.working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{DocumentFlags, OwnedBuffer, RevId};
    use docstore_storage::DocRecord;

    fn put(ctx: &TransactionContext, id: &str) -> Mutation {
        Mutation::PutDocument(DocRecord {
            doc_id: id.as_bytes().to_vec(),
            rev_id: RevId::new(1, "aa").unwrap(),
            sequence: ctx.next_sequence(),
            flags: DocumentFlags::EXISTS,
            body: OwnedBuffer::from("{}"),
            history: Vec::new(),
        })
    }

    #[test]
    fn test_writes_do_not_touch_base_snapshot() {
        let base = Arc::new(StoreState::new());
        let mut ctx = TransactionContext::new(Arc::clone(&base), 0);

        let m = put(&ctx, "a");
        ctx.apply(m).unwrap();

        assert_eq!(ctx.state().document_count(), 1);
        assert_eq!(base.document_count(), 0);
        assert_eq!(ctx.next_sequence(), 2);
    }

    #[test]
    fn test_read_only_transaction_shares_state() {
        let base = Arc::new(StoreState::new());
        let ctx = TransactionContext::new(Arc::clone(&base), 3);
        assert!(!ctx.has_pending_operations());
        let (gen, ws, state) = ctx.into_parts();
        assert_eq!(gen, 3);
        assert!(ws.is_empty());
        assert!(Arc::ptr_eq(&state, &base));
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let mut ctx = TransactionContext::new(Arc::new(StoreState::new()), 0);
        let m = put(&ctx, "a");
        ctx.apply(m).unwrap();
        let snap = ctx.snapshot();
        let m = put(&ctx, "b");
        ctx.apply(m).unwrap();
        assert_eq!(snap.document_count(), 1);
        assert_eq!(ctx.state().document_count(), 2);
    }

    #[test]
    fn test_interleaved_reads_and_writes_on_large_base() {
        let mut seed = TransactionContext::new(Arc::new(StoreState::new()), 0);
        for i in 0..20_000 {
            let m = put(&seed, &format!("base-{:05}", i));
            seed.apply(m).unwrap();
        }
        let (_, _, base) = seed.into_parts();

        let mut ctx = TransactionContext::new(Arc::clone(&base), 1);
        let mut snapshots = Vec::new();
        for i in 0..200 {
            // Each read pins the working state, so the next write copies it
            snapshots.push(ctx.snapshot());
            let m = put(&ctx, &format!("txn-{:03}", i));
            ctx.apply(m).unwrap();
        }

        assert_eq!(base.document_count(), 20_000);
        assert_eq!(ctx.state().document_count(), 20_200);
        for (i, snap) in snapshots.iter().enumerate() {
            assert_eq!(snap.document_count(), 20_000 + i as u64);
        }
        assert!(base.document(b"txn-000").is_none());
        assert_eq!(ctx.pending_operations().documents, 200);
    }

    #[test]
    fn test_failed_apply_records_nothing() {
        let mut ctx = TransactionContext::new(Arc::new(StoreState::new()), 0);
        let m = put(&ctx, "a");
        ctx.apply(m.clone()).unwrap();
        // same sequence again
        assert!(ctx.apply(m).is_err());
        assert_eq!(ctx.pending_operations().documents, 1);
    }

    #[test]
    fn test_pending_operations() {
        let mut ctx = TransactionContext::new(Arc::new(StoreState::new()), 0);
        let m = put(&ctx, "a");
        ctx.apply(m).unwrap();
        ctx.apply(Mutation::SetExpiration {
            doc_id: b"a".to_vec(),
            expires_at: 10,
        })
        .unwrap();
        ctx.apply(Mutation::DeleteRaw {
            store: "info".to_string(),
            key: b"k".to_vec(),
        })
        .unwrap();

        let pending = ctx.pending_operations();
        assert_eq!(pending.documents, 1);
        assert_eq!(pending.expirations, 1);
        assert_eq!(pending.raw, 1);
        assert_eq!(pending.total(), 3);

        let (_, ws, _) = ctx.into_parts();
        assert_eq!(ws.last_sequence, 1);
    }
}
