use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use quiver_common::TxnId;

use crate::commit_log::CommitLog;
use crate::error::TransactionError;
use crate::snapshot::Snapshot;

/// A running transaction: its id, the snapshot captured at begin, and the
/// wound-wait flag the lock store may raise against it.
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    snapshot: Snapshot,
    should_abort: AtomicBool,
}

impl Transaction {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Raised by an older transaction that wants a lock this transaction
    /// holds. The executor observes the flag between pulls and aborts.
    pub fn wound(&self) {
        self.should_abort.store(true, Ordering::Release);
    }

    pub fn should_abort(&self) -> bool {
        self.should_abort.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct EngineInner {
    counter: TxnId,
    active: Snapshot,
    store: HashMap<TxnId, Arc<Transaction>>,
}

/// Issues monotonically increasing transaction ids and tracks the active
/// set. Snapshots are captured under the same lock that advances the
/// counter, so a snapshot never misses a concurrently-beginning
/// transaction.
#[derive(Debug, Default)]
pub struct Engine {
    inner: Mutex<EngineInner>,
    clog: CommitLog,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose ids start above `start`. Workers carve the id space
    /// the same way gids are carved, so a transaction applied remotely
    /// under its owner's id can never collide with a locally issued one.
    pub fn with_start(start: TxnId) -> Self {
        let engine = Engine::default();
        engine.inner.lock().unwrap().counter = start;
        engine
    }

    /// Begins a transaction: allocates the next id, records it active and
    /// captures the snapshot of transactions active before it.
    pub fn begin(&self) -> Arc<Transaction> {
        let mut inner = self.inner.lock().unwrap();
        inner.counter = inner
            .counter
            .checked_add(1)
            .unwrap_or_else(|| panic!("{}", TransactionError::IdExhausted));
        let id = inner.counter;
        let snapshot = inner.active.clone();
        let transaction = Arc::new(Transaction {
            id,
            snapshot,
            should_abort: AtomicBool::new(false),
        });
        inner.active.insert(id);
        inner.store.insert(id, Arc::clone(&transaction));
        transaction
    }

    /// Registers a transaction owned by another worker so deltas replicated
    /// over RPC apply under the owner's id. The local counter advances past
    /// the remote id to keep ids monotone on this worker.
    pub fn begin_remote(&self, id: TxnId, snapshot: Snapshot) -> Arc<Transaction> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.store.get(&id) {
            return Arc::clone(existing);
        }
        inner.counter = inner.counter.max(id);
        let transaction = Arc::new(Transaction {
            id,
            snapshot,
            should_abort: AtomicBool::new(false),
        });
        inner.active.insert(id);
        inner.store.insert(id, Arc::clone(&transaction));
        transaction
    }

    pub fn commit(&self, transaction: &Transaction) -> Result<(), TransactionError> {
        self.finish(transaction.id(), true)
    }

    pub fn abort(&self, transaction: &Transaction) -> Result<(), TransactionError> {
        self.finish(transaction.id(), false)
    }

    fn finish(&self, id: TxnId, committed: bool) -> Result<(), TransactionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.store.remove(&id).is_none() {
            return Err(TransactionError::AlreadyFinished(id));
        }
        inner.active.remove(id);
        if committed {
            self.clog.set_committed(id);
        } else {
            self.clog.set_aborted(id);
        }
        Ok(())
    }

    pub fn clog(&self) -> &CommitLog {
        &self.clog
    }

    /// The highest transaction id issued so far.
    pub fn global_last(&self) -> TxnId {
        self.inner.lock().unwrap().counter
    }

    /// A copy of the currently active set.
    pub fn global_active(&self) -> Snapshot {
        self.inner.lock().unwrap().active.clone()
    }

    /// The oldest transaction that can still read: the minimum active id,
    /// or one past the last issued id when nothing is active.
    pub fn oldest_active(&self) -> TxnId {
        let inner = self.inner.lock().unwrap();
        inner.active.first().unwrap_or(inner.counter + 1)
    }

    /// The snapshot the garbage collector prunes against. With no active
    /// transactions this is `{last + 1}`; otherwise it is the oldest active
    /// transaction's begin snapshot plus its own id, so every id a live
    /// reader could still treat as in-progress is represented.
    pub fn gc_snapshot(&self) -> Snapshot {
        let inner = self.inner.lock().unwrap();
        match inner.active.first() {
            None => [inner.counter + 1].into_iter().collect(),
            Some(oldest) => {
                let mut snapshot = inner
                    .store
                    .get(&oldest)
                    .map(|transaction| transaction.snapshot().clone())
                    .unwrap_or_default();
                snapshot.insert(oldest);
                snapshot
            }
        }
    }

    pub fn running_transaction(&self, id: TxnId) -> Result<Arc<Transaction>, TransactionError> {
        self.inner
            .lock()
            .unwrap()
            .store
            .get(&id)
            .cloned()
            .ok_or(TransactionError::NotRunning(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit_log::TransactionState;

    #[test]
    fn begin_captures_prior_active_set() {
        let engine = Engine::new();
        let a = engine.begin();
        let b = engine.begin();
        assert!(a.snapshot().is_empty());
        assert!(b.snapshot().contains(a.id()));
        assert!(!b.snapshot().contains(b.id()));
    }

    #[test]
    fn commit_and_abort_update_the_commit_log() {
        let engine = Engine::new();
        let a = engine.begin();
        let b = engine.begin();
        engine.commit(&a).unwrap();
        engine.abort(&b).unwrap();
        assert_eq!(engine.clog().info(a.id()), TransactionState::Committed);
        assert_eq!(engine.clog().info(b.id()), TransactionState::Aborted);
        assert!(engine.commit(&a).is_err());
    }

    #[test]
    fn oldest_active_tracks_the_frontier() {
        let engine = Engine::new();
        assert_eq!(engine.oldest_active(), 1);
        let a = engine.begin();
        let b = engine.begin();
        assert_eq!(engine.oldest_active(), a.id());
        engine.commit(&a).unwrap();
        assert_eq!(engine.oldest_active(), b.id());
        engine.commit(&b).unwrap();
        assert_eq!(engine.oldest_active(), engine.global_last() + 1);
    }

    #[test]
    fn gc_snapshot_covers_live_readers() {
        let engine = Engine::new();
        let idle = engine.gc_snapshot();
        assert!(idle.contains(engine.global_last() + 1));

        let a = engine.begin();
        let b = engine.begin();
        engine.commit(&a).unwrap();
        // `a` committed while `b` was running, so `a` stays in the horizon
        // until `b` finishes.
        let snapshot = engine.gc_snapshot();
        assert!(snapshot.contains(a.id()));
        assert!(snapshot.contains(b.id()));
        engine.commit(&b).unwrap();
        assert!(!engine.gc_snapshot().contains(a.id()));
    }

    #[test]
    fn remote_transactions_share_the_id_space() {
        let engine = Engine::new();
        let remote = engine.begin_remote(100, Snapshot::new());
        assert_eq!(remote.id(), 100);
        let local = engine.begin();
        assert!(local.id() > 100);
        let again = engine.begin_remote(100, Snapshot::new());
        assert_eq!(again.id(), 100);
    }
}
