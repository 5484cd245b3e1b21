use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use quiver_common::{Gid, TxnId};
use quiver_transaction::{Engine, Transaction};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

const SHARD_COUNT: usize = 16;

/// Distinguishes the vertex and edge gid spaces in the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Vertex,
    Edge,
}

struct Shard {
    holders: Mutex<HashMap<(RecordKind, Gid), TxnId>>,
    condvar: Condvar,
}

/// Shard-striped record-lock table: one holder per record, blocking
/// acquisition with a timeout, deadlocks avoided by wound-wait on
/// transaction ids. Locks are released in bulk at transaction end via the
/// per-transaction held set.
pub struct LockStore {
    shards: Vec<Shard>,
    held: DashMap<TxnId, Vec<(RecordKind, Gid)>>,
    timeout: Duration,
}

impl LockStore {
    pub fn new(timeout: Duration) -> Self {
        LockStore {
            shards: (0..SHARD_COUNT)
                .map(|_| Shard {
                    holders: Mutex::new(HashMap::new()),
                    condvar: Condvar::new(),
                })
                .collect(),
            held: DashMap::new(),
            timeout,
        }
    }

    fn shard(&self, key: &(RecordKind, Gid)) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Acquires the write lock on a record for the given transaction,
    /// blocking up to the configured timeout. On conflict the older
    /// transaction wounds the younger holder (which aborts at its next
    /// cancellation point); the younger requester waits and times out with
    /// [`StorageError::LockTimeout`].
    pub fn acquire(
        &self,
        kind: RecordKind,
        gid: Gid,
        transaction: &Transaction,
        engine: &Engine,
    ) -> StorageResult<()> {
        let key = (kind, gid);
        let shard = self.shard(&key);
        let deadline = Instant::now() + self.timeout;
        let mut holders = shard.holders.lock().unwrap();
        loop {
            match holders.get(&key) {
                Some(&holder) if holder == transaction.id() => return Ok(()),
                Some(&holder) if engine.clog().is_active(holder) => {
                    if transaction.id() < holder {
                        // Wound-wait: the older transaction marks the younger
                        // holder for abort and keeps waiting for the lock.
                        if let Ok(victim) = engine.running_transaction(holder) {
                            debug!(holder, requester = transaction.id(), "wounding lock holder");
                            victim.wound();
                        }
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(StorageError::LockTimeout(gid));
                    }
                    let (guard, _) = shard.condvar.wait_timeout(holders, remaining).unwrap();
                    holders = guard;
                }
                // Free, or held by a transaction that already finished
                // without releasing (crash path): take it over.
                _ => {
                    holders.insert(key, transaction.id());
                    self.held.entry(transaction.id()).or_default().push(key);
                    return Ok(());
                }
            }
        }
    }

    /// Releases every lock the transaction holds. Called once from the
    /// commit and abort paths.
    pub fn release_all(&self, tx_id: TxnId) {
        let Some((_, keys)) = self.held.remove(&tx_id) else {
            return;
        };
        for key in keys {
            let shard = self.shard(&key);
            let mut holders = shard.holders.lock().unwrap();
            if holders.get(&key) == Some(&tx_id) {
                holders.remove(&key);
            }
            shard.condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn store() -> LockStore {
        LockStore::new(Duration::from_millis(50))
    }

    #[test]
    fn reacquire_by_holder_is_free() {
        let engine = Engine::new();
        let store = store();
        let tx = engine.begin();
        let gid = Gid::new(0, 1);
        store.acquire(RecordKind::Vertex, gid, &tx, &engine).unwrap();
        store.acquire(RecordKind::Vertex, gid, &tx, &engine).unwrap();
    }

    #[test]
    fn younger_contender_times_out_and_wounds_nobody() {
        let engine = Engine::new();
        let store = store();
        let older = engine.begin();
        let younger = engine.begin();
        let gid = Gid::new(0, 1);
        store
            .acquire(RecordKind::Vertex, gid, &older, &engine)
            .unwrap();
        assert!(matches!(
            store.acquire(RecordKind::Vertex, gid, &younger, &engine),
            Err(StorageError::LockTimeout(_))
        ));
        assert!(!older.should_abort());
    }

    #[test]
    fn older_contender_wounds_the_younger_holder() {
        let engine = Engine::new();
        let store = store();
        let older = engine.begin();
        let younger = engine.begin();
        let gid = Gid::new(0, 1);
        store
            .acquire(RecordKind::Vertex, gid, &younger, &engine)
            .unwrap();
        let _ = store.acquire(RecordKind::Vertex, gid, &older, &engine);
        assert!(younger.should_abort());
    }

    #[test]
    fn release_wakes_a_blocked_contender() {
        let engine = Arc::new(Engine::new());
        let store = Arc::new(LockStore::new(Duration::from_millis(500)));
        let first = engine.begin();
        let second = engine.begin();
        let gid = Gid::new(0, 1);
        store
            .acquire(RecordKind::Vertex, gid, &first, &engine)
            .unwrap();

        let thread_store = Arc::clone(&store);
        let thread_engine = Arc::clone(&engine);
        let waiter = thread::spawn(move || {
            thread_store.acquire(RecordKind::Vertex, gid, &second, &thread_engine)
        });
        thread::sleep(Duration::from_millis(20));
        store.release_all(first.id());
        assert!(waiter.join().unwrap().is_ok());
    }
}
