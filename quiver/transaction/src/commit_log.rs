use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use quiver_common::TxnId;

/// Final state of a finished transaction. Ids that were issued but have no
/// commit-log entry are still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Tracks the outcome of every finished transaction.
///
/// MVCC visibility checks consult this on every version, so lookups must not
/// contend with the engine lock; a concurrent map keyed by transaction id is
/// enough at this scale. Entries below the truncation floor are dropped once
/// garbage collection has unlinked every version they could still classify;
/// any id below the floor that is still referenced from a version chain must
/// therefore have committed.
#[derive(Debug, Default)]
pub struct CommitLog {
    finished: DashMap<TxnId, bool>,
    floor: AtomicU64,
}

impl CommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_committed(&self, id: TxnId) {
        self.finished.insert(id, true);
    }

    pub fn set_aborted(&self, id: TxnId) {
        self.finished.insert(id, false);
    }

    pub fn info(&self, id: TxnId) -> TransactionState {
        if id < self.floor.load(Ordering::Acquire) {
            return TransactionState::Committed;
        }
        match self.finished.get(&id).map(|entry| *entry) {
            Some(true) => TransactionState::Committed,
            Some(false) => TransactionState::Aborted,
            None => TransactionState::Active,
        }
    }

    pub fn is_committed(&self, id: TxnId) -> bool {
        self.info(id) == TransactionState::Committed
    }

    pub fn is_active(&self, id: TxnId) -> bool {
        self.info(id) == TransactionState::Active
    }

    /// Raises the truncation floor to `oldest` and drops entries below it.
    /// Only the storage garbage collector may call this, after it has pruned
    /// every version inserted or expired by a transaction older than
    /// `oldest` that did not commit.
    pub fn truncate_below(&self, oldest: TxnId) {
        self.floor.fetch_max(oldest, Ordering::AcqRel);
        self.finished.retain(|id, _| *id >= oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_reflects_outcomes() {
        let clog = CommitLog::new();
        clog.set_committed(1);
        clog.set_aborted(2);
        assert_eq!(clog.info(1), TransactionState::Committed);
        assert_eq!(clog.info(2), TransactionState::Aborted);
        assert_eq!(clog.info(3), TransactionState::Active);
    }

    #[test]
    fn truncation_treats_old_ids_as_committed() {
        let clog = CommitLog::new();
        clog.set_committed(1);
        clog.set_aborted(2);
        clog.set_committed(5);
        clog.truncate_below(5);
        assert!(clog.is_committed(1));
        assert!(clog.is_committed(2));
        assert!(clog.is_committed(5));
        assert!(clog.is_active(6));
    }
}
