use std::sync::RwLock;

use quiver_common::{Gid, TxnId};
use quiver_transaction::{CommitLog, Snapshot, Transaction};

use crate::error::{StorageError, StorageResult};

/// One version in a record's history. `tx_expired == 0` means the version is
/// live; a tombstone version marks the record as deleted from its inserter's
/// point of view. Chains link newest to oldest and are append-only: once
/// another transaction can read a version, nothing mutates it again.
#[derive(Debug)]
struct Version<T> {
    data: T,
    tombstone: bool,
    tx_inserted: TxnId,
    tx_expired: TxnId,
    next: Option<Box<Version<T>>>,
}

impl<T> Version<T> {
    /// Visible iff inserted by the caller (and not self-expired), or
    /// inserted by a transaction that committed outside the caller's
    /// snapshot and not expired by such a transaction either.
    fn visible_to(&self, transaction: &Transaction, clog: &CommitLog) -> bool {
        let inserted_visible = if self.tx_inserted == transaction.id() {
            true
        } else {
            clog.is_committed(self.tx_inserted)
                && !transaction.snapshot().contains(self.tx_inserted)
        };
        if !inserted_visible {
            return false;
        }
        match self.tx_expired {
            0 => true,
            expirer if expirer == transaction.id() => false,
            expirer => {
                !(clog.is_committed(expirer) && !transaction.snapshot().contains(expirer))
            }
        }
    }
}

/// The version list of a single logical record under MVCC.
///
/// Readers walk the chain for the version visible to their snapshot; writers
/// must hold the record lock (see [`super::lock_store::LockStore`]) before
/// calling [`VersionList::update_with`] or [`VersionList::remove`].
#[derive(Debug)]
pub struct VersionList<T: Clone> {
    gid: Gid,
    chain: RwLock<Option<Box<Version<T>>>>,
}

impl<T: Clone> VersionList<T> {
    pub fn new(gid: Gid, data: T, transaction: &Transaction) -> Self {
        VersionList {
            gid,
            chain: RwLock::new(Some(Box::new(Version {
                data,
                tombstone: false,
                tx_inserted: transaction.id(),
                tx_expired: 0,
                next: None,
            }))),
        }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    /// Returns a snapshot of the version visible to the transaction.
    pub fn find(&self, transaction: &Transaction, clog: &CommitLog) -> StorageResult<T> {
        let chain = self.chain.read().unwrap();
        let mut cursor = chain.as_deref();
        while let Some(version) = cursor {
            if version.visible_to(transaction, clog) {
                if version.tombstone {
                    return Err(StorageError::NotFound(self.gid));
                }
                return Ok(version.data.clone());
            }
            cursor = version.next.as_deref();
        }
        Err(StorageError::NotFound(self.gid))
    }

    pub fn is_visible(&self, transaction: &Transaction, clog: &CommitLog) -> bool {
        self.find(transaction, clog).is_ok()
    }

    /// Re-resolves the visible version after the transaction yielded and
    /// reacquired the record (e.g. when buffered remote deltas are applied).
    pub fn reconstruct(&self, transaction: &Transaction, clog: &CommitLog) -> StorageResult<T> {
        self.find(transaction, clog)
    }

    /// Clones the visible version, applies `mutate` to the clone and links
    /// it as the new chain head, expiring the old head in the caller's name.
    /// If the caller already owns the head, it is mutated in place.
    ///
    /// The caller must hold the record lock.
    pub fn update_with<F>(&self, transaction: &Transaction, clog: &CommitLog, mutate: F) -> StorageResult<()>
    where
        F: FnOnce(&mut T),
    {
        self.write_new_head(transaction, clog, false, mutate)
    }

    /// Like [`VersionList::update_with`] but the new head is a tombstone.
    pub fn remove(&self, transaction: &Transaction, clog: &CommitLog) -> StorageResult<()> {
        self.write_new_head(transaction, clog, true, |_| {})
    }

    fn write_new_head<F>(
        &self,
        transaction: &Transaction,
        clog: &CommitLog,
        tombstone: bool,
        mutate: F,
    ) -> StorageResult<()>
    where
        F: FnOnce(&mut T),
    {
        let mut chain = self.chain.write().unwrap();
        // Heads left behind by aborted writers are invisible to everyone;
        // unlink them so the newest meaningful version is the head.
        loop {
            let head_aborted = chain.as_deref().is_some_and(|head| {
                clog.info(head.tx_inserted) == quiver_transaction::TransactionState::Aborted
            });
            if !head_aborted {
                break;
            }
            let next = chain.as_mut().unwrap().next.take();
            *chain = next;
        }
        let head = chain.as_deref_mut().ok_or(StorageError::NotFound(self.gid))?;

        if head.tx_inserted == transaction.id() {
            // Our own uncommitted head: mutate in place, no new version.
            if head.tombstone && !tombstone {
                return Err(StorageError::RecordDeleted(self.gid));
            }
            head.tombstone = tombstone;
            mutate(&mut head.data);
            return Ok(());
        }

        let inserted_visible = clog.is_committed(head.tx_inserted)
            && !transaction.snapshot().contains(head.tx_inserted);
        if !inserted_visible {
            // The newest version belongs to a writer we cannot see: either
            // still uncommitted (the lock store should have stopped us) or
            // committed after our snapshot. First committer wins.
            return Err(StorageError::Serialization(self.gid));
        }
        match head.tx_expired {
            0 => {}
            expirer if expirer == transaction.id() => {
                return Err(StorageError::RecordDeleted(self.gid));
            }
            expirer if clog.info(expirer) == quiver_transaction::TransactionState::Aborted => {
                // The expirer rolled back; the head is ours to supersede.
            }
            _ => return Err(StorageError::Serialization(self.gid)),
        }
        if head.tombstone {
            return Err(StorageError::RecordDeleted(self.gid));
        }

        let mut data = head.data.clone();
        mutate(&mut data);
        head.tx_expired = transaction.id();
        let old_head = chain.take().unwrap();
        *chain = Some(Box::new(Version {
            data,
            tombstone,
            tx_inserted: transaction.id(),
            tx_expired: 0,
            next: Some(old_head),
        }));
        Ok(())
    }

    /// The data of the newest committed, non-tombstone version, ignoring any
    /// uncommitted head. Used when rebuilding indexes.
    pub fn newest_committed(&self, clog: &CommitLog) -> Option<T> {
        let chain = self.chain.read().unwrap();
        let mut cursor = chain.as_deref();
        while let Some(version) = cursor {
            if clog.is_committed(version.tx_inserted) {
                if version.tombstone {
                    return None;
                }
                return Some(version.data.clone());
            }
            cursor = version.next.as_deref();
        }
        None
    }

    /// The record's data when its history has settled: a single live,
    /// committed version below the garbage-collection horizon that every
    /// current and future transaction sees identically. Index cleanup may
    /// only trust what a settled record says.
    pub fn settled(&self, gc_snapshot: &Snapshot, clog: &CommitLog) -> Option<T> {
        let chain = self.chain.read().unwrap();
        let head = chain.as_deref()?;
        if head.next.is_some() || head.tx_expired != 0 || head.tombstone {
            return None;
        }
        if !settled_insert(head, gc_snapshot, clog) {
            return None;
        }
        Some(head.data.clone())
    }

    /// Prunes versions no current or future transaction can see, given the
    /// garbage-collection snapshot (the oldest active transaction's begin
    /// snapshot plus its id; see `Engine::gc_snapshot`). Returns true when
    /// the whole record is reclaimable and should be dropped from the store.
    pub fn gc(&self, gc_snapshot: &Snapshot, clog: &CommitLog) -> bool {
        let horizon = match gc_snapshot.last() {
            Some(horizon) => horizon,
            None => return false,
        };
        let settled = |id: TxnId| {
            id != 0 && clog.is_committed(id) && !gc_snapshot.contains(id) && id < horizon
        };

        let mut chain = self.chain.write().unwrap();

        // Unlink versions inserted by aborted transactions (invisible to
        // everyone) and void expirations by aborted transactions, so the
        // commit-log truncation that follows this pass can treat any id it
        // forgets as committed.
        let mut cursor = &mut *chain;
        loop {
            match cursor {
                None => break,
                Some(version)
                    if clog.info(version.tx_inserted)
                        == quiver_transaction::TransactionState::Aborted =>
                {
                    let next = version.next.take();
                    *cursor = next;
                }
                Some(version) => {
                    if version.tx_expired != 0
                        && clog.info(version.tx_expired)
                            == quiver_transaction::TransactionState::Aborted
                    {
                        version.tx_expired = 0;
                    }
                    cursor = &mut version.next;
                }
            }
        }

        // Cut the chain at the newest version whose expiration has settled
        // below the horizon: it and everything older is unreachable.
        let mut cursor = &mut *chain;
        loop {
            match cursor {
                None => break,
                Some(version) if settled(version.tx_expired) => {
                    *cursor = None;
                    break;
                }
                Some(version) => {
                    cursor = &mut version.next;
                }
            }
        }

        match chain.as_deref() {
            None => true,
            Some(head) => {
                head.next.is_none() && head.tombstone && settled_insert(head, gc_snapshot, clog)
            }
        }
    }
}

fn settled_insert<T>(version: &Version<T>, gc_snapshot: &Snapshot, clog: &CommitLog) -> bool {
    let horizon = match gc_snapshot.last() {
        Some(horizon) => horizon,
        None => return false,
    };
    clog.is_committed(version.tx_inserted)
        && !gc_snapshot.contains(version.tx_inserted)
        && version.tx_inserted < horizon
}
