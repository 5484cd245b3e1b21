use quiver_common::TxnId;
use serde::{Deserialize, Serialize};

/// The set of transaction ids that were active at some instant, kept sorted
/// so that membership checks are a binary search and the minimum is the
/// first element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot(Vec<TxnId>);

impl Snapshot {
    pub fn new() -> Self {
        Snapshot(Vec::new())
    }

    pub fn contains(&self, id: TxnId) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    pub fn insert(&mut self, id: TxnId) {
        if let Err(position) = self.0.binary_search(&id) {
            self.0.insert(position, id);
        }
    }

    pub fn remove(&mut self, id: TxnId) {
        if let Ok(position) = self.0.binary_search(&id) {
            self.0.remove(position);
        }
    }

    pub fn first(&self) -> Option<TxnId> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<TxnId> {
        self.0.last().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TxnId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<TxnId> for Snapshot {
    fn from_iter<I: IntoIterator<Item = TxnId>>(iter: I) -> Self {
        let mut ids: Vec<TxnId> = iter.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Snapshot(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_dedups() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(5);
        snapshot.insert(2);
        snapshot.insert(5);
        snapshot.insert(9);
        assert_eq!(snapshot.iter().collect::<Vec<_>>(), vec![2, 5, 9]);
        assert_eq!(snapshot.first(), Some(2));
        assert!(snapshot.contains(5));
        snapshot.remove(5);
        assert!(!snapshot.contains(5));
    }
}
