use quiver_common::{Address, EdgeTypeId, Gid, LabelId, PropertyId, PropertyValue, TxnId};
use serde::{Deserialize, Serialize};

/// One tagged logical change made by a transaction: the unit of both the
/// write-ahead log and cross-worker replication.
///
/// `CreateVertex` carries only the gid; initial labels and properties are
/// recorded by the `AddLabel`/`SetPropertyVertex` deltas that follow it, so
/// replay never needs a second payload encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateDelta {
    TransactionBegin {
        tx_id: TxnId,
    },
    TransactionCommit {
        tx_id: TxnId,
    },
    TransactionAbort {
        tx_id: TxnId,
    },
    CreateVertex {
        tx_id: TxnId,
        gid: Gid,
    },
    CreateEdge {
        tx_id: TxnId,
        gid: Gid,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    },
    SetPropertyVertex {
        tx_id: TxnId,
        gid: Gid,
        property: PropertyId,
        value: PropertyValue,
    },
    SetPropertyEdge {
        tx_id: TxnId,
        gid: Gid,
        property: PropertyId,
        value: PropertyValue,
    },
    AddLabel {
        tx_id: TxnId,
        gid: Gid,
        label: LabelId,
    },
    RemoveLabel {
        tx_id: TxnId,
        gid: Gid,
        label: LabelId,
    },
    AddOutEdge {
        tx_id: TxnId,
        gid: Gid,
        to: Address,
        edge_address: Address,
        edge_type: EdgeTypeId,
    },
    AddInEdge {
        tx_id: TxnId,
        gid: Gid,
        from: Address,
        edge_address: Address,
        edge_type: EdgeTypeId,
    },
    RemoveVertex {
        tx_id: TxnId,
        gid: Gid,
        check_empty: bool,
    },
    RemoveEdge {
        tx_id: TxnId,
        gid: Gid,
    },
    RemoveOutEdge {
        tx_id: TxnId,
        gid: Gid,
        edge_address: Address,
    },
    RemoveInEdge {
        tx_id: TxnId,
        gid: Gid,
        edge_address: Address,
    },
    BuildIndex {
        tx_id: TxnId,
        label: LabelId,
        property: PropertyId,
    },
}

impl StateDelta {
    pub fn tx_id(&self) -> TxnId {
        match self {
            StateDelta::TransactionBegin { tx_id }
            | StateDelta::TransactionCommit { tx_id }
            | StateDelta::TransactionAbort { tx_id }
            | StateDelta::CreateVertex { tx_id, .. }
            | StateDelta::CreateEdge { tx_id, .. }
            | StateDelta::SetPropertyVertex { tx_id, .. }
            | StateDelta::SetPropertyEdge { tx_id, .. }
            | StateDelta::AddLabel { tx_id, .. }
            | StateDelta::RemoveLabel { tx_id, .. }
            | StateDelta::AddOutEdge { tx_id, .. }
            | StateDelta::AddInEdge { tx_id, .. }
            | StateDelta::RemoveVertex { tx_id, .. }
            | StateDelta::RemoveEdge { tx_id, .. }
            | StateDelta::RemoveOutEdge { tx_id, .. }
            | StateDelta::RemoveInEdge { tx_id, .. }
            | StateDelta::BuildIndex { tx_id, .. } => *tx_id,
        }
    }

    /// Whether this delta ends its transaction; synchronous-commit mode
    /// flushes the log before acknowledging one of these.
    pub fn is_transaction_end(&self) -> bool {
        matches!(
            self,
            StateDelta::TransactionCommit { .. } | StateDelta::TransactionAbort { .. }
        )
    }

    /// The record the delta targets, if any.
    pub fn gid(&self) -> Option<Gid> {
        match self {
            StateDelta::TransactionBegin { .. }
            | StateDelta::TransactionCommit { .. }
            | StateDelta::TransactionAbort { .. }
            | StateDelta::BuildIndex { .. } => None,
            StateDelta::CreateVertex { gid, .. }
            | StateDelta::CreateEdge { gid, .. }
            | StateDelta::SetPropertyVertex { gid, .. }
            | StateDelta::SetPropertyEdge { gid, .. }
            | StateDelta::AddLabel { gid, .. }
            | StateDelta::RemoveLabel { gid, .. }
            | StateDelta::AddOutEdge { gid, .. }
            | StateDelta::AddInEdge { gid, .. }
            | StateDelta::RemoveVertex { gid, .. }
            | StateDelta::RemoveEdge { gid, .. }
            | StateDelta::RemoveOutEdge { gid, .. }
            | StateDelta::RemoveInEdge { gid, .. } => Some(*gid),
        }
    }
}

/// Outcome of buffering or applying one delta on the worker that owns the
/// record. Mirrors the storage error kinds that can surface across the RPC
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateResult {
    Done,
    SerializationError,
    LockTimeout,
    RecordDeleted,
    UnableToDeleteVertex,
    NotFound,
}

impl UpdateResult {
    pub fn is_done(&self) -> bool {
        matches!(self, UpdateResult::Done)
    }

    /// Converts back into the storage error it stands for, attributed to
    /// `gid`.
    pub fn into_result(self, gid: Gid) -> crate::error::StorageResult<()> {
        use crate::error::StorageError;
        match self {
            UpdateResult::Done => Ok(()),
            UpdateResult::SerializationError => Err(StorageError::Serialization(gid)),
            UpdateResult::LockTimeout => Err(StorageError::LockTimeout(gid)),
            UpdateResult::RecordDeleted => Err(StorageError::RecordDeleted(gid)),
            UpdateResult::UnableToDeleteVertex => Err(StorageError::UnableToDeleteVertex(gid)),
            UpdateResult::NotFound => Err(StorageError::NotFound(gid)),
        }
    }
}

impl From<&crate::error::StorageError> for UpdateResult {
    fn from(error: &crate::error::StorageError) -> Self {
        use crate::error::StorageError;
        match error {
            StorageError::Serialization(_) => UpdateResult::SerializationError,
            StorageError::LockTimeout(_) => UpdateResult::LockTimeout,
            StorageError::RecordDeleted(_) => UpdateResult::RecordDeleted,
            StorageError::UnableToDeleteVertex(_) => UpdateResult::UnableToDeleteVertex,
            StorageError::NotFound(_) => UpdateResult::NotFound,
            _ => UpdateResult::SerializationError,
        }
    }
}

#[cfg(test)]
mod tests {
    use quiver_common::PropertyValue;

    use super::*;

    #[test]
    fn encode_then_decode_preserves_all_fields() {
        let deltas = vec![
            StateDelta::TransactionBegin { tx_id: 7 },
            StateDelta::CreateEdge {
                tx_id: 7,
                gid: Gid::new(1, 3),
                from: Address::from(Gid::new(1, 1)),
                to: Address::from(Gid::new(2, 9)),
                edge_type: 4,
            },
            StateDelta::SetPropertyVertex {
                tx_id: 7,
                gid: Gid::new(1, 1),
                property: 2,
                value: PropertyValue::from("hello"),
            },
            StateDelta::RemoveVertex {
                tx_id: 7,
                gid: Gid::new(1, 1),
                check_empty: true,
            },
            StateDelta::TransactionCommit { tx_id: 7 },
        ];
        for delta in deltas {
            let bytes = postcard::to_allocvec(&delta).unwrap();
            let decoded: StateDelta = postcard::from_bytes(&bytes).unwrap();
            assert_eq!(decoded, delta);
        }
    }

    #[test]
    fn transaction_end_detection() {
        assert!(StateDelta::TransactionCommit { tx_id: 1 }.is_transaction_end());
        assert!(StateDelta::TransactionAbort { tx_id: 1 }.is_transaction_end());
        assert!(!StateDelta::TransactionBegin { tx_id: 1 }.is_transaction_end());
        assert!(!StateDelta::CreateVertex {
            tx_id: 1,
            gid: Gid::new(0, 0)
        }
        .is_transaction_end());
    }
}
