//! The worker-to-worker message surface. Everything crossing the wire is a
//! value; addresses are `(worker_id, gid)` pairs and never pointers.

use quiver_common::{Address, EdgeTypeId, Gid, LabelId, PropertyId, PropertyValue, TxnId, WorkerId};
use quiver_storage::{StateDelta, UpdateResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Buffer one record-update delta on the worker owning the target.
    Update { delta: StateDelta },
    /// Create a vertex on the receiving worker and return its gid.
    CreateVertex {
        tx_id: TxnId,
        labels: Vec<LabelId>,
        properties: Vec<(PropertyId, PropertyValue)>,
    },
    /// Create an edge on the receiving worker (which owns `from`); the
    /// caller separately notifies `to`'s owner when it is a third worker.
    CreateEdge {
        tx_id: TxnId,
        from: Address,
        to: Address,
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
        vertex_from: Gid,
        vertex_to: Address,
    },
    /// Apply every delta buffered for the transaction on this worker.
    Apply { tx_id: TxnId },
    /// Settle a remote transaction after the owner decided its fate.
    TransactionEnd { tx_id: TxnId, committed: bool },
    /// Evict buffered updates of transactions no active one can reference.
    ClearTransactionalCache { oldest_active: TxnId },
    RegisterWorker {
        desired_id: WorkerId,
        endpoint: String,
    },
    ClusterDiscovery {
        worker_id: WorkerId,
        endpoint: String,
    },
    StopWorker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcResponse {
    Update(UpdateResult),
    Create {
        result: UpdateResult,
        gid: Option<Gid>,
    },
    Apply(UpdateResult),
    TransactionEnd,
    ClearTransactionalCache,
    Register {
        registration_successful: bool,
        worker_id: WorkerId,
        workers: Vec<(WorkerId, String)>,
    },
    ClusterDiscovery,
    StopWorker,
}
