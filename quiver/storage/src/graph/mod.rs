pub mod accessor;
pub mod store;

use quiver_common::WorkerId;

use crate::delta::StateDelta;
use crate::error::StorageResult;

/// Seam between the storage engine and the distributed update coordinator.
///
/// The graph accessor calls this when a structural mutation targets a record
/// owned by another worker; the distributed crate implements it on top of
/// the updates RPC client, buffering the delta on the owning worker until
/// the transaction applies at commit. Transport failures surface as
/// [`crate::StorageError::RemoteUpdate`] and abort the transaction.
pub trait RemoteUpdates: Send + Sync {
    fn update(&self, worker_id: WorkerId, delta: StateDelta) -> StorageResult<()>;
}
