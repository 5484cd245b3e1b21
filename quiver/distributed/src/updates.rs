//! The receiving half of distributed updates: buffers per-transaction
//! deltas for records this worker owns and applies them when the owning
//! transaction commits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use quiver_common::{Address, EdgeTypeId, Gid, LabelId, PropertyId, PropertyValue, TxnId};
use quiver_storage::{GraphStore, StateDelta, UpdateResult};
use tracing::debug;

use crate::messages::{RpcRequest, RpcResponse};

/// Deltas buffered for one transaction, per record in arrival order.
/// Deltas for different records are independent; per record the queue
/// replays in the order the owner emitted it.
#[derive(Debug, Default)]
struct TransactionUpdates {
    deltas: Mutex<HashMap<Gid, Vec<StateDelta>>>,
}

impl TransactionUpdates {
    fn emplace(&self, gid: Gid, delta: StateDelta) -> UpdateResult {
        // Conflicts are detected at apply time; detecting them here would
        // need record locking to be thread-safe within one transaction.
        self.deltas.lock().unwrap().entry(gid).or_default().push(delta);
        UpdateResult::Done
    }
}

/// One per worker: the buffered vertex and edge updates of every
/// transaction that touched a record owned here.
pub struct UpdatesServer {
    store: Arc<GraphStore>,
    vertex_updates: DashMap<TxnId, Arc<TransactionUpdates>>,
    edge_updates: DashMap<TxnId, Arc<TransactionUpdates>>,
}

impl UpdatesServer {
    pub fn new(store: Arc<GraphStore>) -> Self {
        UpdatesServer {
            store,
            vertex_updates: DashMap::new(),
            edge_updates: DashMap::new(),
        }
    }

    /// Handles one updates-related request; `None` means the request
    /// belongs to another subsystem.
    pub fn handle(&self, request: &RpcRequest) -> Option<RpcResponse> {
        Some(match request {
            RpcRequest::Update { delta } => RpcResponse::Update(self.update(delta)),
            RpcRequest::CreateVertex {
                tx_id,
                labels,
                properties,
            } => {
                let (result, gid) = self.create_vertex(*tx_id, labels, properties);
                RpcResponse::Create { result, gid }
            }
            RpcRequest::CreateEdge {
                tx_id,
                from,
                to,
                edge_type,
            } => {
                let (result, gid) = self.create_edge(*tx_id, *from, *to, *edge_type);
                RpcResponse::Create { result, gid }
            }
            RpcRequest::RemoveVertex {
                tx_id,
                gid,
                check_empty,
            } => RpcResponse::Update(self.updates_for(&self.vertex_updates, *tx_id).emplace(
                *gid,
                StateDelta::RemoveVertex {
                    tx_id: *tx_id,
                    gid: *gid,
                    check_empty: *check_empty,
                },
            )),
            RpcRequest::RemoveEdge {
                tx_id,
                gid,
                vertex_from,
                vertex_to,
            } => RpcResponse::Update(self.remove_edge(*tx_id, *gid, *vertex_from, *vertex_to)),
            RpcRequest::Apply { tx_id } => RpcResponse::Apply(self.apply(*tx_id)),
            RpcRequest::TransactionEnd { tx_id, committed } => {
                self.transaction_end(*tx_id, *committed);
                RpcResponse::TransactionEnd
            }
            RpcRequest::ClearTransactionalCache { oldest_active } => {
                self.clear_transactional_cache(*oldest_active);
                RpcResponse::ClearTransactionalCache
            }
            _ => return None,
        })
    }

    fn updates_for(
        &self,
        map: &DashMap<TxnId, Arc<TransactionUpdates>>,
        tx_id: TxnId,
    ) -> Arc<TransactionUpdates> {
        // Make sure the remote transaction exists locally so apply can run
        // under the owner's id.
        self.store.begin_remote(tx_id);
        Arc::clone(&map.entry(tx_id).or_default())
    }

    /// Routes a record-update delta to the vertex or edge buffer of its
    /// transaction.
    fn update(&self, delta: &StateDelta) -> UpdateResult {
        let tx_id = delta.tx_id();
        let Some(gid) = delta.gid() else {
            return UpdateResult::Done;
        };
        match delta {
            StateDelta::SetPropertyVertex { .. }
            | StateDelta::AddLabel { .. }
            | StateDelta::RemoveLabel { .. }
            | StateDelta::AddOutEdge { .. }
            | StateDelta::AddInEdge { .. }
            | StateDelta::RemoveOutEdge { .. }
            | StateDelta::RemoveInEdge { .. }
            | StateDelta::RemoveVertex { .. } => self
                .updates_for(&self.vertex_updates, tx_id)
                .emplace(gid, delta.clone()),
            StateDelta::SetPropertyEdge { .. } | StateDelta::RemoveEdge { .. } => self
                .updates_for(&self.edge_updates, tx_id)
                .emplace(gid, delta.clone()),
            _ => UpdateResult::Done,
        }
    }

    /// Creates the vertex eagerly (it is born on this worker) and returns
    /// the allocated gid; the creation needs no replay at apply time.
    fn create_vertex(
        &self,
        tx_id: TxnId,
        labels: &[LabelId],
        properties: &[(PropertyId, PropertyValue)],
    ) -> (UpdateResult, Option<Gid>) {
        let transaction = self.store.begin_remote(tx_id);
        let accessor = self.store.access(transaction);
        let result = (|| {
            let vertex = accessor.insert_vertex()?;
            for label in labels {
                vertex.add_label(*label)?;
            }
            for (property, value) in properties {
                vertex.set_property(*property, value.clone())?;
            }
            Ok::<Gid, quiver_storage::StorageError>(vertex.gid())
        })();
        match result {
            Ok(gid) => {
                self.updates_for(&self.vertex_updates, tx_id);
                (UpdateResult::Done, Some(gid))
            }
            Err(error) => (UpdateResult::from(&error), None),
        }
    }

    /// Creates the edge record (this worker owns `from`), buffers the
    /// out-edge delta, and the in-edge one too when `to` is also local.
    fn create_edge(
        &self,
        tx_id: TxnId,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    ) -> (UpdateResult, Option<Gid>) {
        let transaction = self.store.begin_remote(tx_id);
        let accessor = self.store.access(transaction);
        let edge = match accessor.insert_edge_record(from, to, edge_type) {
            Ok(edge) => edge,
            Err(error) => return (UpdateResult::from(&error), None),
        };
        let edge_address = Address::new(self.store.worker_id(), edge.gid());
        let result = self.updates_for(&self.vertex_updates, tx_id).emplace(
            from.gid,
            StateDelta::AddOutEdge {
                tx_id,
                gid: from.gid,
                to,
                edge_address,
                edge_type,
            },
        );
        if !result.is_done() {
            return (result, Some(edge.gid()));
        }
        if to.is_local_to(self.store.worker_id()) {
            let result = self.updates_for(&self.vertex_updates, tx_id).emplace(
                to.gid,
                StateDelta::AddInEdge {
                    tx_id,
                    gid: to.gid,
                    from,
                    edge_address,
                    edge_type,
                },
            );
            if !result.is_done() {
                return (result, Some(edge.gid()));
            }
        }
        (UpdateResult::Done, Some(edge.gid()))
    }

    /// Buffers the edge removal plus the out-edge unlink (always local to
    /// this worker) and the in-edge unlink when `to` lives here.
    fn remove_edge(
        &self,
        tx_id: TxnId,
        gid: Gid,
        vertex_from: Gid,
        vertex_to: Address,
    ) -> UpdateResult {
        let result = self
            .updates_for(&self.edge_updates, tx_id)
            .emplace(gid, StateDelta::RemoveEdge { tx_id, gid });
        if !result.is_done() {
            return result;
        }
        let edge_address = Address::new(self.store.worker_id(), gid);
        let result = self.updates_for(&self.vertex_updates, tx_id).emplace(
            vertex_from,
            StateDelta::RemoveOutEdge {
                tx_id,
                gid: vertex_from,
                edge_address,
            },
        );
        if !result.is_done() {
            return result;
        }
        if vertex_to.is_local_to(self.store.worker_id()) {
            return self.updates_for(&self.vertex_updates, tx_id).emplace(
                vertex_to.gid,
                StateDelta::RemoveInEdge {
                    tx_id,
                    gid: vertex_to.gid,
                    edge_address,
                },
            );
        }
        UpdateResult::Done
    }

    /// Applies every buffered delta under the owning transaction, in
    /// per-record arrival order. The first failure wins and the caller must
    /// abort the transaction cluster-wide.
    pub fn apply(&self, tx_id: TxnId) -> UpdateResult {
        let transaction = self.store.begin_remote(tx_id);
        let accessor = self.store.access(transaction);
        for map in [&self.vertex_updates, &self.edge_updates] {
            let Some((_, updates)) = map.remove(&tx_id) else {
                continue;
            };
            let deltas = updates.deltas.lock().unwrap();
            for (gid, queued) in deltas.iter() {
                // Re-resolve the record first: local activity may have
                // changed it since the deltas were buffered.
                match accessor.vertex_unchecked(*gid) {
                    Ok(vertex) => {
                        let _ = vertex.reconstruct();
                    }
                    Err(_) => {
                        if let Ok(edge) = accessor.edge_unchecked(*gid) {
                            let _ = edge.reconstruct();
                        }
                    }
                }
                for delta in queued {
                    if let Err(error) = accessor.apply_delta(delta) {
                        debug!(%error, tx_id, %gid, "buffered delta failed to apply");
                        return UpdateResult::from(&error);
                    }
                }
            }
        }
        UpdateResult::Done
    }

    /// Settles a remote transaction once its owner decided the outcome.
    pub fn transaction_end(&self, tx_id: TxnId, committed: bool) {
        self.vertex_updates.remove(&tx_id);
        self.edge_updates.remove(&tx_id);
        if let Ok(transaction) = self.store.engine().running_transaction(tx_id) {
            let result = if committed {
                self.store.commit(&transaction)
            } else {
                self.store.abort(&transaction)
            };
            if let Err(error) = result {
                debug!(%error, tx_id, "failed to settle remote transaction");
            }
        }
    }

    /// Drops buffered updates of transactions older than every active one.
    pub fn clear_transactional_cache(&self, oldest_active: TxnId) {
        self.vertex_updates.retain(|tx_id, _| *tx_id >= oldest_active);
        self.edge_updates.retain(|tx_id, _| *tx_id >= oldest_active);
    }
}
