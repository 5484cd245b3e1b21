//! One cluster member: the graph store, the buffered-updates server, the
//! registry and the RPC endpoint, wired together; plus the client side the
//! storage layer uses to reach records owned elsewhere.

use std::sync::Arc;

use dashmap::DashMap;
use quiver_common::{Address, EdgeTypeId, Gid, LabelId, PropertyId, PropertyValue, TxnId, WorkerId};
use quiver_storage::{GraphStore, RemoteUpdates, StateDelta, StorageError, StorageResult};
use tracing::info;

use crate::coordination::Coordination;
use crate::error::{RpcError, RpcResult};
use crate::messages::{RpcRequest, RpcResponse};
use crate::rpc::client::Client;
use crate::rpc::server::RpcServer;
use crate::updates::UpdatesServer;

const RPC_WORKERS: usize = 4;

/// Routes updates to owning workers over pooled RPC clients. Implements the
/// storage layer's [`RemoteUpdates`] seam, and carries the commit-side
/// orchestration (`apply`/`end`) the owning transaction drives.
pub struct UpdatesClients {
    coordination: Arc<Coordination>,
    clients: DashMap<WorkerId, Arc<Client>>,
}

impl UpdatesClients {
    pub fn new(coordination: Arc<Coordination>) -> Self {
        UpdatesClients {
            coordination,
            clients: DashMap::new(),
        }
    }

    fn client(&self, worker_id: WorkerId) -> RpcResult<Arc<Client>> {
        if let Some(client) = self.clients.get(&worker_id) {
            return Ok(Arc::clone(&client));
        }
        let endpoint = self.coordination.endpoint_of(worker_id)?;
        let client = Arc::new(Client::new(endpoint));
        self.clients.insert(worker_id, Arc::clone(&client));
        Ok(client)
    }

    fn call(&self, worker_id: WorkerId, request: &RpcRequest) -> RpcResult<RpcResponse> {
        self.client(worker_id)?.call(request)
    }

    pub fn create_vertex(
        &self,
        worker_id: WorkerId,
        tx_id: TxnId,
        labels: Vec<LabelId>,
        properties: Vec<(PropertyId, PropertyValue)>,
    ) -> StorageResult<Gid> {
        let response = self
            .call(
                worker_id,
                &RpcRequest::CreateVertex {
                    tx_id,
                    labels,
                    properties,
                },
            )
            .map_err(rpc_failure)?;
        match response {
            RpcResponse::Create { result, gid } => {
                result.into_result(Gid::new(worker_id, 0))?;
                gid.ok_or_else(|| StorageError::RemoteUpdate("creation returned no gid".into()))
            }
            _ => Err(rpc_failure(RpcError::UnexpectedResponse("CreateVertex"))),
        }
    }

    /// Creates an edge between vertices owned by (possibly) different
    /// workers: the record is created on `from`'s owner, and `to`'s owner
    /// buffers the in-edge delta when it is a third party.
    pub fn create_edge(
        &self,
        tx_id: TxnId,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    ) -> StorageResult<Gid> {
        let response = self
            .call(
                from.worker_id,
                &RpcRequest::CreateEdge {
                    tx_id,
                    from,
                    to,
                    edge_type,
                },
            )
            .map_err(rpc_failure)?;
        let gid = match response {
            RpcResponse::Create { result, gid } => {
                result.into_result(from.gid)?;
                gid.ok_or_else(|| StorageError::RemoteUpdate("creation returned no gid".into()))?
            }
            _ => return Err(rpc_failure(RpcError::UnexpectedResponse("CreateEdge"))),
        };
        if to.worker_id != from.worker_id {
            let edge_address = Address::new(from.worker_id, gid);
            self.update(
                to.worker_id,
                StateDelta::AddInEdge {
                    tx_id,
                    gid: to.gid,
                    from,
                    edge_address,
                    edge_type,
                },
            )?;
        }
        Ok(gid)
    }

    pub fn remove_vertex(
        &self,
        tx_id: TxnId,
        vertex: Address,
        check_empty: bool,
    ) -> StorageResult<()> {
        let response = self
            .call(
                vertex.worker_id,
                &RpcRequest::RemoveVertex {
                    tx_id,
                    gid: vertex.gid,
                    check_empty,
                },
            )
            .map_err(rpc_failure)?;
        match response {
            RpcResponse::Update(result) => result.into_result(vertex.gid),
            _ => Err(rpc_failure(RpcError::UnexpectedResponse("RemoveVertex"))),
        }
    }

    /// Applies the transaction's buffered deltas on every worker. The first
    /// failing worker aborts the whole transaction; the caller must then
    /// end it cluster-wide as aborted.
    pub fn apply_all(&self, tx_id: TxnId) -> StorageResult<()> {
        for (worker_id, _) in self.coordination.workers() {
            if worker_id == self.coordination.worker_id() {
                continue;
            }
            let response = self
                .call(worker_id, &RpcRequest::Apply { tx_id })
                .map_err(rpc_failure)?;
            match response {
                RpcResponse::Apply(result) => result.into_result(Gid::new(worker_id, 0))?,
                _ => return Err(rpc_failure(RpcError::UnexpectedResponse("Apply"))),
            }
        }
        Ok(())
    }

    /// Propagates the owner's commit/abort decision to every worker.
    pub fn end_all(&self, tx_id: TxnId, committed: bool) -> StorageResult<()> {
        for (worker_id, _) in self.coordination.workers() {
            if worker_id == self.coordination.worker_id() {
                continue;
            }
            self.call(worker_id, &RpcRequest::TransactionEnd { tx_id, committed })
                .map_err(rpc_failure)?;
        }
        Ok(())
    }

    pub fn clear_transactional_cache(&self, oldest_active: TxnId) {
        for (worker_id, _) in self.coordination.workers() {
            if worker_id == self.coordination.worker_id() {
                continue;
            }
            let _ = self.call(
                worker_id,
                &RpcRequest::ClearTransactionalCache { oldest_active },
            );
        }
    }
}

fn rpc_failure(error: RpcError) -> StorageError {
    StorageError::RemoteUpdate(error.to_string())
}

impl RemoteUpdates for UpdatesClients {
    fn update(&self, worker_id: WorkerId, delta: StateDelta) -> StorageResult<()> {
        let gid = delta.gid().unwrap_or(Gid::new(worker_id.max(0), 0));
        let response = self
            .call(worker_id, &RpcRequest::Update { delta })
            .map_err(rpc_failure)?;
        match response {
            RpcResponse::Update(result) => result.into_result(gid),
            _ => Err(rpc_failure(RpcError::UnexpectedResponse("Update"))),
        }
    }
}

/// A running cluster member: its store, updates server and RPC endpoint.
pub struct Worker {
    store: Arc<GraphStore>,
    updates: Arc<UpdatesServer>,
    coordination: Arc<Coordination>,
    clients: Arc<UpdatesClients>,
    server: RpcServer,
}

struct Dispatcher {
    updates: Arc<UpdatesServer>,
    // Filled right after the server binds; the endpoint (and with it the
    // registry and shutdown flag) only exists once the port is known.
    coordination: std::sync::OnceLock<Arc<Coordination>>,
    alive: std::sync::OnceLock<Arc<std::sync::atomic::AtomicBool>>,
}

impl Dispatcher {
    fn coordination(&self) -> &Arc<Coordination> {
        loop {
            if let Some(coordination) = self.coordination.get() {
                return coordination;
            }
            std::thread::yield_now();
        }
    }
}

impl crate::rpc::server::RequestHandler for Dispatcher {
    fn handle(&self, request: RpcRequest) -> RpcResponse {
        if let Some(response) = self.updates.handle(&request) {
            return response;
        }
        if let Some(response) = self.coordination().handle(&request) {
            return response;
        }
        match request {
            RpcRequest::StopWorker => {
                info!("stop requested over RPC");
                if let Some(alive) = self.alive.get() {
                    alive.store(false, std::sync::atomic::Ordering::Release);
                }
                RpcResponse::StopWorker
            }
            _ => unreachable!("every request kind has a handler"),
        }
    }
}

impl Worker {
    /// Binds the RPC server on `address` and wires the update coordinator
    /// into the store's remote seam.
    pub fn spawn(store: Arc<GraphStore>, address: &str) -> std::io::Result<Worker> {
        let updates = Arc::new(UpdatesServer::new(Arc::clone(&store)));
        let dispatcher = Arc::new(Dispatcher {
            updates: Arc::clone(&updates),
            coordination: std::sync::OnceLock::new(),
            alive: std::sync::OnceLock::new(),
        });
        let server = RpcServer::bind(address, RPC_WORKERS, Arc::clone(&dispatcher))?;

        let coordination = Arc::new(Coordination::new(store.worker_id(), server.endpoint()));
        let clients = Arc::new(UpdatesClients::new(Arc::clone(&coordination)));
        store.set_remote_updates(Arc::clone(&clients) as Arc<dyn RemoteUpdates>);
        let _ = dispatcher.coordination.set(Arc::clone(&coordination));
        let _ = dispatcher.alive.set(server.shutdown_flag());

        Ok(Worker {
            store,
            updates,
            coordination,
            clients,
            server,
        })
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn updates(&self) -> &Arc<UpdatesServer> {
        &self.updates
    }

    pub fn clients(&self) -> &Arc<UpdatesClients> {
        &self.clients
    }

    pub fn coordination(&self) -> &Arc<Coordination> {
        &self.coordination
    }

    pub fn endpoint(&self) -> String {
        self.server.endpoint()
    }

    /// Joins an existing cluster through its master.
    pub fn register_with(&self, master_endpoint: &str) -> RpcResult<()> {
        let client = Client::new(master_endpoint);
        let response = client.call(&RpcRequest::RegisterWorker {
            desired_id: self.store.worker_id(),
            endpoint: self.endpoint(),
        })?;
        match response {
            RpcResponse::Register { workers, .. } => {
                for (worker_id, endpoint) in workers {
                    self.coordination.add_worker(worker_id, endpoint);
                }
                Ok(())
            }
            _ => Err(RpcError::UnexpectedResponse("RegisterWorker")),
        }
    }

    pub fn shutdown(&mut self) {
        self.server.shutdown();
    }
}
