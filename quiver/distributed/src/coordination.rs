//! Cluster membership. The master assigns worker ids and fans new members
//! out to everyone already registered; workers keep a local copy of the
//! registry for routing.

use std::sync::atomic::{AtomicI32, Ordering};

use dashmap::DashMap;
use quiver_common::WorkerId;
use tracing::info;

use crate::error::{RpcError, RpcResult};
use crate::messages::{RpcRequest, RpcResponse};
use crate::rpc::client::Client;

pub const MASTER_WORKER_ID: WorkerId = 0;

/// Worker registry shared by the master and every worker. On the master it
/// also allocates ids and drives discovery fan-out.
pub struct Coordination {
    worker_id: WorkerId,
    workers: DashMap<WorkerId, String>,
    next_id: AtomicI32,
}

impl Coordination {
    pub fn new(worker_id: WorkerId, endpoint: String) -> Self {
        let workers = DashMap::new();
        workers.insert(worker_id, endpoint);
        Coordination {
            worker_id,
            workers,
            next_id: AtomicI32::new(1),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn endpoint_of(&self, worker_id: WorkerId) -> RpcResult<String> {
        self.workers
            .get(&worker_id)
            .map(|entry| entry.clone())
            .ok_or(RpcError::UnknownWorker(worker_id))
    }

    pub fn workers(&self) -> Vec<(WorkerId, String)> {
        self.workers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn add_worker(&self, worker_id: WorkerId, endpoint: String) {
        self.workers.insert(worker_id, endpoint);
    }

    /// Master-side registration: honors the desired id when it is free,
    /// otherwise allocates the next one, then tells every existing worker
    /// about the newcomer.
    pub fn register_worker(&self, desired_id: WorkerId, endpoint: String) -> RpcResponse {
        let assigned = if desired_id > 0 && !self.workers.contains_key(&desired_id) {
            desired_id
        } else {
            loop {
                let candidate = self.next_id.fetch_add(1, Ordering::SeqCst);
                if !self.workers.contains_key(&candidate) {
                    break candidate;
                }
            }
        };
        let registration_successful = desired_id <= 0 || assigned == desired_id;
        info!(worker_id = assigned, %endpoint, "registered worker");

        // Fan the newcomer out to everyone already in the cluster.
        for entry in self.workers.iter() {
            if *entry.key() == self.worker_id {
                continue;
            }
            let client = Client::new(entry.value().clone());
            let _ = client.call(&RpcRequest::ClusterDiscovery {
                worker_id: assigned,
                endpoint: endpoint.clone(),
            });
        }
        self.workers.insert(assigned, endpoint);

        RpcResponse::Register {
            registration_successful,
            worker_id: assigned,
            workers: self.workers(),
        }
    }

    /// Handles the coordination subset of the RPC surface.
    pub fn handle(&self, request: &RpcRequest) -> Option<RpcResponse> {
        match request {
            RpcRequest::RegisterWorker {
                desired_id,
                endpoint,
            } => Some(self.register_worker(*desired_id, endpoint.clone())),
            RpcRequest::ClusterDiscovery {
                worker_id,
                endpoint,
            } => {
                self.add_worker(*worker_id, endpoint.clone());
                Some(RpcResponse::ClusterDiscovery)
            }
            _ => None,
        }
    }
}
