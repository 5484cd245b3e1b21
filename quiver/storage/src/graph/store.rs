use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use quiver_common::{Gid, LabelId, PropertyId, Scheduler, TxnId, WorkerId};
use quiver_transaction::{Engine, Transaction};
use smol_str::SmolStr;
use tracing::debug;

use super::accessor::GraphAccessor;
use super::RemoteUpdates;
use crate::config::DatabaseConfig;
use crate::delta::StateDelta;
use crate::error::{StorageError, StorageResult};
use crate::indexes::{LabelIndex, LabelPropertyIndex};
use crate::model::{Edge, Vertex};
use crate::mvcc::{LockStore, VersionList};
use crate::wal::{recovery, Wal};

/// Interns names to dense ids and back. Shared shape for labels, property
/// keys and edge types.
#[derive(Debug, Default)]
pub(crate) struct NameTable {
    by_name: DashMap<SmolStr, u32>,
    by_id: DashMap<u32, SmolStr>,
    counter: AtomicU32,
}

impl NameTable {
    /// Returns the id for `name`, allocating one on first use. Ids start at
    /// 1 so they fit `NonZeroU32` label ids.
    pub fn intern(&self, name: &str) -> u32 {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        *self
            .by_name
            .entry(SmolStr::new(name))
            .or_insert_with(|| {
                let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                self.by_id.insert(id, SmolStr::new(name));
                id
            })
    }

    pub fn name(&self, id: u32) -> Option<SmolStr> {
        self.by_id.get(&id).map(|entry| entry.clone())
    }
}

/// One worker's shard of the graph: the MVCC record stores, the lock store,
/// the indexes, the WAL and the transaction engine, plus the interning
/// tables shared by the planner and executor.
pub struct GraphStore {
    pub(crate) worker_id: WorkerId,
    pub(crate) config: DatabaseConfig,
    pub(crate) engine: Arc<Engine>,
    pub(crate) vertices: DashMap<Gid, Arc<VersionList<Vertex>>>,
    pub(crate) edges: DashMap<Gid, Arc<VersionList<Edge>>>,
    pub(crate) lock_store: LockStore,
    pub(crate) label_index: LabelIndex,
    pub(crate) label_property_index: LabelPropertyIndex,
    pub(crate) wal: Wal,
    pub(crate) labels: NameTable,
    pub(crate) properties: NameTable,
    pub(crate) edge_types: NameTable,
    vertex_counter: AtomicU64,
    edge_counter: AtomicU64,
    pub(crate) remote: RwLock<Option<Arc<dyn RemoteUpdates>>>,
    background: Mutex<Vec<Scheduler>>,
}

impl GraphStore {
    /// Creates an empty store without touching any prior durability state.
    pub fn fresh(worker_id: WorkerId, config: DatabaseConfig) -> StorageResult<Arc<Self>> {
        let wal = Wal::new(&config)?;
        Ok(Arc::new(GraphStore {
            worker_id,
            lock_store: LockStore::new(Duration::from_millis(config.lock_timeout_ms)),
            config,
            // Transaction ids share the gid encoding so the id spaces of
            // different workers never overlap.
            engine: Arc::new(Engine::with_start(Gid::new(worker_id, 0).raw())),
            vertices: DashMap::new(),
            edges: DashMap::new(),
            label_index: LabelIndex::new(),
            label_property_index: LabelPropertyIndex::new(),
            wal,
            labels: NameTable::default(),
            properties: NameTable::default(),
            edge_types: NameTable::default(),
            vertex_counter: AtomicU64::new(0),
            edge_counter: AtomicU64::new(0),
            remote: RwLock::new(None),
            background: Mutex::new(Vec::new()),
        }))
    }

    /// Creates a store and replays the WAL found in the durability
    /// directory, then starts the background flusher and garbage collector.
    pub fn recovered(worker_id: WorkerId, config: DatabaseConfig) -> StorageResult<Arc<Self>> {
        let store = Self::fresh(worker_id, config)?;
        recovery::recover(&store)?;
        store.start_background_tasks();
        Ok(store)
    }

    /// Spawns the periodic WAL flusher and garbage collector.
    pub fn start_background_tasks(self: &Arc<Self>) {
        let mut background = self.background.lock().unwrap();
        if !background.is_empty() {
            return;
        }
        if self.config.durability_enabled {
            let store = Arc::clone(self);
            background.push(Scheduler::run(
                "wal-flusher",
                Duration::from_millis(self.config.wal_flush_interval_ms.max(1)),
                move || {
                    let _ = store.wal.flush();
                },
            ));
        }
        let store = Arc::clone(self);
        background.push(Scheduler::run(
            "storage-gc",
            Duration::from_millis(500),
            move || store.collect_garbage(),
        ));
    }

    pub fn stop_background_tasks(&self) {
        self.background.lock().unwrap().clear();
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    /// Wires the distributed update coordinator in; mutations that target
    /// remote records route their deltas through it from now on.
    pub fn set_remote_updates(&self, remote: Arc<dyn RemoteUpdates>) {
        *self.remote.write().unwrap() = Some(remote);
    }

    // ===== Transaction lifecycle =====

    pub fn begin(self: &Arc<Self>) -> StorageResult<Arc<Transaction>> {
        let transaction = self.engine.begin();
        self.wal.emplace(&StateDelta::TransactionBegin {
            tx_id: transaction.id(),
        })?;
        Ok(transaction)
    }

    /// Registers a transaction owned by a remote worker so buffered deltas
    /// can apply under the owner's id (no begin delta: the owner's WAL has
    /// it).
    pub fn begin_remote(&self, tx_id: TxnId) -> Arc<Transaction> {
        self.engine.begin_remote(tx_id, self.engine.global_active())
    }

    pub fn commit(&self, transaction: &Transaction) -> StorageResult<()> {
        if transaction.should_abort() {
            let id = transaction.id();
            self.abort(transaction)?;
            return Err(StorageError::Wounded(id));
        }
        self.wal.emplace(&StateDelta::TransactionCommit {
            tx_id: transaction.id(),
        })?;
        self.engine.commit(transaction)?;
        self.lock_store.release_all(transaction.id());
        Ok(())
    }

    pub fn abort(&self, transaction: &Transaction) -> StorageResult<()> {
        // Even a poisoned WAL must not stop the rollback itself.
        let _ = self.wal.emplace(&StateDelta::TransactionAbort {
            tx_id: transaction.id(),
        });
        self.engine.abort(transaction)?;
        self.lock_store.release_all(transaction.id());
        Ok(())
    }

    /// A typed view over this store bound to one transaction.
    pub fn access(self: &Arc<Self>, transaction: Arc<Transaction>) -> GraphAccessor {
        GraphAccessor::new(Arc::clone(self), transaction)
    }

    // ===== Gid allocation =====

    pub(crate) fn next_vertex_gid(&self) -> Gid {
        Gid::new(
            self.worker_id,
            self.vertex_counter.fetch_add(1, Ordering::SeqCst) + 1,
        )
    }

    pub(crate) fn next_edge_gid(&self) -> Gid {
        Gid::new(
            self.worker_id,
            self.edge_counter.fetch_add(1, Ordering::SeqCst) + 1,
        )
    }

    /// Keeps the local allocator ahead of externally supplied gids
    /// (recovery replay).
    pub(crate) fn note_vertex_gid(&self, gid: Gid) {
        self.vertex_counter.fetch_max(gid.local_id(), Ordering::SeqCst);
    }

    pub(crate) fn note_edge_gid(&self, gid: Gid) {
        self.edge_counter.fetch_max(gid.local_id(), Ordering::SeqCst);
    }

    // ===== Cardinality statistics =====

    pub fn vertices_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices_count_by_label(&self, label: LabelId) -> usize {
        self.label_index.count(label)
    }

    pub fn vertices_count_by_label_property(&self, label: LabelId, property: PropertyId) -> usize {
        self.label_property_index.count(label, property)
    }

    pub fn label_property_index_exists(&self, label: LabelId, property: PropertyId) -> bool {
        self.label_property_index.exists(label, property)
    }

    // ===== Garbage collection =====

    /// One pass of version-chain pruning, dead-record reclamation, index
    /// cleanup and commit-log truncation.
    pub fn collect_garbage(&self) {
        let snapshot = self.engine.gc_snapshot();
        let clog = self.engine.clog();

        let mut dead_vertices = Vec::new();
        for entry in self.vertices.iter() {
            if entry.value().gc(&snapshot, clog) {
                dead_vertices.push(*entry.key());
            }
        }
        let mut dead_edges = Vec::new();
        for entry in self.edges.iter() {
            if entry.value().gc(&snapshot, clog) {
                dead_edges.push(*entry.key());
            }
        }
        let reclaimed = (dead_vertices.len(), dead_edges.len());
        for gid in dead_vertices {
            self.vertices.remove(&gid);
        }
        for gid in dead_edges {
            self.edges.remove(&gid);
        }

        // Stale index entries: records that are gone, or whose settled
        // state no longer matches the entry. Unsettled records keep their
        // entries since some snapshot may still need them.
        self.label_index.retain(|label, gid| match self.vertices.get(&gid) {
            None => false,
            Some(vlist) => vlist
                .settled(&snapshot, clog)
                .map(|vertex| vertex.has_label(label))
                .unwrap_or(true),
        });
        self.label_property_index
            .retain(|label, property, value, gid| match self.vertices.get(&gid) {
                None => false,
                Some(vlist) => vlist
                    .settled(&snapshot, clog)
                    .map(|vertex| {
                        vertex.has_label(label) && vertex.property(property) == Some(value)
                    })
                    .unwrap_or(true),
            });

        if let Some(oldest) = snapshot.first() {
            clog.truncate_below(oldest);
        }
        if reclaimed != (0, 0) {
            debug!(vertices = reclaimed.0, edges = reclaimed.1, "garbage collection pass");
        }
    }
}
