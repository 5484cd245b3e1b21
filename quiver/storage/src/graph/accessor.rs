use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;

use quiver_common::{
    Address, EdgeTypeId, Gid, IndexOrd, LabelId, PropertyId, PropertyValue, TxnId, WorkerId,
};
use quiver_transaction::Transaction;
use smol_str::SmolStr;

use super::store::GraphStore;
use crate::delta::StateDelta;
use crate::error::{StorageError, StorageResult};
use crate::indexes::ScanBound;
use crate::model::{Edge, EdgeEntry, Vertex};
use crate::mvcc::{RecordKind, VersionList};

/// A typed view over one worker's graph bound to a single transaction.
///
/// Every mutation goes through the record-lock store and the MVCC version
/// lists, emits its [`StateDelta`] into the WAL, and routes deltas that
/// target records owned by another worker through the distributed update
/// coordinator.
pub struct GraphAccessor {
    store: Arc<GraphStore>,
    transaction: Arc<Transaction>,
}

impl GraphAccessor {
    pub(crate) fn new(store: Arc<GraphStore>, transaction: Arc<Transaction>) -> Self {
        GraphAccessor { store, transaction }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }

    pub fn tx_id(&self) -> TxnId {
        self.transaction.id()
    }

    pub fn worker_id(&self) -> WorkerId {
        self.store.worker_id()
    }

    // ===== Name interning =====

    pub fn label_id(&self, name: &str) -> LabelId {
        NonZeroU32::new(self.store.labels.intern(name)).unwrap()
    }

    pub fn label_name(&self, label: LabelId) -> SmolStr {
        self.store.labels.name(label.get()).unwrap_or_default()
    }

    pub fn property_id(&self, name: &str) -> PropertyId {
        self.store.properties.intern(name)
    }

    pub fn property_name(&self, property: PropertyId) -> SmolStr {
        self.store.properties.name(property).unwrap_or_default()
    }

    pub fn edge_type_id(&self, name: &str) -> EdgeTypeId {
        self.store.edge_types.intern(name)
    }

    pub fn edge_type_name(&self, edge_type: EdgeTypeId) -> SmolStr {
        self.store.edge_types.name(edge_type).unwrap_or_default()
    }

    // ===== Record lookup and creation =====

    /// Finds the vertex visible to this transaction.
    pub fn find_vertex(&self, gid: Gid) -> StorageResult<VertexAccessor> {
        let accessor = self.vertex_unchecked(gid)?;
        accessor.current()?;
        Ok(accessor)
    }

    /// Binds an accessor without a visibility check; callers that apply
    /// buffered deltas reconstruct before use.
    pub fn vertex_unchecked(&self, gid: Gid) -> StorageResult<VertexAccessor> {
        let vlist = self
            .store
            .vertices
            .get(&gid)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StorageError::NotFound(gid))?;
        Ok(VertexAccessor {
            store: Arc::clone(&self.store),
            transaction: Arc::clone(&self.transaction),
            gid,
            vlist,
        })
    }

    pub fn find_edge(&self, gid: Gid) -> StorageResult<EdgeAccessor> {
        let accessor = self.edge_unchecked(gid)?;
        accessor.current()?;
        Ok(accessor)
    }

    pub fn edge_unchecked(&self, gid: Gid) -> StorageResult<EdgeAccessor> {
        let vlist = self
            .store
            .edges
            .get(&gid)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StorageError::NotFound(gid))?;
        Ok(EdgeAccessor {
            store: Arc::clone(&self.store),
            transaction: Arc::clone(&self.transaction),
            gid,
            vlist,
        })
    }

    /// Creates a vertex owned by this worker.
    pub fn insert_vertex(&self) -> StorageResult<VertexAccessor> {
        let gid = self.store.next_vertex_gid();
        self.insert_vertex_at(gid)
    }

    /// Creates a vertex with an externally supplied gid (recovery replay and
    /// remote creation).
    pub fn insert_vertex_at(&self, gid: Gid) -> StorageResult<VertexAccessor> {
        let vlist = Arc::new(VersionList::new(gid, Vertex::new(), &self.transaction));
        self.store.vertices.insert(gid, Arc::clone(&vlist));
        self.store.note_vertex_gid(gid);
        self.store.lock_store.acquire(
            RecordKind::Vertex,
            gid,
            &self.transaction,
            &self.store.engine,
        )?;
        self.store.wal.emplace(&StateDelta::CreateVertex {
            tx_id: self.tx_id(),
            gid,
        })?;
        Ok(VertexAccessor {
            store: Arc::clone(&self.store),
            transaction: Arc::clone(&self.transaction),
            gid,
            vlist,
        })
    }

    /// Creates an edge record on this worker and links it into both
    /// endpoint vertices, routing the structural delta to the owning worker
    /// when an endpoint is remote.
    pub fn insert_edge(
        &self,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    ) -> StorageResult<EdgeAccessor> {
        let edge = self.insert_only_edge(self.store.next_edge_gid(), from, to, edge_type)?;
        let edge_address = Address::new(self.worker_id(), edge.gid());

        if from.is_local_to(self.worker_id()) {
            self.find_vertex(from.gid)?
                .add_out_edge(EdgeEntry::new(to, edge_address, edge_type))?;
        } else {
            self.remote_update(
                from.worker_id,
                from.gid,
                StateDelta::AddOutEdge {
                    tx_id: self.tx_id(),
                    gid: from.gid,
                    to,
                    edge_address,
                    edge_type,
                },
            )?;
        }

        if to.is_local_to(self.worker_id()) {
            self.find_vertex(to.gid)?
                .add_in_edge(EdgeEntry::new(from, edge_address, edge_type))?;
        } else {
            self.remote_update(
                to.worker_id,
                to.gid,
                StateDelta::AddInEdge {
                    tx_id: self.tx_id(),
                    gid: to.gid,
                    from,
                    edge_address,
                    edge_type,
                },
            )?;
        }
        Ok(edge)
    }

    /// Creates just the edge record with a fresh gid; the matching
    /// `AddOutEdge`/`AddInEdge` deltas are the caller's responsibility. The
    /// distributed coordinator uses this on the worker owning `from`.
    pub fn insert_edge_record(
        &self,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    ) -> StorageResult<EdgeAccessor> {
        self.insert_only_edge(self.store.next_edge_gid(), from, to, edge_type)
    }

    /// Creates just the edge record, leaving both endpoint adjacencies
    /// untouched. The distributed coordinator and recovery replay use this;
    /// the matching `AddOutEdge`/`AddInEdge` deltas arrive separately.
    pub fn insert_only_edge(
        &self,
        gid: Gid,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    ) -> StorageResult<EdgeAccessor> {
        let vlist = Arc::new(VersionList::new(
            gid,
            Edge::new(from, to, edge_type),
            &self.transaction,
        ));
        self.store.edges.insert(gid, Arc::clone(&vlist));
        self.store.note_edge_gid(gid);
        self.store.lock_store.acquire(
            RecordKind::Edge,
            gid,
            &self.transaction,
            &self.store.engine,
        )?;
        self.store.wal.emplace(&StateDelta::CreateEdge {
            tx_id: self.tx_id(),
            gid,
            from,
            to,
            edge_type,
        })?;
        Ok(EdgeAccessor {
            store: Arc::clone(&self.store),
            transaction: Arc::clone(&self.transaction),
            gid,
            vlist,
        })
    }

    // ===== Removal =====

    /// Removes a vertex. With `check_empty` the removal fails if any edge is
    /// still incident; without it, incident edges are detached and removed
    /// first.
    pub fn remove_vertex(&self, vertex: &VertexAccessor, check_empty: bool) -> StorageResult<()> {
        let data = vertex.current()?;
        if check_empty && data.degree() > 0 {
            return Err(StorageError::UnableToDeleteVertex(vertex.gid()));
        }
        if !check_empty {
            let mut seen = HashSet::new();
            for entry in &data.out_edges {
                if seen.insert(entry.edge) {
                    self.remove_edge_at(*entry, vertex.gid(), true)?;
                }
            }
            for entry in &data.in_edges {
                if seen.insert(entry.edge) {
                    self.remove_edge_at(*entry, vertex.gid(), false)?;
                }
            }
        }
        vertex.remove_record()?;
        self.store.wal.emplace(&StateDelta::RemoveVertex {
            tx_id: self.tx_id(),
            gid: vertex.gid(),
            check_empty,
        })?;
        Ok(())
    }

    /// Removes an edge: tombstones the record and, when requested, unlinks
    /// it from the endpoint vertices (remote endpoints via the
    /// coordinator).
    pub fn remove_edge(
        &self,
        edge: &EdgeAccessor,
        remove_out: bool,
        remove_in: bool,
    ) -> StorageResult<()> {
        let data = edge.current()?;
        let edge_address = Address::new(edge.gid().worker_id(), edge.gid());
        edge.remove_record()?;
        self.store.wal.emplace(&StateDelta::RemoveEdge {
            tx_id: self.tx_id(),
            gid: edge.gid(),
        })?;
        if remove_out {
            self.unlink_endpoint(data.from, edge_address, true)?;
        }
        if remove_in {
            self.unlink_endpoint(data.to, edge_address, false)?;
        }
        Ok(())
    }

    /// Detach helper for `remove_vertex`: removes the edge of `entry` and
    /// its link on the far endpoint; the near side disappears with the
    /// vertex itself. `outgoing` says which adjacency list the entry came
    /// from, which decides the unlink direction on the far side.
    fn remove_edge_at(
        &self,
        entry: EdgeEntry,
        removed_vertex: Gid,
        outgoing: bool,
    ) -> StorageResult<()> {
        if entry.edge.is_local_to(self.worker_id()) {
            // The edge may already be gone, e.g. when a removal delta
            // replays after the per-edge removal deltas did.
            let edge = match self.find_edge(entry.edge.gid) {
                Ok(edge) => edge,
                Err(StorageError::NotFound(_)) | Err(StorageError::RecordDeleted(_)) => {
                    return Ok(())
                }
                Err(error) => return Err(error),
            };
            let data = edge.current()?;
            let remove_out = data.from.gid != removed_vertex;
            let remove_in = data.to.gid != removed_vertex;
            self.remove_edge(&edge, remove_out, remove_in)
        } else {
            self.remote_update(
                entry.edge.worker_id,
                entry.edge.gid,
                StateDelta::RemoveEdge {
                    tx_id: self.tx_id(),
                    gid: entry.edge.gid,
                },
            )?;
            let far = entry.vertex;
            if far.gid != removed_vertex {
                // Our outgoing edge is the far side's incoming one.
                self.unlink_endpoint(far, entry.edge, !outgoing)?;
            }
            Ok(())
        }
    }

    fn unlink_endpoint(
        &self,
        vertex: Address,
        edge_address: Address,
        outgoing: bool,
    ) -> StorageResult<()> {
        let delta = if outgoing {
            StateDelta::RemoveOutEdge {
                tx_id: self.tx_id(),
                gid: vertex.gid,
                edge_address,
            }
        } else {
            StateDelta::RemoveInEdge {
                tx_id: self.tx_id(),
                gid: vertex.gid,
                edge_address,
            }
        };
        if vertex.is_local_to(self.worker_id()) {
            self.apply_delta(&delta)
        } else {
            self.remote_update(vertex.worker_id, vertex.gid, delta)
        }
    }

    fn remote_update(
        &self,
        worker_id: WorkerId,
        gid: Gid,
        delta: StateDelta,
    ) -> StorageResult<()> {
        let remote = self.store.remote.read().unwrap().clone();
        let Some(remote) = remote else {
            return Err(StorageError::RemoteUpdate(format!(
                "no route to worker {worker_id} for record {gid}"
            )));
        };
        remote.update(worker_id, delta)
    }

    /// Applies one record-update delta through the regular accessor
    /// methods, so locking, versioning and WAL emission behave exactly as
    /// for a local mutation. Used by WAL recovery and by the distributed
    /// coordinator's `Apply`.
    pub fn apply_delta(&self, delta: &StateDelta) -> StorageResult<()> {
        match delta {
            StateDelta::SetPropertyVertex {
                gid,
                property,
                value,
                ..
            } => self
                .vertex_unchecked(*gid)?
                .set_property(*property, value.clone()),
            StateDelta::SetPropertyEdge {
                gid,
                property,
                value,
                ..
            } => self
                .edge_unchecked(*gid)?
                .set_property(*property, value.clone()),
            StateDelta::AddLabel { gid, label, .. } => {
                self.vertex_unchecked(*gid)?.add_label(*label)
            }
            StateDelta::RemoveLabel { gid, label, .. } => {
                self.vertex_unchecked(*gid)?.remove_label(*label)
            }
            StateDelta::AddOutEdge {
                gid,
                to,
                edge_address,
                edge_type,
                ..
            } => self
                .vertex_unchecked(*gid)?
                .add_out_edge(EdgeEntry::new(*to, *edge_address, *edge_type)),
            StateDelta::AddInEdge {
                gid,
                from,
                edge_address,
                edge_type,
                ..
            } => self
                .vertex_unchecked(*gid)?
                .add_in_edge(EdgeEntry::new(*from, *edge_address, *edge_type)),
            StateDelta::RemoveOutEdge {
                gid, edge_address, ..
            } => {
                let vertex = self.vertex_unchecked(*gid)?;
                let address = *edge_address;
                vertex.mutate(StateDelta::RemoveOutEdge {
                    tx_id: self.tx_id(),
                    gid: *gid,
                    edge_address: address,
                }, move |data| data.remove_out_edge(address))
            }
            StateDelta::RemoveInEdge {
                gid, edge_address, ..
            } => {
                let vertex = self.vertex_unchecked(*gid)?;
                let address = *edge_address;
                vertex.mutate(StateDelta::RemoveInEdge {
                    tx_id: self.tx_id(),
                    gid: *gid,
                    edge_address: address,
                }, move |data| data.remove_in_edge(address))
            }
            StateDelta::RemoveVertex {
                gid, check_empty, ..
            } => {
                let vertex = self.vertex_unchecked(*gid)?;
                self.remove_vertex(&vertex, *check_empty)
            }
            StateDelta::RemoveEdge { gid, .. } => {
                let edge = self.edge_unchecked(*gid)?;
                self.remove_edge(&edge, false, false)
            }
            StateDelta::TransactionBegin { .. }
            | StateDelta::TransactionCommit { .. }
            | StateDelta::TransactionAbort { .. }
            | StateDelta::CreateVertex { .. }
            | StateDelta::CreateEdge { .. }
            | StateDelta::BuildIndex { .. } => unreachable!(
                "only record-update deltas are applied through the accessor"
            ),
        }
    }

    // ===== Scans =====

    pub fn vertices(&self) -> Vec<VertexAccessor> {
        self.store
            .vertices
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .is_visible(&self.transaction, self.store.engine.clog())
            })
            .map(|entry| VertexAccessor {
                store: Arc::clone(&self.store),
                transaction: Arc::clone(&self.transaction),
                gid: *entry.key(),
                vlist: Arc::clone(entry.value()),
            })
            .collect()
    }

    /// Label-index scan; every hit is re-checked against this transaction's
    /// snapshot since index entries are maintained eagerly.
    pub fn vertices_by_label(&self, label: LabelId) -> Vec<VertexAccessor> {
        self.collect_verified(self.store.label_index.vertices(label), |vertex| {
            vertex.has_label(label)
        })
    }

    pub fn vertices_by_label_property_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> Vec<VertexAccessor> {
        let gids = self
            .store
            .label_property_index
            .vertices_by_value(label, property, value);
        let expected = value.clone();
        self.collect_verified(gids, move |vertex| {
            vertex.has_label(label)
                && vertex
                    .property(property)
                    .map(|actual| IndexOrd(actual.clone()) == IndexOrd(expected.clone()))
                    .unwrap_or(false)
        })
    }

    pub fn vertices_by_label_property_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&ScanBound>,
        upper: Option<&ScanBound>,
    ) -> Vec<VertexAccessor> {
        let gids = self
            .store
            .label_property_index
            .vertices_by_range(label, property, lower, upper);
        let lower = lower.cloned();
        let upper = upper.cloned();
        self.collect_verified(gids, move |vertex| {
            let Some(actual) = vertex.property(property) else {
                return false;
            };
            vertex.has_label(label) && in_range(actual, lower.as_ref(), upper.as_ref())
        })
    }

    fn collect_verified<F>(&self, gids: Vec<Gid>, matches: F) -> Vec<VertexAccessor>
    where
        F: Fn(&Vertex) -> bool,
    {
        gids.into_iter()
            .filter_map(|gid| {
                let accessor = self.vertex_unchecked(gid).ok()?;
                let vertex = accessor.current().ok()?;
                matches(&vertex).then_some(accessor)
            })
            .collect()
    }

    // ===== Indexes and statistics =====

    /// Builds the `(label, property)` index over the committed vertex set
    /// and logs the build so recovery repeats it. Returns false when the
    /// index already existed.
    pub fn build_index(&self, label: LabelId, property: PropertyId) -> StorageResult<bool> {
        if !self.store.label_property_index.register(label, property) {
            return Ok(false);
        }
        for entry in self.store.vertices.iter() {
            if let Ok(vertex) = entry.value().find(&self.transaction, self.store.engine.clog()) {
                if vertex.has_label(label) {
                    if let Some(value) = vertex.property(property) {
                        self.store
                            .label_property_index
                            .add(label, property, value, *entry.key());
                    }
                }
            }
        }
        self.store.wal.emplace(&StateDelta::BuildIndex {
            tx_id: self.tx_id(),
            label,
            property,
        })?;
        Ok(true)
    }

    pub fn vertices_count(&self) -> usize {
        self.store.vertices_count()
    }

    pub fn vertices_count_by_label(&self, label: LabelId) -> usize {
        self.store.vertices_count_by_label(label)
    }

    pub fn vertices_count_by_label_property(
        &self,
        label: LabelId,
        property: PropertyId,
    ) -> usize {
        self.store.vertices_count_by_label_property(label, property)
    }

    pub fn vertices_count_by_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> usize {
        self.store
            .label_property_index
            .count_by_value(label, property, value)
    }

    pub fn vertices_count_by_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&ScanBound>,
        upper: Option<&ScanBound>,
    ) -> usize {
        self.store
            .label_property_index
            .count_by_range(label, property, lower, upper)
    }

    pub fn label_property_index_exists(&self, label: LabelId, property: PropertyId) -> bool {
        self.store.label_property_index_exists(label, property)
    }
}

pub(crate) fn in_range(
    value: &PropertyValue,
    lower: Option<&ScanBound>,
    upper: Option<&ScanBound>,
) -> bool {
    if lower.is_none() && upper.is_none() {
        return true;
    }
    let key = IndexOrd(value.clone());
    if let Some(bound) = lower {
        if !value.comparable_with(bound.value()) {
            return false;
        }
        let limit = IndexOrd(bound.value().clone());
        match bound {
            ScanBound::Inclusive(_) if key < limit => return false,
            ScanBound::Exclusive(_) if key <= limit => return false,
            _ => {}
        }
    }
    if let Some(bound) = upper {
        if !value.comparable_with(bound.value()) {
            return false;
        }
        let limit = IndexOrd(bound.value().clone());
        match bound {
            ScanBound::Inclusive(_) if key > limit => return false,
            ScanBound::Exclusive(_) if key >= limit => return false,
            _ => {}
        }
    }
    true
}

/// Transaction-bound handle to one vertex record.
#[derive(Clone)]
pub struct VertexAccessor {
    store: Arc<GraphStore>,
    transaction: Arc<Transaction>,
    gid: Gid,
    vlist: Arc<VersionList<Vertex>>,
}

impl std::fmt::Debug for VertexAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexAccessor").field("gid", &self.gid).finish()
    }
}

impl VertexAccessor {
    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn address(&self) -> Address {
        Address::from(self.gid)
    }

    /// The vertex data visible to this transaction.
    pub fn current(&self) -> StorageResult<Vertex> {
        self.vlist.find(&self.transaction, self.store.engine.clog())
    }

    /// Re-resolves the visible version, e.g. after buffered deltas were
    /// applied to the record.
    pub fn reconstruct(&self) -> StorageResult<Vertex> {
        self.vlist
            .reconstruct(&self.transaction, self.store.engine.clog())
    }

    pub fn labels(&self) -> StorageResult<Vec<LabelId>> {
        Ok(self.current()?.labels)
    }

    pub fn has_label(&self, label: LabelId) -> StorageResult<bool> {
        Ok(self.current()?.has_label(label))
    }

    pub fn property(&self, property: PropertyId) -> StorageResult<PropertyValue> {
        Ok(self
            .current()?
            .property(property)
            .cloned()
            .unwrap_or(PropertyValue::Null))
    }

    pub fn add_label(&self, label: LabelId) -> StorageResult<()> {
        let tx_id = self.transaction.id();
        let gid = self.gid;
        self.mutate(
            StateDelta::AddLabel { tx_id, gid, label },
            move |data| data.add_label(label),
        )?;
        self.store.label_index.add(label, gid);
        // Keep every registered (label, property) index in step.
        let vertex = self.current()?;
        for (_, property) in self.store.label_property_index.keys_for_label(label) {
            if let Some(value) = vertex.property(property) {
                self.store
                    .label_property_index
                    .add(label, property, value, gid);
            }
        }
        Ok(())
    }

    /// Index entries are not removed here: a concurrent snapshot may still
    /// see the label, so stale entries are left to the garbage collector.
    pub fn remove_label(&self, label: LabelId) -> StorageResult<()> {
        let tx_id = self.transaction.id();
        let gid = self.gid;
        self.mutate(
            StateDelta::RemoveLabel { tx_id, gid, label },
            move |data| data.remove_label(label),
        )
    }

    pub fn set_property(&self, property: PropertyId, value: PropertyValue) -> StorageResult<()> {
        let tx_id = self.transaction.id();
        let gid = self.gid;
        let stored = value.clone();
        self.mutate(
            StateDelta::SetPropertyVertex {
                tx_id,
                gid,
                property,
                value,
            },
            move |data| data.set_property(property, stored),
        )?;
        if let Ok(vertex) = self.current() {
            if let Some(value) = vertex.property(property) {
                for &label in &vertex.labels {
                    self.store
                        .label_property_index
                        .add(label, property, value, gid);
                }
            }
        }
        Ok(())
    }

    pub fn remove_property(&self, property: PropertyId) -> StorageResult<()> {
        self.set_property(property, PropertyValue::Null)
    }

    pub(crate) fn add_out_edge(&self, entry: EdgeEntry) -> StorageResult<()> {
        let tx_id = self.transaction.id();
        let gid = self.gid;
        self.mutate(
            StateDelta::AddOutEdge {
                tx_id,
                gid,
                to: entry.vertex,
                edge_address: entry.edge,
                edge_type: entry.edge_type,
            },
            move |data| data.add_out_edge(entry),
        )
    }

    pub(crate) fn add_in_edge(&self, entry: EdgeEntry) -> StorageResult<()> {
        let tx_id = self.transaction.id();
        let gid = self.gid;
        self.mutate(
            StateDelta::AddInEdge {
                tx_id,
                gid,
                from: entry.vertex,
                edge_address: entry.edge,
                edge_type: entry.edge_type,
            },
            move |data| data.add_in_edge(entry),
        )
    }

    /// Locks the record, writes a new version through `mutate` and emits the
    /// delta describing the change.
    pub(crate) fn mutate<F>(&self, delta: StateDelta, mutate: F) -> StorageResult<()>
    where
        F: FnOnce(&mut Vertex),
    {
        self.store.lock_store.acquire(
            RecordKind::Vertex,
            self.gid,
            &self.transaction,
            &self.store.engine,
        )?;
        self.vlist
            .update_with(&self.transaction, self.store.engine.clog(), mutate)?;
        self.store.wal.emplace(&delta)?;
        Ok(())
    }

    pub(crate) fn remove_record(&self) -> StorageResult<()> {
        self.store.lock_store.acquire(
            RecordKind::Vertex,
            self.gid,
            &self.transaction,
            &self.store.engine,
        )?;
        self.vlist
            .remove(&self.transaction, self.store.engine.clog())
    }
}

/// Transaction-bound handle to one edge record.
#[derive(Clone)]
pub struct EdgeAccessor {
    store: Arc<GraphStore>,
    transaction: Arc<Transaction>,
    gid: Gid,
    vlist: Arc<VersionList<Edge>>,
}

impl std::fmt::Debug for EdgeAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeAccessor").field("gid", &self.gid).finish()
    }
}

impl EdgeAccessor {
    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn address(&self) -> Address {
        Address::from(self.gid)
    }

    pub fn current(&self) -> StorageResult<Edge> {
        self.vlist.find(&self.transaction, self.store.engine.clog())
    }

    pub fn reconstruct(&self) -> StorageResult<Edge> {
        self.vlist
            .reconstruct(&self.transaction, self.store.engine.clog())
    }

    pub fn from(&self) -> StorageResult<Address> {
        Ok(self.current()?.from)
    }

    pub fn to(&self) -> StorageResult<Address> {
        Ok(self.current()?.to)
    }

    pub fn edge_type(&self) -> StorageResult<EdgeTypeId> {
        Ok(self.current()?.edge_type)
    }

    pub fn property(&self, property: PropertyId) -> StorageResult<PropertyValue> {
        Ok(self
            .current()?
            .property(property)
            .cloned()
            .unwrap_or(PropertyValue::Null))
    }

    pub fn set_property(&self, property: PropertyId, value: PropertyValue) -> StorageResult<()> {
        let tx_id = self.transaction.id();
        let gid = self.gid;
        let stored = value.clone();
        self.store.lock_store.acquire(
            RecordKind::Edge,
            gid,
            &self.transaction,
            &self.store.engine,
        )?;
        self.vlist
            .update_with(&self.transaction, self.store.engine.clog(), move |data| {
                data.set_property(property, stored)
            })?;
        self.store.wal.emplace(&StateDelta::SetPropertyEdge {
            tx_id,
            gid,
            property,
            value,
        })?;
        Ok(())
    }

    pub fn remove_property(&self, property: PropertyId) -> StorageResult<()> {
        self.set_property(property, PropertyValue::Null)
    }

    pub(crate) fn remove_record(&self) -> StorageResult<()> {
        self.store.lock_store.acquire(
            RecordKind::Edge,
            self.gid,
            &self.transaction,
            &self.store.engine,
        )?;
        self.vlist
            .remove(&self.transaction, self.store.engine.clog())
    }
}
