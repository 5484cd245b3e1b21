use std::collections::HashMap;

use quiver_common::{Address, LabelId, PropertyId, PropertyValue};
use serde::{Deserialize, Serialize};

use super::edge::EdgeEntry;

/// Payload of one vertex version: the label set, the property map and both
/// adjacency lists. Edge entries hold addresses, never pointers, so records
/// can reference each other across workers (and cyclically) without owning
/// one another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub labels: Vec<LabelId>,
    pub properties: HashMap<PropertyId, PropertyValue>,
    pub out_edges: Vec<EdgeEntry>,
    pub in_edges: Vec<EdgeEntry>,
}

impl Vertex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }

    pub fn add_label(&mut self, label: LabelId) {
        if !self.has_label(label) {
            self.labels.push(label);
        }
    }

    pub fn remove_label(&mut self, label: LabelId) {
        self.labels.retain(|&existing| existing != label);
    }

    pub fn property(&self, property: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&property)
    }

    /// Sets or clears a property; `Null` erases, matching the query
    /// language's `SET n.p = null`.
    pub fn set_property(&mut self, property: PropertyId, value: PropertyValue) {
        if value.is_null() {
            self.properties.remove(&property);
        } else {
            self.properties.insert(property, value);
        }
    }

    pub fn add_out_edge(&mut self, entry: EdgeEntry) {
        if !self.out_edges.contains(&entry) {
            self.out_edges.push(entry);
        }
    }

    pub fn add_in_edge(&mut self, entry: EdgeEntry) {
        if !self.in_edges.contains(&entry) {
            self.in_edges.push(entry);
        }
    }

    pub fn remove_out_edge(&mut self, edge_address: Address) {
        self.out_edges.retain(|entry| entry.edge != edge_address);
    }

    pub fn remove_in_edge(&mut self, edge_address: Address) {
        self.in_edges.retain(|entry| entry.edge != edge_address);
    }

    pub fn degree(&self) -> usize {
        self.out_edges.len() + self.in_edges.len()
    }
}
