use std::collections::HashMap;

use quiver_common::{Address, EdgeTypeId, PropertyId, PropertyValue};
use serde::{Deserialize, Serialize};

/// One entry in a vertex adjacency list: the vertex on the other side, the
/// edge record itself and the edge type, all by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEntry {
    pub vertex: Address,
    pub edge: Address,
    pub edge_type: EdgeTypeId,
}

impl EdgeEntry {
    pub fn new(vertex: Address, edge: Address, edge_type: EdgeTypeId) -> Self {
        EdgeEntry {
            vertex,
            edge,
            edge_type,
        }
    }
}

/// Payload of one edge version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: Address,
    pub to: Address,
    pub edge_type: EdgeTypeId,
    pub properties: HashMap<PropertyId, PropertyValue>,
}

impl Edge {
    pub fn new(from: Address, to: Address, edge_type: EdgeTypeId) -> Self {
        Edge {
            from,
            to,
            edge_type,
            properties: HashMap::new(),
        }
    }

    pub fn property(&self, property: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&property)
    }

    pub fn set_property(&mut self, property: PropertyId, value: PropertyValue) {
        if value.is_null() {
            self.properties.remove(&property);
        } else {
            self.properties.insert(property, value);
        }
    }
}
