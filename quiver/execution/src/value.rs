use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;
use quiver_common::{Gid, PropertyValue, F64};
use quiver_storage::{EdgeAccessor, VertexAccessor};

use crate::error::{QueryError, QueryResult};

/// A traversed path: alternating vertices and edges.
#[derive(Clone)]
pub struct PathValue {
    pub vertices: Vec<VertexAccessor>,
    pub edges: Vec<EdgeAccessor>,
}

impl fmt::Debug for PathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathValue")
            .field("vertices", &self.vertices.iter().map(VertexAccessor::gid).collect::<Vec<_>>())
            .field("edges", &self.edges.iter().map(EdgeAccessor::gid).collect::<Vec<_>>())
            .finish()
    }
}

/// Runtime value held in a frame slot: property values plus graph element
/// handles.
#[derive(Debug, Clone, Default)]
pub enum TypedValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(F64),
    String(String),
    List(Vec<TypedValue>),
    Vertex(VertexAccessor),
    Edge(EdgeAccessor),
    Path(PathValue),
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    /// Boolean coercion for filters: null is not true.
    pub fn is_true(&self) -> QueryResult<bool> {
        match self {
            TypedValue::Null => Ok(false),
            TypedValue::Bool(value) => Ok(*value),
            other => Err(QueryError::Type(format!(
                "expected a boolean predicate, got {other:?}"
            ))),
        }
    }

    pub fn as_vertex(&self) -> QueryResult<&VertexAccessor> {
        match self {
            TypedValue::Vertex(vertex) => Ok(vertex),
            other => Err(QueryError::Type(format!("expected a vertex, got {other:?}"))),
        }
    }

    pub fn as_edge(&self) -> QueryResult<&EdgeAccessor> {
        match self {
            TypedValue::Edge(edge) => Ok(edge),
            other => Err(QueryError::Type(format!("expected an edge, got {other:?}"))),
        }
    }

    pub fn as_int(&self) -> QueryResult<i64> {
        match self {
            TypedValue::Int(value) => Ok(*value),
            other => Err(QueryError::Type(format!(
                "expected an integer, got {other:?}"
            ))),
        }
    }

    /// Converts into a storable property value; graph elements are not
    /// storable.
    pub fn into_property_value(self) -> QueryResult<PropertyValue> {
        Ok(match self {
            TypedValue::Null => PropertyValue::Null,
            TypedValue::Bool(value) => PropertyValue::Bool(value),
            TypedValue::Int(value) => PropertyValue::Int(value),
            TypedValue::Float(value) => PropertyValue::Float(value),
            TypedValue::String(value) => PropertyValue::String(value),
            TypedValue::List(values) => PropertyValue::List(
                values
                    .into_iter()
                    .map(TypedValue::into_property_value)
                    .collect::<QueryResult<_>>()?,
            ),
            other => {
                return Err(QueryError::Type(format!(
                    "{other:?} cannot be stored as a property"
                )))
            }
        })
    }

    /// Three-valued equality: null compares to anything as null.
    pub fn equals(&self, other: &TypedValue) -> Option<bool> {
        use TypedValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(a), Bool(b)) => Some(a == b),
            (Int(a), Int(b)) => Some(a == b),
            (Float(a), Float(b)) => Some(a == b),
            (Int(a), Float(b)) => Some(OrderedFloat(*a as f64) == *b),
            (Float(a), Int(b)) => Some(*a == OrderedFloat(*b as f64)),
            (String(a), String(b)) => Some(a == b),
            (List(a), List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut all = Some(true);
                for (left, right) in a.iter().zip(b) {
                    match left.equals(right) {
                        Some(true) => {}
                        Some(false) => return Some(false),
                        None => all = None,
                    }
                }
                all
            }
            (Vertex(a), Vertex(b)) => Some(a.gid() == b.gid()),
            (Edge(a), Edge(b)) => Some(a.gid() == b.gid()),
            _ => Some(false),
        }
    }

    /// Ordering comparison (`<`, `<=`, ...): numbers and strings compare,
    /// anything else (or null) yields null.
    pub fn partial_cmp_values(&self, other: &TypedValue) -> Option<Ordering> {
        use TypedValue::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => Some(a.cmp(b)),
            (Int(a), Float(b)) => Some(OrderedFloat(*a as f64).cmp(b)),
            (Float(a), Int(b)) => Some(a.cmp(&OrderedFloat(*b as f64))),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order for ORDER BY: nulls sort last, then values by type rank
    /// and within-type order, graph elements by id.
    pub fn cmp_total(&self, other: &TypedValue) -> Ordering {
        fn rank(value: &TypedValue) -> u8 {
            match value {
                TypedValue::Bool(_) => 0,
                TypedValue::Int(_) | TypedValue::Float(_) => 1,
                TypedValue::String(_) => 2,
                TypedValue::List(_) => 3,
                TypedValue::Vertex(_) => 4,
                TypedValue::Edge(_) => 5,
                TypedValue::Path(_) => 6,
                TypedValue::Null => 7,
            }
        }
        rank(self).cmp(&rank(other)).then_with(|| {
            self.partial_cmp_values(other).unwrap_or_else(|| {
                use TypedValue::*;
                match (self, other) {
                    (List(a), List(b)) => {
                        for (left, right) in a.iter().zip(b) {
                            match left.cmp_total(right) {
                                Ordering::Equal => {}
                                unequal => return unequal,
                            }
                        }
                        a.len().cmp(&b.len())
                    }
                    (Vertex(a), Vertex(b)) => a.gid().cmp(&b.gid()),
                    (Edge(a), Edge(b)) => a.gid().cmp(&b.gid()),
                    (Path(a), Path(b)) => {
                        let key = |path: &PathValue| -> Vec<Gid> {
                            path.vertices.iter().map(VertexAccessor::gid).collect()
                        };
                        key(a).cmp(&key(b))
                    }
                    _ => Ordering::Equal,
                }
            })
        })
    }

    /// A hashable key standing in for the value in DISTINCT and aggregation
    /// groups.
    pub fn key(&self) -> ValueKey {
        match self {
            TypedValue::Null => ValueKey::Null,
            TypedValue::Bool(value) => ValueKey::Bool(*value),
            TypedValue::Int(value) => ValueKey::Int(*value),
            // A whole float keys like the equal integer, keeping key
            // equality consistent with `equals`.
            TypedValue::Float(value) if value.fract() == 0.0 && value.abs() <= i64::MAX as f64 => {
                ValueKey::Int(value.into_inner() as i64)
            }
            TypedValue::Float(value) => ValueKey::Float(*value),
            TypedValue::String(value) => ValueKey::String(value.clone()),
            TypedValue::List(values) => {
                ValueKey::List(values.iter().map(TypedValue::key).collect())
            }
            TypedValue::Vertex(vertex) => ValueKey::Vertex(vertex.gid()),
            TypedValue::Edge(edge) => ValueKey::Edge(edge.gid()),
            TypedValue::Path(path) => ValueKey::List(
                path.vertices
                    .iter()
                    .map(|vertex| ValueKey::Vertex(vertex.gid()))
                    .collect(),
            ),
        }
    }
}

impl From<PropertyValue> for TypedValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Null => TypedValue::Null,
            PropertyValue::Bool(value) => TypedValue::Bool(value),
            PropertyValue::Int(value) => TypedValue::Int(value),
            PropertyValue::Float(value) => TypedValue::Float(value),
            PropertyValue::String(value) => TypedValue::String(value),
            PropertyValue::List(values) => {
                TypedValue::List(values.into_iter().map(TypedValue::from).collect())
            }
        }
    }
}

/// Equality-and-hash image of a [`TypedValue`]. Int and Float that compare
/// equal map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(F64),
    String(String),
    List(Vec<ValueKey>),
    Vertex(Gid),
    Edge(Gid),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_valued_equality() {
        assert_eq!(TypedValue::Null.equals(&TypedValue::Int(1)), None);
        assert_eq!(
            TypedValue::Int(1).equals(&TypedValue::Float(OrderedFloat(1.0))),
            Some(true)
        );
        assert_eq!(
            TypedValue::Int(1).equals(&TypedValue::String("1".into())),
            Some(false)
        );
    }

    #[test]
    fn total_order_puts_nulls_last() {
        let mut values = vec![
            TypedValue::Null,
            TypedValue::Int(2),
            TypedValue::String("a".into()),
            TypedValue::Int(1),
        ];
        values.sort_by(TypedValue::cmp_total);
        assert!(matches!(values[0], TypedValue::Int(1)));
        assert!(matches!(values[1], TypedValue::Int(2)));
        assert!(matches!(values[2], TypedValue::String(_)));
        assert!(matches!(values[3], TypedValue::Null));
    }
}
