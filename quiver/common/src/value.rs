use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// A wrapper around `f64` providing implementations of `Eq`, `Ord` and
/// `Hash`.
pub type F64 = OrderedFloat<f64>;

/// A property value stored on a vertex or an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(F64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Whether the value participates in the total order used by the
    /// label-property index. Values outside this set sort into the
    /// degenerate tail bucket and are never matched by range scans.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            PropertyValue::Bool(_)
                | PropertyValue::Int(_)
                | PropertyValue::Float(_)
                | PropertyValue::String(_)
        )
    }

    /// Whether two values share an ordering domain: numbers with numbers
    /// (across `Int`/`Float`), booleans with booleans, strings with strings.
    pub fn comparable_with(&self, other: &PropertyValue) -> bool {
        self.is_orderable() && other.is_orderable() && self.type_rank() == other.type_rank()
    }

    fn type_rank(&self) -> u8 {
        match self {
            PropertyValue::Bool(_) => 0,
            PropertyValue::Int(_) | PropertyValue::Float(_) => 1,
            PropertyValue::String(_) => 2,
            PropertyValue::Null | PropertyValue::List(_) => 3,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(value) => write!(f, "{value}"),
            PropertyValue::Int(value) => write!(f, "{value}"),
            PropertyValue::Float(value) => write!(f, "{value}"),
            PropertyValue::String(value) => write!(f, "{value:?}"),
            PropertyValue::List(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(OrderedFloat(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

/// Total order over property values used as the key domain of the
/// label-property index.
///
/// Values order by type rank (booleans, then numbers, then strings) with
/// `Int` and `Float` compared numerically within the shared number rank, so a
/// range scan over a numeric property sees both representations. Everything
/// without a defined comparison shares the maximal rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOrd(pub PropertyValue);

impl Ord for IndexOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = (&self.0, &other.0);
        lhs.type_rank().cmp(&rhs.type_rank()).then_with(|| {
            match (lhs, rhs) {
                (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a.cmp(b),
                (PropertyValue::Int(a), PropertyValue::Int(b)) => a.cmp(b),
                (PropertyValue::Float(a), PropertyValue::Float(b)) => a.cmp(b),
                (PropertyValue::Int(a), PropertyValue::Float(b)) => {
                    OrderedFloat(*a as f64).cmp(b)
                }
                (PropertyValue::Float(a), PropertyValue::Int(b)) => {
                    a.cmp(&OrderedFloat(*b as f64))
                }
                (PropertyValue::String(a), PropertyValue::String(b)) => a.cmp(b),
                // Unorderable values are mutually tied within the tail rank.
                _ => Ordering::Equal,
            }
        })
    }
}

impl PartialOrd for IndexOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_order_across_representations() {
        let one = IndexOrd(PropertyValue::Int(1));
        let one_and_a_half = IndexOrd(PropertyValue::from(1.5));
        let two = IndexOrd(PropertyValue::Int(2));
        assert!(one < one_and_a_half);
        assert!(one_and_a_half < two);
        assert_eq!(
            IndexOrd(PropertyValue::Int(3)).cmp(&IndexOrd(PropertyValue::from(3.0))),
            Ordering::Equal
        );
    }

    #[test]
    fn type_ranks_are_disjoint() {
        let boolean = IndexOrd(PropertyValue::Bool(true));
        let number = IndexOrd(PropertyValue::Int(i64::MIN));
        let string = IndexOrd(PropertyValue::from(""));
        let list = IndexOrd(PropertyValue::List(vec![]));
        assert!(boolean < number);
        assert!(number < string);
        assert!(string < list);
    }

    #[test]
    fn unorderable_values_are_flagged() {
        assert!(!PropertyValue::Null.is_orderable());
        assert!(!PropertyValue::List(vec![PropertyValue::Int(1)]).is_orderable());
        assert!(PropertyValue::from("x").is_orderable());
    }
}
