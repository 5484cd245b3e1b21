//! The logical operator tree. Operators form a single sum type; cost
//! estimation and cursor construction are two folds over it.

use quiver_common::{EdgeTypeId, LabelId, PropertyId, PropertyValue};
use smol_str::SmolStr;

use crate::ast::{AggregationOp, Direction, Expr};
use crate::symbols::Symbol;

/// One bound of a `ScanAllByLabelPropertyRange`.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    Inclusive(Expr),
    Exclusive(Expr),
}

impl RangeBound {
    pub fn expr(&self) -> &Expr {
        match self {
            RangeBound::Inclusive(expr) | RangeBound::Exclusive(expr) => expr,
        }
    }

    pub fn is_inclusive(&self) -> bool {
        matches!(self, RangeBound::Inclusive(_))
    }
}

/// What the planner and cost estimator need to know about the stored graph:
/// name interning and index statistics. Implemented by the execution layer
/// on top of the graph accessor.
pub trait PlanningContext {
    fn label_id(&self, name: &str) -> LabelId;
    fn property_id(&self, name: &str) -> PropertyId;
    fn edge_type_id(&self, name: &str) -> EdgeTypeId;
    fn vertices_count(&self) -> usize;
    fn vertices_count_by_label(&self, label: LabelId) -> usize;
    fn vertices_count_by_label_property(&self, label: LabelId, property: PropertyId) -> usize;
    fn vertices_count_by_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> usize;
    /// Bounds are `(value, inclusive)`.
    fn vertices_count_by_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<(&PropertyValue, bool)>,
        upper: Option<(&PropertyValue, bool)>,
    ) -> usize;
    fn label_property_index_exists(&self, label: LabelId, property: PropertyId) -> bool;
}

#[derive(Debug, Clone)]
pub struct NamedExpr {
    pub expr: Expr,
    pub name: SmolStr,
    pub symbol: Symbol,
}

#[derive(Debug, Clone)]
pub struct NodeCreationInfo {
    pub symbol: Symbol,
    pub labels: Vec<LabelId>,
    pub properties: Vec<(PropertyId, Expr)>,
}

#[derive(Debug, Clone)]
pub struct EdgeCreationInfo {
    pub symbol: Symbol,
    pub edge_type: EdgeTypeId,
    pub direction: Direction,
    pub properties: Vec<(PropertyId, Expr)>,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub op: AggregationOp,
    pub expr: Option<Expr>,
    pub output: Symbol,
}

#[derive(Debug, Clone)]
pub enum LogicalOperator {
    /// Emits one empty row: the terminator at the leaf of every plan.
    Once,
    ScanAll {
        input: Box<LogicalOperator>,
        output: Symbol,
    },
    ScanAllByLabel {
        input: Box<LogicalOperator>,
        output: Symbol,
        label: LabelId,
    },
    ScanAllByLabelPropertyValue {
        input: Box<LogicalOperator>,
        output: Symbol,
        label: LabelId,
        property: PropertyId,
        expr: Expr,
    },
    ScanAllByLabelPropertyRange {
        input: Box<LogicalOperator>,
        output: Symbol,
        label: LabelId,
        property: PropertyId,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
    Expand {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        node_symbol: Symbol,
        edge_symbol: Symbol,
        direction: Direction,
        edge_types: Vec<EdgeTypeId>,
        /// The target node was already bound; expansion filters on it
        /// instead of binding it.
        existing_node: bool,
    },
    ExpandVariable {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        node_symbol: Symbol,
        /// Bound to the list of traversed edges.
        edge_symbol: Symbol,
        direction: Direction,
        edge_types: Vec<EdgeTypeId>,
        lower: Option<u64>,
        upper: Option<u64>,
        breadth_first: bool,
        existing_node: bool,
    },
    ConstructNamedPath {
        input: Box<LogicalOperator>,
        path_symbol: Symbol,
        symbols: Vec<Symbol>,
    },
    Filter {
        input: Box<LogicalOperator>,
        expr: Expr,
    },
    /// Cypher isomorphism: the expanded edge must differ from every edge
    /// already bound in the same pattern.
    EdgeUniquenessFilter {
        input: Box<LogicalOperator>,
        expand_symbol: Symbol,
        previous_symbols: Vec<Symbol>,
    },
    Produce {
        input: Box<LogicalOperator>,
        named_exprs: Vec<NamedExpr>,
    },
    Aggregate {
        input: Box<LogicalOperator>,
        aggregations: Vec<Aggregation>,
        group_by: Vec<(Expr, Symbol)>,
    },
    OrderBy {
        input: Box<LogicalOperator>,
        order: Vec<(Expr, bool)>,
    },
    Skip {
        input: Box<LogicalOperator>,
        expr: Expr,
    },
    Limit {
        input: Box<LogicalOperator>,
        expr: Expr,
    },
    Distinct {
        input: Box<LogicalOperator>,
        symbols: Vec<Symbol>,
    },
    Unwind {
        input: Box<LogicalOperator>,
        expr: Expr,
        output: Symbol,
    },
    CreateNode {
        input: Box<LogicalOperator>,
        node: NodeCreationInfo,
    },
    CreateExpand {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        node: NodeCreationInfo,
        edge: EdgeCreationInfo,
        /// The far node already exists; only the edge is created.
        existing_node: bool,
    },
    SetProperty {
        input: Box<LogicalOperator>,
        target: Expr,
        value: Expr,
    },
    SetProperties {
        input: Box<LogicalOperator>,
        symbol: Symbol,
        value: Expr,
        /// `+=` keeps properties the value does not mention.
        update: bool,
    },
    SetLabels {
        input: Box<LogicalOperator>,
        symbol: Symbol,
        labels: Vec<LabelId>,
    },
    RemoveProperty {
        input: Box<LogicalOperator>,
        target: Expr,
    },
    RemoveLabels {
        input: Box<LogicalOperator>,
        symbol: Symbol,
        labels: Vec<LabelId>,
    },
    Delete {
        input: Box<LogicalOperator>,
        exprs: Vec<Expr>,
        detach: bool,
    },
    Merge {
        input: Box<LogicalOperator>,
        on_match: Box<LogicalOperator>,
        on_create: Box<LogicalOperator>,
    },
    Optional {
        input: Box<LogicalOperator>,
        optional: Box<LogicalOperator>,
        /// Symbols bound inside the optional branch, nulled on no match.
        optional_symbols: Vec<Symbol>,
    },
    /// Materializes its input before streaming, isolating writes from the
    /// reads that follow in the same query.
    Accumulate {
        input: Box<LogicalOperator>,
        symbols: Vec<Symbol>,
    },
    /// Crosses two independent subplans (disconnected pattern parts).
    Cartesian {
        left: Box<LogicalOperator>,
        right: Box<LogicalOperator>,
    },
    Union {
        left: Box<LogicalOperator>,
        right: Box<LogicalOperator>,
        distinct: bool,
        /// Column symbols of each side in order; the right side's values
        /// are remapped onto the left's symbols.
        left_symbols: Vec<Symbol>,
        right_symbols: Vec<Symbol>,
    },
}

impl LogicalOperator {
    /// The single upstream input, when the operator has one.
    pub fn input(&self) -> Option<&LogicalOperator> {
        use LogicalOperator::*;
        match self {
            Once | Cartesian { .. } | Union { .. } => None,
            ScanAll { input, .. }
            | ScanAllByLabel { input, .. }
            | ScanAllByLabelPropertyValue { input, .. }
            | ScanAllByLabelPropertyRange { input, .. }
            | Expand { input, .. }
            | ExpandVariable { input, .. }
            | ConstructNamedPath { input, .. }
            | Filter { input, .. }
            | EdgeUniquenessFilter { input, .. }
            | Produce { input, .. }
            | Aggregate { input, .. }
            | OrderBy { input, .. }
            | Skip { input, .. }
            | Limit { input, .. }
            | Distinct { input, .. }
            | Unwind { input, .. }
            | CreateNode { input, .. }
            | CreateExpand { input, .. }
            | SetProperty { input, .. }
            | SetProperties { input, .. }
            | SetLabels { input, .. }
            | RemoveProperty { input, .. }
            | RemoveLabels { input, .. }
            | Delete { input, .. }
            | Merge { input, .. }
            | Optional { input, .. }
            | Accumulate { input, .. } => Some(input),
        }
    }

    /// Whether this operator (ignoring its inputs) mutates the graph.
    pub fn is_write(&self) -> bool {
        use LogicalOperator::*;
        matches!(
            self,
            CreateNode { .. }
                | CreateExpand { .. }
                | SetProperty { .. }
                | SetProperties { .. }
                | SetLabels { .. }
                | RemoveProperty { .. }
                | RemoveLabels { .. }
                | Delete { .. }
                | Merge { .. }
        )
    }
}
