//! One cursor per logical operator. `build_cursor` folds the plan into a
//! cursor tree; `pull` advances it one row at a time, writing bindings into
//! the shared frame.

use std::collections::{HashMap, HashSet, VecDeque};

use itertools::Itertools;
use quiver_common::{Gid, PropertyValue};
use quiver_planner::ast::{AggregationOp, Direction, Expr};
use quiver_planner::operator::{Aggregation, NodeCreationInfo};
use quiver_planner::{LogicalOperator, RangeBound, Symbol};
use quiver_storage::indexes::ScanBound;
use quiver_storage::model::EdgeEntry;
use quiver_storage::{EdgeAccessor, StorageError, VertexAccessor};

use crate::context::ExecutionContext;
use crate::error::{QueryError, QueryResult};
use crate::evaluator::evaluate;
use crate::frame::Frame;
use crate::value::{PathValue, TypedValue, ValueKey};

pub trait Cursor {
    /// Produces the next row into `frame`; false means exhausted.
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool>;

    /// Rewinds the cursor so the subtree can run again for a new outer row.
    fn reset(&mut self);
}

pub fn build_cursor<'a>(op: &'a LogicalOperator) -> Box<dyn Cursor + 'a> {
    use LogicalOperator::*;
    match op {
        Once => Box::new(OnceCursor { done: false }),
        ScanAll { input, output } => Box::new(ScanCursor {
            input: build_cursor(input),
            output: *output,
            produce: ScanKind::All,
            vertices: None,
            index: 0,
        }),
        ScanAllByLabel {
            input,
            output,
            label,
        } => Box::new(ScanCursor {
            input: build_cursor(input),
            output: *output,
            produce: ScanKind::ByLabel(*label),
            vertices: None,
            index: 0,
        }),
        ScanAllByLabelPropertyValue {
            input,
            output,
            label,
            property,
            expr,
        } => Box::new(ScanCursor {
            input: build_cursor(input),
            output: *output,
            produce: ScanKind::ByValue {
                label: *label,
                property: *property,
                expr,
            },
            vertices: None,
            index: 0,
        }),
        ScanAllByLabelPropertyRange {
            input,
            output,
            label,
            property,
            lower,
            upper,
        } => Box::new(ScanCursor {
            input: build_cursor(input),
            output: *output,
            produce: ScanKind::ByRange {
                label: *label,
                property: *property,
                lower: lower.as_ref(),
                upper: upper.as_ref(),
            },
            vertices: None,
            index: 0,
        }),
        Expand {
            input,
            input_symbol,
            node_symbol,
            edge_symbol,
            direction,
            edge_types,
            existing_node,
        } => Box::new(ExpandCursor {
            input: build_cursor(input),
            input_symbol: *input_symbol,
            node_symbol: *node_symbol,
            edge_symbol: *edge_symbol,
            direction: *direction,
            edge_types,
            existing_node: *existing_node,
            pending: VecDeque::new(),
        }),
        ExpandVariable {
            input,
            input_symbol,
            node_symbol,
            edge_symbol,
            direction,
            edge_types,
            lower,
            upper,
            breadth_first,
            existing_node,
        } => Box::new(ExpandVariableCursor {
            input: build_cursor(input),
            input_symbol: *input_symbol,
            node_symbol: *node_symbol,
            edge_symbol: *edge_symbol,
            direction: *direction,
            edge_types,
            lower: lower.unwrap_or(1),
            upper: upper.unwrap_or(u64::MAX),
            breadth_first: *breadth_first,
            existing_node: *existing_node,
            pending: VecDeque::new(),
        }),
        ConstructNamedPath {
            input,
            path_symbol,
            symbols,
        } => Box::new(ConstructNamedPathCursor {
            input: build_cursor(input),
            path_symbol: *path_symbol,
            symbols,
        }),
        Filter { input, expr } => Box::new(FilterCursor {
            input: build_cursor(input),
            expr,
        }),
        EdgeUniquenessFilter {
            input,
            expand_symbol,
            previous_symbols,
        } => Box::new(EdgeUniquenessFilterCursor {
            input: build_cursor(input),
            expand_symbol: *expand_symbol,
            previous_symbols,
        }),
        Produce { input, named_exprs } => Box::new(ProduceCursor {
            input: build_cursor(input),
            named_exprs,
        }),
        Aggregate {
            input,
            aggregations,
            group_by,
        } => Box::new(AggregateCursor {
            input: build_cursor(input),
            aggregations,
            group_by,
            results: None,
            index: 0,
        }),
        OrderBy { input, order } => Box::new(OrderByCursor {
            input: build_cursor(input),
            order,
            sorted: None,
            index: 0,
        }),
        Skip { input, expr } => Box::new(SkipCursor {
            input: build_cursor(input),
            expr,
            skipped: false,
        }),
        Limit { input, expr } => Box::new(LimitCursor {
            input: build_cursor(input),
            expr,
            remaining: None,
        }),
        Distinct { input, symbols } => Box::new(DistinctCursor {
            input: build_cursor(input),
            symbols,
            seen: HashSet::new(),
        }),
        Unwind {
            input,
            expr,
            output,
        } => Box::new(UnwindCursor {
            input: build_cursor(input),
            expr,
            output: *output,
            items: VecDeque::new(),
        }),
        CreateNode { input, node } => Box::new(CreateNodeCursor {
            input: build_cursor(input),
            node,
        }),
        CreateExpand {
            input,
            input_symbol,
            node,
            edge,
            existing_node,
        } => Box::new(CreateExpandCursor {
            input: build_cursor(input),
            input_symbol: *input_symbol,
            node,
            edge,
            existing_node: *existing_node,
        }),
        SetProperty {
            input,
            target,
            value,
        } => Box::new(SetPropertyCursor {
            input: build_cursor(input),
            target,
            value,
        }),
        SetProperties {
            input,
            symbol,
            value,
            update,
        } => Box::new(SetPropertiesCursor {
            input: build_cursor(input),
            symbol: *symbol,
            value,
            update: *update,
        }),
        SetLabels {
            input,
            symbol,
            labels,
        } => Box::new(SetLabelsCursor {
            input: build_cursor(input),
            symbol: *symbol,
            labels,
            remove: false,
        }),
        RemoveLabels {
            input,
            symbol,
            labels,
        } => Box::new(SetLabelsCursor {
            input: build_cursor(input),
            symbol: *symbol,
            labels,
            remove: true,
        }),
        RemoveProperty { input, target } => Box::new(SetPropertyCursor {
            input: build_cursor(input),
            target,
            value: &NULL_EXPR,
        }),
        Delete {
            input,
            exprs,
            detach,
        } => Box::new(DeleteCursor {
            input: build_cursor(input),
            exprs,
            detach: *detach,
        }),
        Merge {
            input,
            on_match,
            on_create,
        } => Box::new(MergeCursor {
            input: build_cursor(input),
            on_match: build_cursor(on_match),
            on_create: build_cursor(on_create),
            state: MergeState::PullInput,
        }),
        Optional {
            input,
            optional,
            optional_symbols,
        } => Box::new(OptionalCursor {
            input: build_cursor(input),
            optional: build_cursor(optional),
            optional_symbols,
            row_active: false,
            emitted: false,
        }),
        Accumulate { input, symbols } => Box::new(AccumulateCursor {
            input: build_cursor(input),
            symbols,
            rows: None,
            index: 0,
        }),
        Cartesian { left, right } => Box::new(CartesianCursor {
            left: build_cursor(left),
            right: build_cursor(right),
            left_row: false,
        }),
        Union {
            left,
            right,
            distinct,
            left_symbols,
            right_symbols,
        } => Box::new(UnionCursor {
            left: build_cursor(left),
            right: build_cursor(right),
            distinct: *distinct,
            left_symbols,
            right_symbols,
            on_right: false,
            seen: HashSet::new(),
        }),
    }
}

static NULL_EXPR: Expr = Expr::Literal(PropertyValue::Null);

// ===== Leaf =====

struct OnceCursor {
    done: bool,
}

impl Cursor for OnceCursor {
    fn pull(&mut self, _frame: &mut Frame, _context: &mut ExecutionContext) -> QueryResult<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        Ok(true)
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

// ===== Scans =====

enum ScanKind<'a> {
    All,
    ByLabel(quiver_common::LabelId),
    ByValue {
        label: quiver_common::LabelId,
        property: quiver_common::PropertyId,
        expr: &'a Expr,
    },
    ByRange {
        label: quiver_common::LabelId,
        property: quiver_common::PropertyId,
        lower: Option<&'a RangeBound>,
        upper: Option<&'a RangeBound>,
    },
}

struct ScanCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    output: Symbol,
    produce: ScanKind<'a>,
    vertices: Option<Vec<VertexAccessor>>,
    index: usize,
}

fn scan_bound(
    bound: Option<&RangeBound>,
    frame: &Frame,
    context: &ExecutionContext,
) -> QueryResult<Option<Option<ScanBound>>> {
    // Outer None: no bound. Inner None: the bound evaluated to null, which
    // matches nothing.
    let Some(bound) = bound else { return Ok(None) };
    let value = evaluate(bound.expr(), frame, context)?;
    if value.is_null() {
        return Ok(Some(None));
    }
    let value = value.into_property_value()?;
    Ok(Some(Some(if bound.is_inclusive() {
        ScanBound::Inclusive(value)
    } else {
        ScanBound::Exclusive(value)
    })))
}

impl Cursor for ScanCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            if let Some(vertices) = &self.vertices {
                if self.index < vertices.len() {
                    let vertex = vertices[self.index].clone();
                    self.index += 1;
                    frame.set(self.output, TypedValue::Vertex(vertex));
                    return Ok(true);
                }
                self.vertices = None;
            }
            if !self.input.pull(frame, context)? {
                return Ok(false);
            }
            let accessor = context.accessor();
            let vertices = match &self.produce {
                ScanKind::All => accessor.vertices(),
                ScanKind::ByLabel(label) => accessor.vertices_by_label(*label),
                ScanKind::ByValue {
                    label,
                    property,
                    expr,
                } => {
                    let value = evaluate(*expr, frame, context)?;
                    if value.is_null() {
                        Vec::new()
                    } else {
                        let value = value.into_property_value()?;
                        context
                            .accessor()
                            .vertices_by_label_property_value(*label, *property, &value)
                    }
                }
                ScanKind::ByRange {
                    label,
                    property,
                    lower,
                    upper,
                } => {
                    let lower = scan_bound(*lower, frame, context)?;
                    let upper = scan_bound(*upper, frame, context)?;
                    match (lower, upper) {
                        (Some(None), _) | (_, Some(None)) => Vec::new(),
                        (lower, upper) => context.accessor().vertices_by_label_property_range(
                            *label,
                            *property,
                            lower.flatten().as_ref(),
                            upper.flatten().as_ref(),
                        ),
                    }
                }
            };
            self.vertices = Some(vertices);
            self.index = 0;
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.vertices = None;
        self.index = 0;
    }
}

// ===== Expansion =====

fn adjacency(
    vertex: &VertexAccessor,
    direction: Direction,
) -> QueryResult<Vec<(EdgeEntry, bool)>> {
    let data = vertex.current()?;
    let mut entries = Vec::new();
    if matches!(direction, Direction::Out | Direction::Both) {
        entries.extend(data.out_edges.iter().map(|entry| (*entry, true)));
    }
    if matches!(direction, Direction::In | Direction::Both) {
        entries.extend(data.in_edges.iter().map(|entry| (*entry, false)));
    }
    Ok(entries)
}

/// Resolves an adjacency entry to local accessors; entries whose records
/// live on another worker are not expandable here and are skipped.
fn resolve_entry(
    context: &ExecutionContext,
    entry: &EdgeEntry,
) -> QueryResult<Option<(EdgeAccessor, VertexAccessor)>> {
    let worker_id = context.accessor().worker_id();
    if !entry.edge.is_local_to(worker_id) || !entry.vertex.is_local_to(worker_id) {
        return Ok(None);
    }
    let edge = match context.accessor().find_edge(entry.edge.gid) {
        Ok(edge) => edge,
        Err(StorageError::NotFound(_)) => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let vertex = match context.accessor().find_vertex(entry.vertex.gid) {
        Ok(vertex) => vertex,
        Err(StorageError::NotFound(_)) => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    Ok(Some((edge, vertex)))
}

struct ExpandCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    input_symbol: Symbol,
    node_symbol: Symbol,
    edge_symbol: Symbol,
    direction: Direction,
    edge_types: &'a [quiver_common::EdgeTypeId],
    existing_node: bool,
    pending: VecDeque<(EdgeAccessor, VertexAccessor)>,
}

impl Cursor for ExpandCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            if let Some((edge, node)) = self.pending.pop_front() {
                if self.existing_node {
                    let bound = frame.get(self.node_symbol).as_vertex()?;
                    if bound.gid() != node.gid() {
                        continue;
                    }
                } else {
                    frame.set(self.node_symbol, TypedValue::Vertex(node));
                }
                frame.set(self.edge_symbol, TypedValue::Edge(edge));
                return Ok(true);
            }
            if !self.input.pull(frame, context)? {
                return Ok(false);
            }
            let vertex = frame.get(self.input_symbol).as_vertex()?.clone();
            for (entry, _) in adjacency(&vertex, self.direction)? {
                if !self.edge_types.is_empty() && !self.edge_types.contains(&entry.edge_type) {
                    continue;
                }
                if let Some(resolved) = resolve_entry(context, &entry)? {
                    self.pending.push_back(resolved);
                }
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.pending.clear();
    }
}

struct ExpandVariableCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    input_symbol: Symbol,
    node_symbol: Symbol,
    edge_symbol: Symbol,
    direction: Direction,
    edge_types: &'a [quiver_common::EdgeTypeId],
    lower: u64,
    upper: u64,
    breadth_first: bool,
    existing_node: bool,
    pending: VecDeque<(Vec<EdgeAccessor>, VertexAccessor)>,
}

impl ExpandVariableCursor<'_> {
    /// Enumerates paths from `start` whose length is within bounds. Depth
    /// first by default; breadth first emits each vertex once via its
    /// shortest path. Edges are unique within one path, which also bounds
    /// unbounded expansions.
    fn enumerate(
        &self,
        context: &ExecutionContext,
        start: VertexAccessor,
    ) -> QueryResult<Vec<(Vec<EdgeAccessor>, VertexAccessor)>> {
        let mut results = Vec::new();
        if self.lower == 0 {
            results.push((Vec::new(), start.clone()));
        }
        if self.upper == 0 {
            return Ok(results);
        }

        let mut frontier: VecDeque<(VertexAccessor, Vec<EdgeAccessor>)> = VecDeque::new();
        frontier.push_back((start.clone(), Vec::new()));
        let mut visited: HashSet<Gid> = HashSet::new();
        visited.insert(start.gid());

        while let Some((vertex, path)) = if self.breadth_first {
            frontier.pop_front()
        } else {
            frontier.pop_back()
        } {
            context.check()?;
            if path.len() as u64 >= self.upper {
                continue;
            }
            for (entry, _) in adjacency(&vertex, self.direction)? {
                if !self.edge_types.is_empty() && !self.edge_types.contains(&entry.edge_type) {
                    continue;
                }
                if path.iter().any(|edge| edge.gid() == entry.edge.gid) {
                    continue;
                }
                let Some((edge, next)) = resolve_entry(context, &entry)? else {
                    continue;
                };
                if self.breadth_first && !visited.insert(next.gid()) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(edge);
                let depth = extended.len() as u64;
                if depth >= self.lower && depth <= self.upper {
                    results.push((extended.clone(), next.clone()));
                }
                frontier.push_back((next, extended));
            }
        }
        Ok(results)
    }
}

impl Cursor for ExpandVariableCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            if let Some((path, node)) = self.pending.pop_front() {
                if self.existing_node {
                    let bound = frame.get(self.node_symbol).as_vertex()?;
                    if bound.gid() != node.gid() {
                        continue;
                    }
                } else {
                    frame.set(self.node_symbol, TypedValue::Vertex(node));
                }
                frame.set(
                    self.edge_symbol,
                    TypedValue::List(path.into_iter().map(TypedValue::Edge).collect()),
                );
                return Ok(true);
            }
            if !self.input.pull(frame, context)? {
                return Ok(false);
            }
            let start = frame.get(self.input_symbol).as_vertex()?.clone();
            self.pending = self.enumerate(context, start)?.into();
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.pending.clear();
    }
}

struct ConstructNamedPathCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    path_symbol: Symbol,
    symbols: &'a [Symbol],
}

impl Cursor for ConstructNamedPathCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, context)? {
            return Ok(false);
        }
        let mut path = PathValue {
            vertices: Vec::new(),
            edges: Vec::new(),
        };
        for symbol in self.symbols {
            match frame.get(*symbol) {
                TypedValue::Vertex(vertex) => path.vertices.push(vertex.clone()),
                TypedValue::Edge(edge) => path.edges.push(edge.clone()),
                TypedValue::List(edges) => {
                    for edge in edges {
                        path.edges.push(edge.as_edge()?.clone());
                    }
                }
                // An unmatched optional part nulls the whole path.
                TypedValue::Null => {
                    frame.set(self.path_symbol, TypedValue::Null);
                    return Ok(true);
                }
                other => {
                    return Err(QueryError::Type(format!(
                        "cannot build a path through {other:?}"
                    )))
                }
            }
        }
        frame.set(self.path_symbol, TypedValue::Path(path));
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

// ===== Filtering =====

struct FilterCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    expr: &'a Expr,
}

impl Cursor for FilterCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            if !self.input.pull(frame, context)? {
                return Ok(false);
            }
            if evaluate(self.expr, frame, context)?.is_true()? {
                return Ok(true);
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

fn edge_gids(value: &TypedValue) -> Vec<Gid> {
    match value {
        TypedValue::Edge(edge) => vec![edge.gid()],
        TypedValue::List(values) => values
            .iter()
            .filter_map(|value| match value {
                TypedValue::Edge(edge) => Some(edge.gid()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

struct EdgeUniquenessFilterCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    expand_symbol: Symbol,
    previous_symbols: &'a [Symbol],
}

impl Cursor for EdgeUniquenessFilterCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        'outer: loop {
            if !self.input.pull(frame, context)? {
                return Ok(false);
            }
            let expanded = edge_gids(frame.get(self.expand_symbol));
            for symbol in self.previous_symbols {
                let previous = edge_gids(frame.get(*symbol));
                if expanded.iter().any(|gid| previous.contains(gid)) {
                    continue 'outer;
                }
            }
            return Ok(true);
        }
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

// ===== Projection =====

struct ProduceCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    named_exprs: &'a [quiver_planner::operator::NamedExpr],
}

impl Cursor for ProduceCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        context.check()?;
        if !self.input.pull(frame, context)? {
            return Ok(false);
        }
        for named in self.named_exprs {
            let value = evaluate(&named.expr, frame, context)?;
            frame.set(named.symbol, value);
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

// ===== Aggregation =====

#[derive(Default)]
struct GroupState {
    keys: Vec<TypedValue>,
    counts: Vec<i64>,
    values: Vec<TypedValue>,
}

struct AggregateCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    aggregations: &'a [Aggregation],
    group_by: &'a [(Expr, Symbol)],
    results: Option<Vec<GroupState>>,
    index: usize,
}

impl AggregateCursor<'_> {
    fn accumulate(
        &self,
        state: &mut GroupState,
        frame: &Frame,
        context: &ExecutionContext,
    ) -> QueryResult<()> {
        for (position, aggregation) in self.aggregations.iter().enumerate() {
            let value = match &aggregation.expr {
                Some(expr) => evaluate(expr, frame, context)?,
                None => TypedValue::Bool(true), // count(*)
            };
            if value.is_null() {
                continue;
            }
            state.counts[position] += 1;
            let slot = &mut state.values[position];
            match aggregation.op {
                AggregationOp::Count => {
                    *slot = TypedValue::Int(state.counts[position]);
                }
                AggregationOp::Sum | AggregationOp::Avg => {
                    let sum = match (slot.clone(), value) {
                        (TypedValue::Null, value) => value,
                        (TypedValue::Int(a), TypedValue::Int(b)) => TypedValue::Int(a + b),
                        (a, b) => {
                            let to_float = |value: TypedValue| -> QueryResult<f64> {
                                match value {
                                    TypedValue::Int(value) => Ok(value as f64),
                                    TypedValue::Float(value) => Ok(value.into_inner()),
                                    other => Err(QueryError::Type(format!(
                                        "cannot sum {other:?}"
                                    ))),
                                }
                            };
                            TypedValue::Float(ordered_float::OrderedFloat(
                                to_float(a)? + to_float(b)?,
                            ))
                        }
                    };
                    *slot = sum;
                }
                AggregationOp::Min => {
                    if slot.is_null() || value.cmp_total(slot).is_lt() {
                        *slot = value;
                    }
                }
                AggregationOp::Max => {
                    if slot.is_null() || value.cmp_total(slot).is_gt() {
                        *slot = value;
                    }
                }
                AggregationOp::Collect => {
                    if let TypedValue::List(items) = slot {
                        items.push(value);
                    } else {
                        *slot = TypedValue::List(vec![value]);
                    }
                }
            }
        }
        Ok(())
    }

    fn finalize(&self, state: &mut GroupState) {
        for (position, aggregation) in self.aggregations.iter().enumerate() {
            match aggregation.op {
                AggregationOp::Count => {
                    if state.values[position].is_null() {
                        state.values[position] = TypedValue::Int(0);
                    }
                }
                AggregationOp::Avg => {
                    let count = state.counts[position];
                    if count > 0 {
                        let sum = match &state.values[position] {
                            TypedValue::Int(value) => *value as f64,
                            TypedValue::Float(value) => value.into_inner(),
                            _ => 0.0,
                        };
                        state.values[position] = TypedValue::Float(ordered_float::OrderedFloat(
                            sum / count as f64,
                        ));
                    }
                }
                AggregationOp::Sum => {
                    if state.values[position].is_null() {
                        state.values[position] = TypedValue::Int(0);
                    }
                }
                AggregationOp::Collect => {
                    if state.values[position].is_null() {
                        state.values[position] = TypedValue::List(Vec::new());
                    }
                }
                _ => {}
            }
        }
    }
}

impl Cursor for AggregateCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        if self.results.is_none() {
            let mut groups: HashMap<Vec<ValueKey>, GroupState> = HashMap::new();
            let mut order: Vec<Vec<ValueKey>> = Vec::new();
            while self.input.pull(frame, context)? {
                context.check()?;
                let mut keys = Vec::with_capacity(self.group_by.len());
                let mut key_hash = Vec::with_capacity(self.group_by.len());
                for (expr, _) in self.group_by {
                    let value = evaluate(expr, frame, context)?;
                    key_hash.push(value.key());
                    keys.push(value);
                }
                let state = groups.entry(key_hash.clone()).or_insert_with(|| {
                    order.push(key_hash);
                    GroupState {
                        keys,
                        counts: vec![0; self.aggregations.len()],
                        values: vec![TypedValue::Null; self.aggregations.len()],
                    }
                });
                self.accumulate(state, frame, context)?;
            }
            let mut results = Vec::with_capacity(order.len());
            for key in order {
                let mut state = groups.remove(&key).unwrap();
                self.finalize(&mut state);
                results.push(state);
            }
            // With no grouping keys an empty input still aggregates to one
            // row of neutral values.
            if results.is_empty() && self.group_by.is_empty() {
                let mut state = GroupState {
                    keys: Vec::new(),
                    counts: vec![0; self.aggregations.len()],
                    values: vec![TypedValue::Null; self.aggregations.len()],
                };
                self.finalize(&mut state);
                results.push(state);
            }
            self.results = Some(results);
            self.index = 0;
        }

        let results = self.results.as_ref().unwrap();
        if self.index >= results.len() {
            return Ok(false);
        }
        let state = &results[self.index];
        self.index += 1;
        for ((_, symbol), value) in self.group_by.iter().zip(&state.keys) {
            frame.set(*symbol, value.clone());
        }
        for (aggregation, value) in self.aggregations.iter().zip(&state.values) {
            frame.set(aggregation.output, value.clone());
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.results = None;
        self.index = 0;
    }
}

// ===== Ordering and slicing =====

struct OrderByCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    order: &'a [(Expr, bool)],
    sorted: Option<Vec<Frame>>,
    index: usize,
}

impl Cursor for OrderByCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        if self.sorted.is_none() {
            let mut rows: Vec<(Vec<TypedValue>, Frame)> = Vec::new();
            while self.input.pull(frame, context)? {
                context.check()?;
                let keys = self
                    .order
                    .iter()
                    .map(|(expr, _)| evaluate(expr, frame, context))
                    .collect::<QueryResult<Vec<_>>>()?;
                rows.push((keys, frame.clone()));
            }
            rows.sort_by(|(left, _), (right, _)| {
                for (position, (_, ascending)) in self.order.iter().enumerate() {
                    let ordering = left[position].cmp_total(&right[position]);
                    let ordering = if *ascending { ordering } else { ordering.reverse() };
                    if !ordering.is_eq() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
            self.sorted = Some(rows.into_iter().map(|(_, frame)| frame).collect());
            self.index = 0;
        }
        let sorted = self.sorted.as_ref().unwrap();
        if self.index >= sorted.len() {
            return Ok(false);
        }
        *frame = sorted[self.index].clone();
        self.index += 1;
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.sorted = None;
        self.index = 0;
    }
}

struct SkipCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    expr: &'a Expr,
    skipped: bool,
}

impl Cursor for SkipCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.skipped {
            self.skipped = true;
            let count = evaluate(self.expr, frame, context)?.as_int()?;
            for _ in 0..count.max(0) {
                if !self.input.pull(frame, context)? {
                    return Ok(false);
                }
            }
        }
        self.input.pull(frame, context)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.skipped = false;
    }
}

struct LimitCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    expr: &'a Expr,
    remaining: Option<i64>,
}

impl Cursor for LimitCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        if self.remaining.is_none() {
            self.remaining = Some(evaluate(self.expr, frame, context)?.as_int()?.max(0));
        }
        let remaining = self.remaining.as_mut().unwrap();
        if *remaining == 0 {
            return Ok(false);
        }
        if self.input.pull(frame, context)? {
            *remaining -= 1;
            Ok(true)
        } else {
            *remaining = 0;
            Ok(false)
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.remaining = None;
    }
}

struct DistinctCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    symbols: &'a [Symbol],
    seen: HashSet<Vec<ValueKey>>,
}

impl Cursor for DistinctCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            if !self.input.pull(frame, context)? {
                return Ok(false);
            }
            let key = self
                .symbols
                .iter()
                .map(|symbol| frame.get(*symbol).key())
                .collect_vec();
            if self.seen.insert(key) {
                return Ok(true);
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.seen.clear();
    }
}

struct UnwindCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    expr: &'a Expr,
    output: Symbol,
    items: VecDeque<TypedValue>,
}

impl Cursor for UnwindCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            if let Some(item) = self.items.pop_front() {
                frame.set(self.output, item);
                return Ok(true);
            }
            if !self.input.pull(frame, context)? {
                return Ok(false);
            }
            self.items = match evaluate(self.expr, frame, context)? {
                TypedValue::List(items) => items.into(),
                TypedValue::Null => VecDeque::new(),
                other => {
                    return Err(QueryError::Type(format!(
                        "UNWIND expects a list, got {other:?}"
                    )))
                }
            };
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.items.clear();
    }
}

// ===== Mutations =====

fn create_node(
    node: &NodeCreationInfo,
    frame: &mut Frame,
    context: &ExecutionContext,
) -> QueryResult<VertexAccessor> {
    let vertex = context.accessor().insert_vertex()?;
    for label in &node.labels {
        vertex.add_label(*label)?;
    }
    for (property, expr) in &node.properties {
        let value = evaluate(expr, frame, context)?.into_property_value()?;
        vertex.set_property(*property, value)?;
    }
    frame.set(node.symbol, TypedValue::Vertex(vertex.clone()));
    Ok(vertex)
}

struct CreateNodeCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    node: &'a NodeCreationInfo,
}

impl Cursor for CreateNodeCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        context.check()?;
        if !self.input.pull(frame, context)? {
            return Ok(false);
        }
        create_node(self.node, frame, context)?;
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

struct CreateExpandCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    input_symbol: Symbol,
    node: &'a NodeCreationInfo,
    edge: &'a quiver_planner::operator::EdgeCreationInfo,
    existing_node: bool,
}

impl Cursor for CreateExpandCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        context.check()?;
        if !self.input.pull(frame, context)? {
            return Ok(false);
        }
        let near = frame.get(self.input_symbol).as_vertex()?.clone();
        let far = if self.existing_node {
            frame.get(self.node.symbol).as_vertex()?.clone()
        } else {
            create_node(self.node, frame, context)?
        };
        let (from, to) = match self.edge.direction {
            Direction::Out => (near.address(), far.address()),
            Direction::In => (far.address(), near.address()),
            Direction::Both => {
                return Err(QueryError::Type(
                    "created edges must be directed".to_owned(),
                ))
            }
        };
        let edge = context.accessor().insert_edge(from, to, self.edge.edge_type)?;
        for (property, expr) in &self.edge.properties {
            let value = evaluate(expr, frame, context)?.into_property_value()?;
            edge.set_property(*property, value)?;
        }
        frame.set(self.edge.symbol, TypedValue::Edge(edge));
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

struct SetPropertyCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    target: &'a Expr,
    value: &'a Expr,
}

impl Cursor for SetPropertyCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        context.check()?;
        if !self.input.pull(frame, context)? {
            return Ok(false);
        }
        let Expr::Property {
            expr: inner,
            property,
        } = self.target
        else {
            return Err(QueryError::Type(
                "property assignment needs a property target".to_owned(),
            ));
        };
        let property = context.accessor().property_id(property);
        let value = evaluate(self.value, frame, context)?.into_property_value()?;
        match evaluate(inner, frame, context)? {
            TypedValue::Vertex(vertex) => vertex.set_property(property, value)?,
            TypedValue::Edge(edge) => edge.set_property(property, value)?,
            TypedValue::Null => {}
            other => {
                return Err(QueryError::Type(format!(
                    "cannot set a property on {other:?}"
                )))
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

struct SetPropertiesCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    symbol: Symbol,
    value: &'a Expr,
    update: bool,
}

impl Cursor for SetPropertiesCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        context.check()?;
        if !self.input.pull(frame, context)? {
            return Ok(false);
        }
        // The source of a bulk property assignment is another graph
        // element; its current property map is copied over.
        let source = match evaluate(self.value, frame, context)? {
            TypedValue::Vertex(vertex) => vertex.current()?.properties,
            TypedValue::Edge(edge) => edge.current()?.properties,
            other => {
                return Err(QueryError::Type(format!(
                    "cannot copy properties from {other:?}"
                )))
            }
        };
        match frame.get(self.symbol).clone() {
            TypedValue::Vertex(vertex) => {
                if !self.update {
                    let existing = vertex.current()?;
                    for property in existing.properties.keys() {
                        vertex.set_property(*property, PropertyValue::Null)?;
                    }
                }
                for (property, value) in source {
                    vertex.set_property(property, value)?;
                }
            }
            TypedValue::Edge(edge) => {
                if !self.update {
                    let existing = edge.current()?;
                    for property in existing.properties.keys() {
                        edge.set_property(*property, PropertyValue::Null)?;
                    }
                }
                for (property, value) in source {
                    edge.set_property(property, value)?;
                }
            }
            TypedValue::Null => {}
            other => {
                return Err(QueryError::Type(format!(
                    "cannot set properties on {other:?}"
                )))
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

struct SetLabelsCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    symbol: Symbol,
    labels: &'a [quiver_common::LabelId],
    remove: bool,
}

impl Cursor for SetLabelsCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        context.check()?;
        if !self.input.pull(frame, context)? {
            return Ok(false);
        }
        match frame.get(self.symbol).clone() {
            TypedValue::Vertex(vertex) => {
                for label in self.labels {
                    if self.remove {
                        vertex.remove_label(*label)?;
                    } else {
                        vertex.add_label(*label)?;
                    }
                }
            }
            TypedValue::Null => {}
            other => {
                return Err(QueryError::Type(format!(
                    "labels can only change on vertices, got {other:?}"
                )))
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

struct DeleteCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    exprs: &'a [Expr],
    detach: bool,
}

impl Cursor for DeleteCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        context.check()?;
        if !self.input.pull(frame, context)? {
            return Ok(false);
        }
        for expr in self.exprs {
            match evaluate(expr, frame, context)? {
                TypedValue::Vertex(vertex) => {
                    match context.accessor().remove_vertex(&vertex, !self.detach) {
                        Ok(())
                        | Err(StorageError::RecordDeleted(_))
                        | Err(StorageError::NotFound(_)) => {}
                        Err(error) => return Err(error.into()),
                    }
                }
                TypedValue::Edge(edge) => {
                    match context.accessor().remove_edge(&edge, true, true) {
                        Ok(())
                        | Err(StorageError::RecordDeleted(_))
                        | Err(StorageError::NotFound(_)) => {}
                        Err(error) => return Err(error.into()),
                    }
                }
                TypedValue::Null => {}
                other => {
                    return Err(QueryError::Type(format!("cannot delete {other:?}")));
                }
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

// ===== Branching =====

enum MergeState {
    PullInput,
    Matching { matched: bool },
    Creating,
}

struct MergeCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    on_match: Box<dyn Cursor + 'a>,
    on_create: Box<dyn Cursor + 'a>,
    state: MergeState,
}

impl Cursor for MergeCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            match &mut self.state {
                MergeState::PullInput => {
                    if !self.input.pull(frame, context)? {
                        return Ok(false);
                    }
                    self.on_match.reset();
                    self.state = MergeState::Matching { matched: false };
                }
                MergeState::Matching { matched } => {
                    if self.on_match.pull(frame, context)? {
                        *matched = true;
                        return Ok(true);
                    }
                    if *matched {
                        self.state = MergeState::PullInput;
                    } else {
                        self.on_create.reset();
                        self.state = MergeState::Creating;
                    }
                }
                MergeState::Creating => {
                    if self.on_create.pull(frame, context)? {
                        return Ok(true);
                    }
                    self.state = MergeState::PullInput;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.on_match.reset();
        self.on_create.reset();
        self.state = MergeState::PullInput;
    }
}

struct OptionalCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    optional: Box<dyn Cursor + 'a>,
    optional_symbols: &'a [Symbol],
    row_active: bool,
    emitted: bool,
}

impl Cursor for OptionalCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            if self.row_active {
                if self.optional.pull(frame, context)? {
                    self.emitted = true;
                    return Ok(true);
                }
                self.row_active = false;
                if !self.emitted {
                    // No match: the optional bindings are null for this row.
                    for symbol in self.optional_symbols {
                        frame.set(*symbol, TypedValue::Null);
                    }
                    return Ok(true);
                }
            }
            if !self.input.pull(frame, context)? {
                return Ok(false);
            }
            self.optional.reset();
            self.row_active = true;
            self.emitted = false;
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.optional.reset();
        self.row_active = false;
        self.emitted = false;
    }
}

struct AccumulateCursor<'a> {
    input: Box<dyn Cursor + 'a>,
    symbols: &'a [Symbol],
    rows: Option<Vec<Vec<TypedValue>>>,
    index: usize,
}

impl Cursor for AccumulateCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        if self.rows.is_none() {
            let mut rows = Vec::new();
            while self.input.pull(frame, context)? {
                context.check()?;
                rows.push(frame.take_snapshot(self.symbols));
            }
            self.rows = Some(rows);
            self.index = 0;
        }
        let rows = self.rows.as_ref().unwrap();
        if self.index >= rows.len() {
            return Ok(false);
        }
        frame.restore_snapshot(self.symbols, &rows[self.index]);
        self.index += 1;
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.rows = None;
        self.index = 0;
    }
}

struct CartesianCursor<'a> {
    left: Box<dyn Cursor + 'a>,
    right: Box<dyn Cursor + 'a>,
    left_row: bool,
}

impl Cursor for CartesianCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            if self.left_row {
                if self.right.pull(frame, context)? {
                    return Ok(true);
                }
                self.left_row = false;
            }
            if !self.left.pull(frame, context)? {
                return Ok(false);
            }
            self.right.reset();
            self.left_row = true;
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.left_row = false;
    }
}

struct UnionCursor<'a> {
    left: Box<dyn Cursor + 'a>,
    right: Box<dyn Cursor + 'a>,
    distinct: bool,
    left_symbols: &'a [Symbol],
    right_symbols: &'a [Symbol],
    on_right: bool,
    seen: HashSet<Vec<ValueKey>>,
}

impl Cursor for UnionCursor<'_> {
    fn pull(&mut self, frame: &mut Frame, context: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            context.check()?;
            let pulled = if self.on_right {
                let pulled = self.right.pull(frame, context)?;
                if pulled {
                    // The right side's columns land in the left's slots.
                    for (right, left) in self.right_symbols.iter().zip(self.left_symbols) {
                        let value = frame.get(*right).clone();
                        frame.set(*left, value);
                    }
                }
                pulled
            } else {
                let pulled = self.left.pull(frame, context)?;
                if !pulled {
                    self.on_right = true;
                    continue;
                }
                pulled
            };
            if !pulled {
                return Ok(false);
            }
            if self.distinct {
                let key = self
                    .left_symbols
                    .iter()
                    .map(|symbol| frame.get(*symbol).key())
                    .collect_vec();
                if !self.seen.insert(key) {
                    continue;
                }
            }
            return Ok(true);
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.on_right = false;
        self.seen.clear();
    }
}
