//! Rule-based translation of the AST into a logical operator tree.
//!
//! Patterns are planned part by part: a scan is chosen for each part's
//! unbound start node from the filters that apply to it (value index scan
//! over range scan over label scan over full scan, lowest estimated
//! cardinality first), edges become expansions with uniqueness filters, and
//! parts that share no bindings with the plan so far are crossed in with
//! `Cartesian`. Write clauses flip a flag that forces an `Accumulate`
//! barrier in front of the next projection.

use std::collections::HashMap;
use std::mem;

use quiver_common::{LabelId, PropertyId};
use smol_str::SmolStr;

use crate::ast::*;
use crate::cost_estimator::CardParam;
use crate::error::{PlanError, PlanResult};
use crate::operator::{
    Aggregation, EdgeCreationInfo, LogicalOperator, NamedExpr, NodeCreationInfo, PlanningContext,
    RangeBound,
};
use crate::symbols::{Symbol, SymbolTable};

/// The planner's output: the operator tree, the symbol table sizing the
/// frames, and the named output columns of the final `RETURN` (empty for
/// write-only queries).
#[derive(Debug)]
pub struct PlannedQuery {
    pub root: LogicalOperator,
    pub symbol_table: SymbolTable,
    pub outputs: Vec<(SmolStr, Symbol)>,
}

pub fn plan_query<C: PlanningContext>(
    query: &CypherQuery,
    context: &C,
) -> PlanResult<PlannedQuery> {
    let mut symbols = SymbolTable::new();
    let (mut root, outputs) = plan_single(&query.first, context, &mut symbols)?;
    let left_outputs = outputs;
    for (all, single) in &query.unions {
        let (right, right_outputs) = plan_single(single, context, &mut symbols)?;
        if right_outputs.len() != left_outputs.len()
            || right_outputs
                .iter()
                .zip(left_outputs.iter())
                .any(|((right_name, _), (left_name, _))| right_name != left_name)
        {
            return Err(PlanError::UnionColumnMismatch);
        }
        root = LogicalOperator::Union {
            left: Box::new(root),
            right: Box::new(right),
            distinct: !*all,
            left_symbols: left_outputs.iter().map(|(_, symbol)| *symbol).collect(),
            right_symbols: right_outputs.iter().map(|(_, symbol)| *symbol).collect(),
        };
    }
    Ok(PlannedQuery {
        root,
        symbol_table: symbols,
        outputs: left_outputs,
    })
}

fn plan_single<C: PlanningContext>(
    query: &SingleQuery,
    context: &C,
    symbols: &mut SymbolTable,
) -> PlanResult<(LogicalOperator, Vec<(SmolStr, Symbol)>)> {
    let mut builder = PlanBuilder {
        context,
        symbols,
        bindings: HashMap::new(),
        op: LogicalOperator::Once,
        has_write: false,
        outputs: Vec::new(),
        anon_counter: 0,
    };
    for clause in &query.clauses {
        builder.plan_clause(clause)?;
    }
    Ok((builder.op, builder.outputs))
}

/// Property filters extracted from `WHERE` and inline pattern maps, indexed
/// by variable name. Consumed entries fed a scan; the rest become `Filter`
/// operators.
#[derive(Debug, Default)]
struct FilterInfo {
    labels: HashMap<String, Vec<String>>,
    equalities: Vec<(String, String, Expr)>,
    ranges: Vec<(String, String, RangeBound, bool)>,
    general: Vec<Expr>,
}

fn expr_uses_ident(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Identifier(ident) => ident == name,
        Expr::Literal(_) | Expr::Parameter(_) | Expr::SymbolRef(_) => false,
        Expr::Property { expr, .. } | Expr::HasLabel { expr, .. } | Expr::Unary { expr, .. } => {
            expr_uses_ident(expr, name)
        }
        Expr::Binary { lhs, rhs, .. } => expr_uses_ident(lhs, name) || expr_uses_ident(rhs, name),
        Expr::ListLiteral(items) => items.iter().any(|item| expr_uses_ident(item, name)),
        Expr::Aggregation { expr, .. } => expr
            .as_ref()
            .map(|expr| expr_uses_ident(expr, name))
            .unwrap_or(false),
    }
}

impl FilterInfo {
    fn collect_where(&mut self, expr: &Expr) {
        if let Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } = expr
        {
            self.collect_where(lhs);
            self.collect_where(rhs);
            return;
        }
        if let Some(()) = self.try_classify(expr) {
            return;
        }
        self.general.push(expr.clone());
    }

    fn try_classify(&mut self, expr: &Expr) -> Option<()> {
        match expr {
            Expr::HasLabel { expr, label } => {
                if let Expr::Identifier(variable) = expr.as_ref() {
                    self.labels
                        .entry(variable.clone())
                        .or_default()
                        .push(label.clone());
                    return Some(());
                }
                None
            }
            Expr::Binary { op, lhs, rhs } => {
                let (variable, property, value, op) = match (lhs.as_ref(), rhs.as_ref()) {
                    (
                        Expr::Property {
                            expr: target,
                            property,
                        },
                        value,
                    ) => match target.as_ref() {
                        Expr::Identifier(variable) if !expr_uses_ident(value, variable) => {
                            (variable.clone(), property.clone(), value.clone(), *op)
                        }
                        _ => return None,
                    },
                    (
                        value,
                        Expr::Property {
                            expr: target,
                            property,
                        },
                    ) => match target.as_ref() {
                        Expr::Identifier(variable) if !expr_uses_ident(value, variable) => {
                            // `v < n.p` reads as `n.p > v`.
                            let flipped = match op {
                                BinaryOp::Lt => BinaryOp::Gt,
                                BinaryOp::LtEq => BinaryOp::GtEq,
                                BinaryOp::Gt => BinaryOp::Lt,
                                BinaryOp::GtEq => BinaryOp::LtEq,
                                other => *other,
                            };
                            (variable.clone(), property.clone(), value.clone(), flipped)
                        }
                        _ => return None,
                    },
                    _ => return None,
                };
                match op {
                    BinaryOp::Eq => {
                        self.equalities.push((variable, property, value));
                        Some(())
                    }
                    BinaryOp::Lt => {
                        self.ranges
                            .push((variable, property, RangeBound::Exclusive(value), false));
                        Some(())
                    }
                    BinaryOp::LtEq => {
                        self.ranges
                            .push((variable, property, RangeBound::Inclusive(value), false));
                        Some(())
                    }
                    BinaryOp::Gt => {
                        self.ranges
                            .push((variable, property, RangeBound::Exclusive(value), true));
                        Some(())
                    }
                    BinaryOp::GtEq => {
                        self.ranges
                            .push((variable, property, RangeBound::Inclusive(value), true));
                        Some(())
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

struct PlanBuilder<'a, C: PlanningContext> {
    context: &'a C,
    symbols: &'a mut SymbolTable,
    bindings: HashMap<String, Symbol>,
    op: LogicalOperator,
    has_write: bool,
    outputs: Vec<(SmolStr, Symbol)>,
    anon_counter: usize,
}

impl<'a, C: PlanningContext> PlanBuilder<'a, C> {
    fn plan_clause(&mut self, clause: &Clause) -> PlanResult<()> {
        match clause {
            Clause::Match(match_clause) => self.plan_match(match_clause),
            Clause::Create(create) => self.plan_create(&create.pattern),
            Clause::Merge(merge) => self.plan_merge(merge),
            Clause::Delete(delete) => self.plan_delete(delete),
            Clause::Set(items) => self.plan_set(items),
            Clause::Remove(items) => self.plan_remove(items),
            Clause::Unwind(unwind) => self.plan_unwind(unwind),
            Clause::With(body) => self.plan_projection(body, false),
            Clause::Return(body) => self.plan_projection(body, true),
        }
    }

    fn anon(&mut self, prefix: &str) -> String {
        self.anon_counter += 1;
        format!("anon{}_{prefix}", self.anon_counter)
    }

    fn bind(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.bindings.get(name) {
            return *symbol;
        }
        // Reuse an out-of-scope slot of the same name if one exists so the
        // two branches of a MERGE bind identically.
        let symbol = self.symbols.get_or_create(name);
        self.bindings.insert(name.to_owned(), symbol);
        symbol
    }

    fn resolve(&self, expr: &Expr) -> PlanResult<Expr> {
        Ok(match expr {
            Expr::Identifier(name) => Expr::SymbolRef(
                *self
                    .bindings
                    .get(name)
                    .ok_or_else(|| PlanError::UnknownIdentifier(name.clone()))?,
            ),
            Expr::Literal(_) | Expr::Parameter(_) | Expr::SymbolRef(_) => expr.clone(),
            Expr::Property {
                expr: inner,
                property,
            } => Expr::Property {
                expr: Box::new(self.resolve(inner)?),
                property: property.clone(),
            },
            Expr::HasLabel { expr: inner, label } => Expr::HasLabel {
                expr: Box::new(self.resolve(inner)?),
                label: label.clone(),
            },
            Expr::Unary { op, expr: inner } => Expr::Unary {
                op: *op,
                expr: Box::new(self.resolve(inner)?),
            },
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(self.resolve(lhs)?),
                rhs: Box::new(self.resolve(rhs)?),
            },
            Expr::ListLiteral(items) => Expr::ListLiteral(
                items
                    .iter()
                    .map(|item| self.resolve(item))
                    .collect::<PlanResult<_>>()?,
            ),
            Expr::Aggregation { op, expr: inner } => Expr::Aggregation {
                op: *op,
                expr: match inner {
                    Some(inner) => Some(Box::new(self.resolve(inner)?)),
                    None => None,
                },
            },
        })
    }

    // ===== MATCH =====

    fn plan_match(&mut self, match_clause: &Match) -> PlanResult<()> {
        if match_clause.optional {
            let saved_bindings = self.bindings.clone();
            let input = mem::replace(&mut self.op, LogicalOperator::Once);
            self.plan_pattern_reading(&match_clause.pattern, match_clause.where_clause.as_ref())?;
            let optional = mem::replace(&mut self.op, input);
            let optional_symbols = self
                .bindings
                .iter()
                .filter(|(name, _)| !saved_bindings.contains_key(*name))
                .map(|(_, symbol)| *symbol)
                .collect();
            self.op = LogicalOperator::Optional {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                optional: Box::new(optional),
                optional_symbols,
            };
            Ok(())
        } else {
            self.plan_pattern_reading(&match_clause.pattern, match_clause.where_clause.as_ref())
        }
    }

    fn plan_pattern_reading(
        &mut self,
        pattern: &Pattern,
        where_clause: Option<&Expr>,
    ) -> PlanResult<()> {
        let mut filters = FilterInfo::default();
        if let Some(expr) = where_clause {
            filters.collect_where(expr);
        }
        // Give every node and edge a variable up front, then fold the inline
        // labels and property maps into the filter pool.
        let parts: Vec<PatternPart> = pattern
            .parts
            .iter()
            .map(|part| self.normalize_part(part))
            .collect();
        for part in &parts {
            self.note_node_filters(&part.start, &mut filters);
            for (_, node) in &part.steps {
                self.note_node_filters(node, &mut filters);
            }
        }

        let mut pattern_edge_symbols: Vec<Symbol> = Vec::new();
        for part in &parts {
            let connected = self.part_shares_binding(part);
            if matches!(self.op, LogicalOperator::Once) || connected {
                self.plan_part(part, &mut filters, &mut pattern_edge_symbols)?;
            } else {
                // Disconnected component: plan it standalone and cross it in.
                let left = mem::replace(&mut self.op, LogicalOperator::Once);
                self.plan_part(part, &mut filters, &mut pattern_edge_symbols)?;
                let right = mem::replace(&mut self.op, LogicalOperator::Once);
                self.op = LogicalOperator::Cartesian {
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
        }

        // Whatever the scans did not consume becomes explicit filters.
        for (variable, labels) in mem::take(&mut filters.labels) {
            for label in labels {
                let expr = self.resolve(&Expr::HasLabel {
                    expr: Box::new(Expr::Identifier(variable.clone())),
                    label,
                })?;
                self.push_filter(expr);
            }
        }
        for (variable, property, value) in mem::take(&mut filters.equalities) {
            let expr = self.resolve(&Expr::binary(
                BinaryOp::Eq,
                Expr::Property {
                    expr: Box::new(Expr::Identifier(variable)),
                    property,
                },
                value,
            ))?;
            self.push_filter(expr);
        }
        for (variable, property, bound, is_lower) in mem::take(&mut filters.ranges) {
            let op = match (&bound, is_lower) {
                (RangeBound::Inclusive(_), true) => BinaryOp::GtEq,
                (RangeBound::Exclusive(_), true) => BinaryOp::Gt,
                (RangeBound::Inclusive(_), false) => BinaryOp::LtEq,
                (RangeBound::Exclusive(_), false) => BinaryOp::Lt,
            };
            let expr = self.resolve(&Expr::binary(
                op,
                Expr::Property {
                    expr: Box::new(Expr::Identifier(variable)),
                    property,
                },
                bound.expr().clone(),
            ))?;
            self.push_filter(expr);
        }
        for expr in mem::take(&mut filters.general) {
            let expr = self.resolve(&expr)?;
            self.push_filter(expr);
        }
        Ok(())
    }

    fn normalize_part(&mut self, part: &PatternPart) -> PatternPart {
        let mut normalized = part.clone();
        if normalized.start.variable.is_none() {
            normalized.start.variable = Some(self.anon("node"));
        }
        for (edge, node) in &mut normalized.steps {
            if edge.variable.is_none() {
                edge.variable = Some(self.anon("edge"));
            }
            if node.variable.is_none() {
                node.variable = Some(self.anon("node"));
            }
        }
        normalized
    }

    fn note_node_filters(&self, node: &NodePattern, filters: &mut FilterInfo) {
        let variable = node.variable.clone().unwrap();
        for label in &node.labels {
            filters
                .labels
                .entry(variable.clone())
                .or_default()
                .push(label.clone());
        }
        for (property, value) in &node.properties {
            filters
                .equalities
                .push((variable.clone(), property.clone(), value.clone()));
        }
    }

    fn part_shares_binding(&self, part: &PatternPart) -> bool {
        let mut names = vec![part.start.variable.as_deref().unwrap()];
        for (edge, node) in &part.steps {
            names.push(edge.variable.as_deref().unwrap());
            names.push(node.variable.as_deref().unwrap());
        }
        names.iter().any(|name| self.bindings.contains_key(*name))
    }

    fn plan_part(
        &mut self,
        part: &PatternPart,
        filters: &mut FilterInfo,
        pattern_edge_symbols: &mut Vec<Symbol>,
    ) -> PlanResult<()> {
        let start_name = part.start.variable.clone().unwrap();
        let mut path_symbols = Vec::new();
        if !self.bindings.contains_key(&start_name) {
            self.plan_scan(&start_name, filters)?;
        }
        let mut previous = self.bindings[&start_name];
        path_symbols.push(previous);

        for (edge, node) in &part.steps {
            let edge_name = edge.variable.clone().unwrap();
            let node_name = node.variable.clone().unwrap();
            if self.bindings.contains_key(&edge_name) {
                return Err(PlanError::InvalidUse(edge_name));
            }
            let existing_node = self.bindings.contains_key(&node_name);
            let edge_symbol = self.bind(&edge_name);
            let node_symbol = self.bind(&node_name);
            let edge_types = edge
                .types
                .iter()
                .map(|name| self.context.edge_type_id(name))
                .collect();
            let input = Box::new(mem::replace(&mut self.op, LogicalOperator::Once));
            self.op = match &edge.kind {
                EdgePatternKind::Single => LogicalOperator::Expand {
                    input,
                    input_symbol: previous,
                    node_symbol,
                    edge_symbol,
                    direction: edge.direction,
                    edge_types,
                    existing_node,
                },
                EdgePatternKind::Variable { lower, upper }
                | EdgePatternKind::BreadthFirst { lower, upper } => {
                    if let (Some(lower), Some(upper)) = (lower, upper) {
                        if lower > upper {
                            return Err(PlanError::InvalidRange);
                        }
                    }
                    LogicalOperator::ExpandVariable {
                        input,
                        input_symbol: previous,
                        node_symbol,
                        edge_symbol,
                        direction: edge.direction,
                        edge_types,
                        lower: *lower,
                        upper: *upper,
                        breadth_first: matches!(edge.kind, EdgePatternKind::BreadthFirst { .. }),
                        existing_node,
                    }
                }
            };
            // Inline edge property maps become plain filters.
            for (property, value) in &edge.properties {
                let expr = self.resolve(&Expr::binary(
                    BinaryOp::Eq,
                    Expr::Property {
                        expr: Box::new(Expr::Identifier(edge_name.clone())),
                        property: property.clone(),
                    },
                    value.clone(),
                ))?;
                self.push_filter(expr);
            }
            if !pattern_edge_symbols.is_empty() {
                self.op = LogicalOperator::EdgeUniquenessFilter {
                    input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                    expand_symbol: edge_symbol,
                    previous_symbols: pattern_edge_symbols.clone(),
                };
            }
            pattern_edge_symbols.push(edge_symbol);
            path_symbols.push(edge_symbol);
            path_symbols.push(node_symbol);
            previous = node_symbol;
        }

        if let Some(path_name) = &part.path_name {
            let path_symbol = self.bind(path_name);
            self.op = LogicalOperator::ConstructNamedPath {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                path_symbol,
                symbols: path_symbols,
            };
        }
        Ok(())
    }

    /// Scan selection for one unbound pattern node: indexed equality, then
    /// indexed range, then label, then full scan. Among applicable indexes
    /// the lowest estimated cardinality wins, ties broken by label id.
    fn plan_scan(&mut self, variable: &str, filters: &mut FilterInfo) -> PlanResult<()> {
        let labels = filters.labels.get(variable).cloned().unwrap_or_default();
        let label_ids: Vec<(LabelId, String)> = labels
            .iter()
            .map(|name| (self.context.label_id(name), name.clone()))
            .collect();
        let output = self.bind(variable);
        let input = Box::new(mem::replace(&mut self.op, LogicalOperator::Once));

        // Indexed equality first.
        let mut best_value: Option<(usize, LabelId, String, PropertyId, usize)> = None;
        for (label, label_name) in &label_ids {
            for (index, (var, property, value)) in filters.equalities.iter().enumerate() {
                if var != variable {
                    continue;
                }
                let property_id = self.context.property_id(property);
                if !self.context.label_property_index_exists(*label, property_id) {
                    continue;
                }
                let estimate = match value {
                    Expr::Literal(literal) => {
                        self.context.vertices_count_by_value(*label, property_id, literal)
                    }
                    _ => {
                        (self
                            .context
                            .vertices_count_by_label_property(*label, property_id)
                            as f64
                            * CardParam::FILTER) as usize
                    }
                };
                let better = match &best_value {
                    None => true,
                    Some((_, best_label, _, _, best_estimate)) => {
                        estimate < *best_estimate
                            || (estimate == *best_estimate && label < best_label)
                    }
                };
                if better {
                    best_value = Some((index, *label, label_name.clone(), property_id, estimate));
                }
            }
        }
        if let Some((index, label, label_name, property, _)) = best_value {
            let (_, _, value) = filters.equalities.remove(index);
            consume_label(&mut filters.labels, variable, &label_name);
            let expr = self.resolve(&value)?;
            self.op = LogicalOperator::ScanAllByLabelPropertyValue {
                input,
                output,
                label,
                property,
                expr,
            };
            return Ok(());
        }

        // Then an indexed range.
        let mut best_range: Option<(LabelId, String, PropertyId, String, usize)> = None;
        for (label, label_name) in &label_ids {
            for (var, property, _, _) in filters.ranges.iter() {
                if var != variable {
                    continue;
                }
                let property_id = self.context.property_id(property);
                if !self.context.label_property_index_exists(*label, property_id) {
                    continue;
                }
                let estimate = self
                    .context
                    .vertices_count_by_label_property(*label, property_id);
                let better = match &best_range {
                    None => true,
                    Some((best_label, _, _, _, best_estimate)) => {
                        estimate < *best_estimate
                            || (estimate == *best_estimate && label < best_label)
                    }
                };
                if better {
                    best_range = Some((
                        *label,
                        label_name.clone(),
                        property_id,
                        property.clone(),
                        estimate,
                    ));
                }
            }
        }
        if let Some((label, label_name, property_id, property_name, _)) = best_range {
            let mut lower = None;
            let mut upper = None;
            let mut remaining = Vec::new();
            for (var, property, bound, is_lower) in mem::take(&mut filters.ranges) {
                if var == variable && property == property_name {
                    let bound = match bound {
                        RangeBound::Inclusive(expr) => RangeBound::Inclusive(self.resolve(&expr)?),
                        RangeBound::Exclusive(expr) => RangeBound::Exclusive(self.resolve(&expr)?),
                    };
                    let slot = if is_lower { &mut lower } else { &mut upper };
                    if slot.is_none() {
                        *slot = Some(bound);
                        continue;
                    }
                    // A second bound on the same side stays behind and is
                    // lowered to a plain filter with the rest.
                    remaining.push((var, property, bound, is_lower));
                    continue;
                }
                remaining.push((var, property, bound, is_lower));
            }
            filters.ranges = remaining;
            consume_label(&mut filters.labels, variable, &label_name);
            self.op = LogicalOperator::ScanAllByLabelPropertyRange {
                input,
                output,
                label,
                property: property_id,
                lower,
                upper,
            };
            return Ok(());
        }

        // A label scan, cheapest label first.
        if !label_ids.is_empty() {
            let (label, label_name) = label_ids
                .iter()
                .min_by_key(|(label, _)| (self.context.vertices_count_by_label(*label), *label))
                .cloned()
                .unwrap();
            consume_label(&mut filters.labels, variable, &label_name);
            self.op = LogicalOperator::ScanAllByLabel {
                input,
                output,
                label,
            };
            return Ok(());
        }

        self.op = LogicalOperator::ScanAll { input, output };
        Ok(())
    }

    fn push_filter(&mut self, expr: Expr) {
        self.op = LogicalOperator::Filter {
            input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
            expr,
        };
    }

    // ===== CREATE / MERGE =====

    fn plan_create(&mut self, pattern: &Pattern) -> PlanResult<()> {
        for part in &pattern.parts {
            let part = self.normalize_part(part);
            self.plan_create_part(&part)?;
        }
        self.has_write = true;
        Ok(())
    }

    fn plan_create_part(&mut self, part: &PatternPart) -> PlanResult<()> {
        let start_name = part.start.variable.clone().unwrap();
        let mut previous = if self.bindings.contains_key(&start_name) {
            self.bindings[&start_name]
        } else {
            let node = self.node_creation_info(&part.start)?;
            let symbol = node.symbol;
            self.op = LogicalOperator::CreateNode {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                node,
            };
            symbol
        };
        for (edge, node) in &part.steps {
            if edge.kind != EdgePatternKind::Single {
                return Err(PlanError::InvalidUse("variable-length create".into()));
            }
            if edge.direction == Direction::Both {
                return Err(PlanError::InvalidUse("undirected create".into()));
            }
            let node_name = node.variable.clone().unwrap();
            let existing_node = self.bindings.contains_key(&node_name);
            let node_info = self.node_creation_info(node)?;
            let edge_name = edge.variable.clone().unwrap();
            if self.bindings.contains_key(&edge_name) {
                return Err(PlanError::InvalidUse(edge_name));
            }
            let edge_info = EdgeCreationInfo {
                symbol: self.bind(&edge_name),
                edge_type: edge
                    .types
                    .first()
                    .map(|name| self.context.edge_type_id(name))
                    .ok_or_else(|| PlanError::InvalidUse("edge type required".into()))?,
                direction: edge.direction,
                properties: edge
                    .properties
                    .iter()
                    .map(|(name, value)| {
                        Ok((self.context.property_id(name), self.resolve(value)?))
                    })
                    .collect::<PlanResult<_>>()?,
            };
            let next = node_info.symbol;
            self.op = LogicalOperator::CreateExpand {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                input_symbol: previous,
                node: node_info,
                edge: edge_info,
                existing_node,
            };
            previous = next;
        }
        Ok(())
    }

    fn node_creation_info(&mut self, node: &NodePattern) -> PlanResult<NodeCreationInfo> {
        let name = node.variable.clone().unwrap();
        Ok(NodeCreationInfo {
            symbol: self.bind(&name),
            labels: node
                .labels
                .iter()
                .map(|label| self.context.label_id(label))
                .collect(),
            properties: node
                .properties
                .iter()
                .map(|(name, value)| Ok((self.context.property_id(name), self.resolve(value)?)))
                .collect::<PlanResult<_>>()?,
        })
    }

    fn plan_merge(&mut self, merge: &Merge) -> PlanResult<()> {
        let part = self.normalize_part(&merge.part);
        let input = mem::replace(&mut self.op, LogicalOperator::Once);
        let saved_bindings = self.bindings.clone();

        // Both branches bind the same symbols: names resolve through the
        // shared symbol table.
        let mut filters = FilterInfo::default();
        self.note_node_filters(&part.start, &mut filters);
        for (_, node) in &part.steps {
            self.note_node_filters(node, &mut filters);
        }
        let mut edge_symbols = Vec::new();
        self.plan_part(&part, &mut filters, &mut edge_symbols)?;
        // Leftover label/property filters of the match branch.
        let match_bindings = self.bindings.clone();
        for (variable, labels) in mem::take(&mut filters.labels) {
            for label in labels {
                let expr = self.resolve(&Expr::HasLabel {
                    expr: Box::new(Expr::Identifier(variable.clone())),
                    label,
                })?;
                self.push_filter(expr);
            }
        }
        for (variable, property, value) in mem::take(&mut filters.equalities) {
            let expr = self.resolve(&Expr::binary(
                BinaryOp::Eq,
                Expr::Property {
                    expr: Box::new(Expr::Identifier(variable)),
                    property,
                },
                value,
            ))?;
            self.push_filter(expr);
        }
        let on_match = mem::replace(&mut self.op, LogicalOperator::Once);

        self.bindings = saved_bindings;
        self.plan_create_part(&part)?;
        let on_create = mem::replace(&mut self.op, LogicalOperator::Once);
        self.bindings = match_bindings;

        self.op = LogicalOperator::Merge {
            input: Box::new(input),
            on_match: Box::new(on_match),
            on_create: Box::new(on_create),
        };
        self.has_write = true;
        Ok(())
    }

    // ===== Writes on bound variables =====

    fn plan_delete(&mut self, delete: &Delete) -> PlanResult<()> {
        let exprs = delete
            .exprs
            .iter()
            .map(|expr| self.resolve(expr))
            .collect::<PlanResult<_>>()?;
        self.op = LogicalOperator::Delete {
            input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
            exprs,
            detach: delete.detach,
        };
        self.has_write = true;
        Ok(())
    }

    fn plan_set(&mut self, items: &[SetItem]) -> PlanResult<()> {
        for item in items {
            match item {
                SetItem::Property { target, value } => {
                    let target = self.resolve(target)?;
                    let value = self.resolve(value)?;
                    self.op = LogicalOperator::SetProperty {
                        input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                        target,
                        value,
                    };
                }
                SetItem::Properties {
                    variable,
                    value,
                    update,
                } => {
                    let symbol = *self
                        .bindings
                        .get(variable)
                        .ok_or_else(|| PlanError::UnknownIdentifier(variable.clone()))?;
                    let value = self.resolve(value)?;
                    self.op = LogicalOperator::SetProperties {
                        input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                        symbol,
                        value,
                        update: *update,
                    };
                }
                SetItem::Labels { variable, labels } => {
                    let symbol = *self
                        .bindings
                        .get(variable)
                        .ok_or_else(|| PlanError::UnknownIdentifier(variable.clone()))?;
                    self.op = LogicalOperator::SetLabels {
                        input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                        symbol,
                        labels: labels
                            .iter()
                            .map(|label| self.context.label_id(label))
                            .collect(),
                    };
                }
            }
        }
        self.has_write = true;
        Ok(())
    }

    fn plan_remove(&mut self, items: &[RemoveItem]) -> PlanResult<()> {
        for item in items {
            match item {
                RemoveItem::Property { target } => {
                    let target = self.resolve(target)?;
                    self.op = LogicalOperator::RemoveProperty {
                        input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                        target,
                    };
                }
                RemoveItem::Labels { variable, labels } => {
                    let symbol = *self
                        .bindings
                        .get(variable)
                        .ok_or_else(|| PlanError::UnknownIdentifier(variable.clone()))?;
                    self.op = LogicalOperator::RemoveLabels {
                        input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                        symbol,
                        labels: labels
                            .iter()
                            .map(|label| self.context.label_id(label))
                            .collect(),
                    };
                }
            }
        }
        self.has_write = true;
        Ok(())
    }

    fn plan_unwind(&mut self, unwind: &Unwind) -> PlanResult<()> {
        let expr = self.resolve(&unwind.expr)?;
        if expr.has_aggregation() {
            return Err(PlanError::MisplacedAggregation("UNWIND"));
        }
        let output = self.bind(&unwind.variable);
        self.op = LogicalOperator::Unwind {
            input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
            expr,
            output,
        };
        Ok(())
    }

    // ===== WITH / RETURN =====

    fn plan_projection(&mut self, body: &ProjectionBody, is_return: bool) -> PlanResult<()> {
        // Writes in earlier clauses must land before anything downstream
        // reads.
        if self.has_write {
            let symbols = self.bindings.values().copied().collect();
            self.op = LogicalOperator::Accumulate {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                symbols,
            };
            self.has_write = false;
        }

        let has_aggregation = body.items.iter().any(|(expr, _)| expr.has_aggregation());
        let mut projection: Vec<(SmolStr, Symbol)> = Vec::new();
        let mut named_exprs: Vec<NamedExpr> = Vec::new();

        if has_aggregation {
            let mut aggregations = Vec::new();
            let mut group_by = Vec::new();
            for (index, (expr, alias)) in body.items.iter().enumerate() {
                let name = SmolStr::new(
                    alias
                        .clone()
                        .unwrap_or_else(|| display_name(expr, index)),
                );
                match expr {
                    Expr::Aggregation { op, expr: inner } => {
                        let inner = match inner {
                            Some(inner) => {
                                if inner.has_aggregation() {
                                    return Err(PlanError::MisplacedAggregation("aggregation"));
                                }
                                Some(self.resolve(inner)?)
                            }
                            None => None,
                        };
                        let output = self.symbols.create(&name);
                        aggregations.push(Aggregation {
                            op: *op,
                            expr: inner,
                            output,
                        });
                        projection.push((name.clone(), output));
                        named_exprs.push(NamedExpr {
                            expr: Expr::SymbolRef(output),
                            name,
                            symbol: output,
                        });
                    }
                    _ if expr.has_aggregation() => {
                        return Err(PlanError::MisplacedAggregation("a composite projection"));
                    }
                    _ => {
                        let resolved = self.resolve(expr)?;
                        let output = self.symbols.create(&name);
                        group_by.push((resolved, output));
                        projection.push((name.clone(), output));
                        named_exprs.push(NamedExpr {
                            expr: Expr::SymbolRef(output),
                            name,
                            symbol: output,
                        });
                    }
                }
            }
            self.op = LogicalOperator::Aggregate {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                aggregations,
                group_by,
            };
        } else {
            for (index, (expr, alias)) in body.items.iter().enumerate() {
                let name = SmolStr::new(
                    alias
                        .clone()
                        .unwrap_or_else(|| display_name(expr, index)),
                );
                let resolved = self.resolve(expr)?;
                let output = self.symbols.create(&name);
                projection.push((name.clone(), output));
                named_exprs.push(NamedExpr {
                    expr: resolved,
                    name,
                    symbol: output,
                });
            }
        }

        self.op = LogicalOperator::Produce {
            input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
            named_exprs,
        };

        // The projection narrows the scope to its own columns.
        self.bindings = projection
            .iter()
            .map(|(name, symbol)| (name.to_string(), *symbol))
            .collect();

        if let Some(where_clause) = &body.where_clause {
            let expr = self.resolve(where_clause)?;
            self.push_filter(expr);
        }
        if body.distinct {
            self.op = LogicalOperator::Distinct {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                symbols: projection.iter().map(|(_, symbol)| *symbol).collect(),
            };
        }
        if !body.order_by.is_empty() {
            let order = body
                .order_by
                .iter()
                .map(|item| Ok((self.resolve(&item.expr)?, item.ascending)))
                .collect::<PlanResult<_>>()?;
            self.op = LogicalOperator::OrderBy {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                order,
            };
        }
        if let Some(skip) = &body.skip {
            let expr = self.resolve(skip)?;
            self.op = LogicalOperator::Skip {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                expr,
            };
        }
        if let Some(limit) = &body.limit {
            let expr = self.resolve(limit)?;
            self.op = LogicalOperator::Limit {
                input: Box::new(mem::replace(&mut self.op, LogicalOperator::Once)),
                expr,
            };
        }
        if is_return {
            self.outputs = projection;
        }
        Ok(())
    }
}

fn consume_label(labels: &mut HashMap<String, Vec<String>>, variable: &str, label: &str) {
    if let Some(list) = labels.get_mut(variable) {
        if let Some(position) = list.iter().position(|existing| existing == label) {
            list.remove(position);
        }
        if list.is_empty() {
            labels.remove(variable);
        }
    }
}

fn display_name(expr: &Expr, index: usize) -> String {
    match expr {
        Expr::Identifier(name) => name.clone(),
        Expr::Property { expr, property } => match expr.as_ref() {
            Expr::Identifier(name) => format!("{name}.{property}"),
            _ => format!("column{index}"),
        },
        Expr::Aggregation { op, .. } => format!("{op:?}").to_lowercase(),
        _ => format!("column{index}"),
    }
}
