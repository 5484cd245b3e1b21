//! Plan cost estimation: a fold over the operator tree computing
//! `(cost, cardinality)` bottom-up. A pipeline `op1 -> op2` costs
//! `cost(op1) + cardinality(op1) * cost(op2)`.

use quiver_common::PropertyValue;

use crate::ast::Expr;
use crate::operator::{LogicalOperator, PlanningContext, RangeBound};

/// Cost of producing one row, per operator kind. All strictly positive;
/// tunable, but tests pin the relationships between them.
pub struct CostParam;

impl CostParam {
    pub const SCAN_ALL: f64 = 1.0;
    pub const SCAN_ALL_BY_LABEL: f64 = 1.1;
    pub const SCAN_ALL_BY_LABEL_PROPERTY_VALUE: f64 = 1.1;
    pub const SCAN_ALL_BY_LABEL_PROPERTY_RANGE: f64 = 1.1;
    pub const EXPAND: f64 = 2.0;
    pub const EXPAND_VARIABLE: f64 = 3.0;
    pub const EXPAND_BREADTH_FIRST: f64 = 5.0;
    pub const FILTER: f64 = 1.5;
    pub const EDGE_UNIQUENESS_FILTER: f64 = 1.5;
    pub const UNWIND: f64 = 1.3;
}

/// Cardinality multipliers. The filter multipliers are strictly below one.
pub struct CardParam;

impl CardParam {
    pub const EXPAND: f64 = 3.0;
    pub const EXPAND_VARIABLE: f64 = 9.0;
    pub const EXPAND_BREADTH_FIRST: f64 = 25.0;
    pub const FILTER: f64 = 0.25;
    pub const EDGE_UNIQUENESS_FILTER: f64 = 0.95;
}

pub struct MiscParam;

impl MiscParam {
    /// Rows assumed from unwinding an expression of unknown size.
    pub const UNWIND_NO_LITERAL: f64 = 10.0;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub cost: f64,
    pub cardinality: f64,
}

impl CostEstimate {
    fn start() -> Self {
        CostEstimate {
            cost: 0.0,
            cardinality: 1.0,
        }
    }

    /// Scans and expansions: the emitted cardinality drives the added cost.
    fn scale_then_charge(&mut self, multiplier: f64, cost_param: f64) {
        self.cardinality *= multiplier;
        self.cost += self.cardinality * cost_param;
    }

    /// Filter-shaped operators: every incoming row pays the cost, then the
    /// cardinality shrinks.
    fn charge_then_scale(&mut self, cost_param: f64, multiplier: f64) {
        self.cost += self.cardinality * cost_param;
        self.cardinality *= multiplier;
    }
}

fn literal_value(expr: &Expr) -> Option<&PropertyValue> {
    match expr {
        Expr::Literal(value) => Some(value),
        _ => None,
    }
}

fn bound_literal(bound: Option<&RangeBound>) -> Option<(&PropertyValue, bool)> {
    bound.and_then(|bound| literal_value(bound.expr()).map(|value| (value, bound.is_inclusive())))
}

/// Estimates the cost of the whole plan against the given statistics.
pub fn estimate_cost<C: PlanningContext>(plan: &LogicalOperator, context: &C) -> CostEstimate {
    use LogicalOperator::*;
    let mut estimate = match plan.input() {
        Some(input) => estimate_cost(input, context),
        None => CostEstimate::start(),
    };
    match plan {
        Once => {}
        ScanAll { .. } => {
            estimate.scale_then_charge(context.vertices_count() as f64, CostParam::SCAN_ALL);
        }
        ScanAllByLabel { label, .. } => {
            estimate.scale_then_charge(
                context.vertices_count_by_label(*label) as f64,
                CostParam::SCAN_ALL_BY_LABEL,
            );
        }
        ScanAllByLabelPropertyValue {
            label,
            property,
            expr,
            ..
        } => {
            // A literal lets the index give the exact emitted count; any
            // other expression degrades to the property count times the
            // filter selectivity.
            let multiplier = match literal_value(expr) {
                Some(value) => context.vertices_count_by_value(*label, *property, value) as f64,
                None => {
                    context.vertices_count_by_label_property(*label, *property) as f64
                        * CardParam::FILTER
                }
            };
            estimate.scale_then_charge(multiplier, CostParam::SCAN_ALL_BY_LABEL_PROPERTY_VALUE);
        }
        ScanAllByLabelPropertyRange {
            label,
            property,
            lower,
            upper,
            ..
        } => {
            let lower_literal = bound_literal(lower.as_ref());
            let upper_literal = bound_literal(upper.as_ref());
            let literal_bounds = lower.is_some() == lower_literal.is_some()
                && upper.is_some() == upper_literal.is_some();
            let multiplier = if literal_bounds {
                context.vertices_count_by_range(*label, *property, lower_literal, upper_literal)
                    as f64
            } else {
                context.vertices_count_by_label_property(*label, *property) as f64
                    * CardParam::FILTER
            };
            estimate.scale_then_charge(multiplier, CostParam::SCAN_ALL_BY_LABEL_PROPERTY_RANGE);
        }
        Expand { .. } => {
            estimate.scale_then_charge(CardParam::EXPAND, CostParam::EXPAND);
        }
        ExpandVariable { breadth_first, .. } => {
            if *breadth_first {
                estimate.scale_then_charge(
                    CardParam::EXPAND_BREADTH_FIRST,
                    CostParam::EXPAND_BREADTH_FIRST,
                );
            } else {
                estimate.scale_then_charge(CardParam::EXPAND_VARIABLE, CostParam::EXPAND_VARIABLE);
            }
        }
        Filter { .. } => {
            estimate.charge_then_scale(CostParam::FILTER, CardParam::FILTER);
        }
        EdgeUniquenessFilter { .. } => {
            estimate.charge_then_scale(
                CostParam::EDGE_UNIQUENESS_FILTER,
                CardParam::EDGE_UNIQUENESS_FILTER,
            );
        }
        Unwind { expr, .. } => {
            // Unwind of a list literal emits exactly its length.
            let multiplier = match expr {
                Expr::ListLiteral(items) => items.len() as f64,
                _ => MiscParam::UNWIND_NO_LITERAL,
            };
            estimate.charge_then_scale(CostParam::UNWIND, multiplier);
        }
        Aggregate { group_by, .. } if group_by.is_empty() => {
            estimate.cardinality = 1.0;
        }
        Cartesian { left, right } => {
            let left = estimate_cost(left, context);
            let right = estimate_cost(right, context);
            estimate = CostEstimate {
                cost: left.cost + left.cardinality * right.cost,
                cardinality: left.cardinality * right.cardinality,
            };
        }
        Union { left, right, .. } => {
            let left = estimate_cost(left, context);
            let right = estimate_cost(right, context);
            estimate = CostEstimate {
                cost: left.cost + right.cost,
                cardinality: left.cardinality + right.cardinality,
            };
        }
        Merge {
            on_match,
            on_create,
            ..
        } => {
            let on_match = estimate_cost(on_match, context);
            let on_create = estimate_cost(on_create, context);
            estimate.cost += estimate.cardinality * on_match.cost.max(on_create.cost);
        }
        Optional { optional, .. } => {
            let branch = estimate_cost(optional, context);
            estimate.cost += estimate.cardinality * branch.cost;
        }
        // Remaining operators stream rows through without changing the
        // estimated cardinality.
        _ => {}
    }
    estimate
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::num::NonZeroU32;

    use quiver_common::{LabelId, PropertyId};

    use super::*;
    use crate::ast::Direction;
    use crate::symbols::SymbolTable;

    /// Fixed statistics standing in for a store with 100 vertices, 30
    /// labeled and 20 of those carrying the indexed property 0..19.
    struct FakeStats {
        by_value: HashMap<i64, usize>,
    }

    impl FakeStats {
        fn new() -> Self {
            let mut by_value = HashMap::new();
            for value in 0..20i64 {
                by_value.insert(value, 1);
            }
            FakeStats { by_value }
        }
    }

    impl PlanningContext for FakeStats {
        fn label_id(&self, _name: &str) -> LabelId {
            NonZeroU32::new(1).unwrap()
        }

        fn property_id(&self, _name: &str) -> PropertyId {
            1
        }

        fn edge_type_id(&self, _name: &str) -> u32 {
            1
        }

        fn vertices_count(&self) -> usize {
            100
        }

        fn vertices_count_by_label(&self, _label: LabelId) -> usize {
            30
        }

        fn vertices_count_by_label_property(&self, _label: LabelId, _property: PropertyId) -> usize {
            20
        }

        fn vertices_count_by_value(
            &self,
            _label: LabelId,
            _property: PropertyId,
            value: &PropertyValue,
        ) -> usize {
            match value {
                PropertyValue::Int(value) => self.by_value.get(value).copied().unwrap_or(0),
                _ => 0,
            }
        }

        fn vertices_count_by_range(
            &self,
            _label: LabelId,
            _property: PropertyId,
            lower: Option<(&PropertyValue, bool)>,
            upper: Option<(&PropertyValue, bool)>,
        ) -> usize {
            let lower = match lower {
                Some((PropertyValue::Int(value), true)) => *value,
                Some((PropertyValue::Int(value), false)) => *value + 1,
                _ => 0,
            };
            let upper = match upper {
                Some((PropertyValue::Int(value), true)) => *value,
                Some((PropertyValue::Int(value), false)) => *value - 1,
                _ => 19,
            };
            (lower..=upper).filter(|value| self.by_value.contains_key(value)).count()
        }

        fn label_property_index_exists(&self, _label: LabelId, _property: PropertyId) -> bool {
            true
        }
    }

    fn label() -> LabelId {
        NonZeroU32::new(1).unwrap()
    }

    fn assert_cost(plan: &LogicalOperator, expected: f64) {
        let estimate = estimate_cost(plan, &FakeStats::new());
        assert!(
            (estimate.cost - expected).abs() < 1e-9,
            "cost {} != expected {}",
            estimate.cost,
            expected
        );
    }

    #[test]
    fn once_is_free() {
        assert_cost(&LogicalOperator::Once, 0.0);
    }

    #[test]
    fn scan_all_costs_per_vertex() {
        let mut symbols = SymbolTable::new();
        let plan = LogicalOperator::ScanAll {
            input: Box::new(LogicalOperator::Once),
            output: symbols.create("n"),
        };
        assert_cost(&plan, 100.0 * CostParam::SCAN_ALL);
    }

    #[test]
    fn scan_by_label_uses_label_cardinality() {
        let mut symbols = SymbolTable::new();
        let plan = LogicalOperator::ScanAllByLabel {
            input: Box::new(LogicalOperator::Once),
            output: symbols.create("n"),
            label: label(),
        };
        assert_cost(&plan, 30.0 * CostParam::SCAN_ALL_BY_LABEL);
    }

    #[test]
    fn scan_by_property_value_literal_is_exact() {
        let mut symbols = SymbolTable::new();
        let plan = LogicalOperator::ScanAllByLabelPropertyValue {
            input: Box::new(LogicalOperator::Once),
            output: symbols.create("n"),
            label: label(),
            property: 1,
            expr: Expr::literal(12i64),
        };
        assert_cost(&plan, 1.0 * CostParam::SCAN_ALL_BY_LABEL_PROPERTY_VALUE);
    }

    #[test]
    fn scan_by_property_value_expression_degrades_to_filtered_count() {
        let mut symbols = SymbolTable::new();
        let plan = LogicalOperator::ScanAllByLabelPropertyValue {
            input: Box::new(LogicalOperator::Once),
            output: symbols.create("n"),
            label: label(),
            property: 1,
            expr: Expr::Unary {
                op: crate::ast::UnaryOp::Plus,
                expr: Box::new(Expr::literal(12i64)),
            },
        };
        assert_cost(
            &plan,
            20.0 * CardParam::FILTER * CostParam::SCAN_ALL_BY_LABEL_PROPERTY_VALUE,
        );
    }

    #[test]
    fn range_scans_count_exactly_for_literal_bounds() {
        let mut symbols = SymbolTable::new();
        let upper_only = LogicalOperator::ScanAllByLabelPropertyRange {
            input: Box::new(LogicalOperator::Once),
            output: symbols.create("n"),
            label: label(),
            property: 1,
            lower: None,
            upper: Some(RangeBound::Inclusive(Expr::literal(12i64))),
        };
        assert_cost(
            &upper_only,
            13.0 * CostParam::SCAN_ALL_BY_LABEL_PROPERTY_RANGE,
        );

        let lower_only = LogicalOperator::ScanAllByLabelPropertyRange {
            input: Box::new(LogicalOperator::Once),
            output: symbols.create("m"),
            label: label(),
            property: 1,
            lower: Some(RangeBound::Inclusive(Expr::literal(17i64))),
            upper: None,
        };
        assert_cost(
            &lower_only,
            3.0 * CostParam::SCAN_ALL_BY_LABEL_PROPERTY_RANGE,
        );
    }

    #[test]
    fn expand_multiplies_cardinality() {
        let mut symbols = SymbolTable::new();
        let plan = LogicalOperator::Expand {
            input: Box::new(LogicalOperator::Once),
            input_symbol: symbols.create("n"),
            node_symbol: symbols.create("m"),
            edge_symbol: symbols.create("e"),
            direction: Direction::In,
            edge_types: Vec::new(),
            existing_node: false,
        };
        assert_cost(&plan, CardParam::EXPAND * CostParam::EXPAND);
    }

    #[test]
    fn filter_charges_first_then_shrinks() {
        let plan = LogicalOperator::Filter {
            input: Box::new(LogicalOperator::Once),
            expr: Expr::literal(true),
        };
        assert_cost(&plan, CostParam::FILTER);
        let stacked = LogicalOperator::Filter {
            input: Box::new(plan),
            expr: Expr::literal(true),
        };
        assert_cost(
            &stacked,
            CostParam::FILTER + CardParam::FILTER * CostParam::FILTER,
        );
        // Filter strictly increases cost and strictly decreases emitted
        // cardinality.
        let estimate = estimate_cost(&stacked, &FakeStats::new());
        assert!(estimate.cardinality < 1.0);
    }

    #[test]
    fn unwind_of_a_literal_list_emits_its_length() {
        let mut symbols = SymbolTable::new();
        let items = vec![Expr::literal(0i64); 7];
        let plan = LogicalOperator::Unwind {
            input: Box::new(LogicalOperator::Once),
            expr: Expr::ListLiteral(items),
            output: symbols.create("x"),
        };
        assert_cost(&plan, CostParam::UNWIND);
        let estimate = estimate_cost(&plan, &FakeStats::new());
        assert!((estimate.cardinality - 7.0).abs() < 1e-9);

        // Unwind over the empty list: zero rows, cost stays the Unwind
        // constant.
        let empty = LogicalOperator::Unwind {
            input: Box::new(LogicalOperator::Once),
            expr: Expr::ListLiteral(Vec::new()),
            output: symbols.create("y"),
        };
        let estimate = estimate_cost(&empty, &FakeStats::new());
        assert!((estimate.cost - CostParam::UNWIND).abs() < 1e-9);
        assert_eq!(estimate.cardinality, 0.0);
    }

    #[test]
    fn unwind_of_an_unknown_expression_uses_the_default() {
        let mut symbols = SymbolTable::new();
        let plan = LogicalOperator::Unwind {
            input: Box::new(LogicalOperator::Once),
            expr: Expr::ident("xs"),
            output: symbols.create("x"),
        };
        let estimate = estimate_cost(&plan, &FakeStats::new());
        assert!((estimate.cardinality - MiscParam::UNWIND_NO_LITERAL).abs() < 1e-9);
    }
}
