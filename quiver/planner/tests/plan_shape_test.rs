use std::num::NonZeroU32;

use quiver_common::{LabelId, PropertyId, PropertyValue};
use quiver_planner::ast::*;
use quiver_planner::{plan_query, LogicalOperator, PlanError, PlanningContext};

/// Statistics for a store with one indexed (label, property) pair and a
/// label cardinality that makes the indexed scans attractive.
struct Stats;

impl PlanningContext for Stats {
    fn label_id(&self, name: &str) -> LabelId {
        match name {
            "Person" => NonZeroU32::new(1).unwrap(),
            _ => NonZeroU32::new(2).unwrap(),
        }
    }

    fn property_id(&self, name: &str) -> PropertyId {
        match name {
            "age" => 1,
            _ => 2,
        }
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
        _value: &PropertyValue,
    ) -> usize {
        1
    }

    fn vertices_count_by_range(
        &self,
        _label: LabelId,
        _property: PropertyId,
        _lower: Option<(&PropertyValue, bool)>,
        _upper: Option<(&PropertyValue, bool)>,
    ) -> usize {
        13
    }

    fn label_property_index_exists(&self, label: LabelId, property: PropertyId) -> bool {
        label.get() == 1 && property == 1
    }
}

fn kind(op: &LogicalOperator) -> &'static str {
    use LogicalOperator::*;
    match op {
        Once => "Once",
        ScanAll { .. } => "ScanAll",
        ScanAllByLabel { .. } => "ScanAllByLabel",
        ScanAllByLabelPropertyValue { .. } => "ScanAllByLabelPropertyValue",
        ScanAllByLabelPropertyRange { .. } => "ScanAllByLabelPropertyRange",
        Expand { .. } => "Expand",
        ExpandVariable { .. } => "ExpandVariable",
        ConstructNamedPath { .. } => "ConstructNamedPath",
        Filter { .. } => "Filter",
        EdgeUniquenessFilter { .. } => "EdgeUniquenessFilter",
        Produce { .. } => "Produce",
        Aggregate { .. } => "Aggregate",
        OrderBy { .. } => "OrderBy",
        Skip { .. } => "Skip",
        Limit { .. } => "Limit",
        Distinct { .. } => "Distinct",
        Unwind { .. } => "Unwind",
        CreateNode { .. } => "CreateNode",
        CreateExpand { .. } => "CreateExpand",
        SetProperty { .. } => "SetProperty",
        SetProperties { .. } => "SetProperties",
        SetLabels { .. } => "SetLabels",
        RemoveProperty { .. } => "RemoveProperty",
        RemoveLabels { .. } => "RemoveLabels",
        Delete { .. } => "Delete",
        Merge { .. } => "Merge",
        Optional { .. } => "Optional",
        Accumulate { .. } => "Accumulate",
        Cartesian { .. } => "Cartesian",
        Union { .. } => "Union",
    }
}

/// Operator kinds from the leaf up to the root along the main input chain.
fn shape(plan: &LogicalOperator) -> Vec<&'static str> {
    let mut kinds = Vec::new();
    let mut cursor = Some(plan);
    while let Some(op) = cursor {
        kinds.push(kind(op));
        cursor = op.input();
    }
    kinds.reverse();
    kinds
}

fn node(name: &str, labels: &[&str]) -> NodePattern {
    NodePattern {
        variable: Some(name.to_owned()),
        labels: labels.iter().map(|label| (*label).to_owned()).collect(),
        properties: Vec::new(),
    }
}

fn edge(name: &str, direction: Direction, types: &[&str]) -> EdgePattern {
    EdgePattern {
        variable: Some(name.to_owned()),
        direction,
        types: types.iter().map(|ty| (*ty).to_owned()).collect(),
        kind: EdgePatternKind::Single,
        properties: Vec::new(),
    }
}

fn part(start: NodePattern, steps: Vec<(EdgePattern, NodePattern)>) -> PatternPart {
    PatternPart {
        path_name: None,
        start,
        steps,
    }
}

fn match_clause(parts: Vec<PatternPart>, where_clause: Option<Expr>) -> Clause {
    Clause::Match(Match {
        pattern: Pattern { parts },
        where_clause,
        optional: false,
    })
}

fn return_items(items: Vec<(Expr, Option<&str>)>) -> Clause {
    Clause::Return(ProjectionBody {
        items: items
            .into_iter()
            .map(|(expr, alias)| (expr, alias.map(str::to_owned)))
            .collect(),
        ..Default::default()
    })
}

#[test]
fn bare_match_scans_everything() {
    let query = CypherQuery::single(vec![
        match_clause(vec![part(node("n", &[]), vec![])], None),
        return_items(vec![(Expr::ident("n"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(shape(&planned.root), ["Once", "ScanAll", "Produce"]);
    assert_eq!(planned.outputs.len(), 1);
    assert_eq!(planned.outputs[0].0, "n");
}

#[test]
fn label_filter_picks_the_label_scan() {
    let query = CypherQuery::single(vec![
        match_clause(vec![part(node("n", &["Person"]), vec![])], None),
        return_items(vec![(Expr::ident("n"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(shape(&planned.root), ["Once", "ScanAllByLabel", "Produce"]);
}

#[test]
fn indexed_equality_picks_the_value_scan() {
    let where_clause = Expr::binary(
        BinaryOp::Eq,
        Expr::property("n", "age"),
        Expr::literal(12i64),
    );
    let query = CypherQuery::single(vec![
        match_clause(vec![part(node("n", &["Person"]), vec![])], Some(where_clause)),
        return_items(vec![(Expr::ident("n"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(
        shape(&planned.root),
        ["Once", "ScanAllByLabelPropertyValue", "Produce"]
    );
}

#[test]
fn indexed_inequality_picks_the_range_scan() {
    let where_clause = Expr::binary(
        BinaryOp::Gt,
        Expr::property("n", "age"),
        Expr::literal(5i64),
    );
    let query = CypherQuery::single(vec![
        match_clause(vec![part(node("n", &["Person"]), vec![])], Some(where_clause)),
        return_items(vec![(Expr::ident("n"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(
        shape(&planned.root),
        ["Once", "ScanAllByLabelPropertyRange", "Produce"]
    );
    match &planned.root {
        LogicalOperator::Produce { input, .. } => match input.as_ref() {
            LogicalOperator::ScanAllByLabelPropertyRange { lower, upper, .. } => {
                assert!(lower.is_some());
                assert!(upper.is_none());
            }
            other => panic!("unexpected scan {other:?}"),
        },
        other => panic!("unexpected root {other:?}"),
    }
}

#[test]
fn unindexed_property_falls_back_to_label_scan_plus_filter() {
    let where_clause = Expr::binary(
        BinaryOp::Eq,
        Expr::property("n", "name"),
        Expr::literal("kim"),
    );
    let query = CypherQuery::single(vec![
        match_clause(vec![part(node("n", &["Person"]), vec![])], Some(where_clause)),
        return_items(vec![(Expr::ident("n"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(
        shape(&planned.root),
        ["Once", "ScanAllByLabel", "Filter", "Produce"]
    );
}

#[test]
fn chained_pattern_expands_with_edge_uniqueness() {
    let query = CypherQuery::single(vec![
        match_clause(
            vec![part(
                node("a", &[]),
                vec![
                    (edge("e", Direction::Out, &[]), node("b", &[])),
                    (edge("f", Direction::Out, &[]), node("c", &[])),
                ],
            )],
            None,
        ),
        return_items(vec![(Expr::ident("c"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(
        shape(&planned.root),
        [
            "Once",
            "ScanAll",
            "Expand",
            "Expand",
            "EdgeUniquenessFilter",
            "Produce"
        ]
    );
}

#[test]
fn disconnected_parts_are_crossed() {
    let query = CypherQuery::single(vec![
        match_clause(
            vec![part(node("a", &[]), vec![]), part(node("b", &[]), vec![])],
            None,
        ),
        return_items(vec![(Expr::ident("a"), None), (Expr::ident("b"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    // The Cartesian sits under the Produce with one scan per side.
    match &planned.root {
        LogicalOperator::Produce { input, .. } => match input.as_ref() {
            LogicalOperator::Cartesian { left, right } => {
                assert_eq!(shape(left), ["Once", "ScanAll"]);
                assert_eq!(shape(right), ["Once", "ScanAll"]);
            }
            other => panic!("expected Cartesian, got {other:?}"),
        },
        other => panic!("unexpected root {other:?}"),
    }
}

#[test]
fn create_chain_uses_create_expand() {
    let query = CypherQuery::single(vec![Clause::Create(Create {
        pattern: Pattern {
            parts: vec![part(
                node("a", &["Person"]),
                vec![(edge("e", Direction::Out, &["KNOWS"]), node("b", &[]))],
            )],
        },
    })]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(shape(&planned.root), ["Once", "CreateNode", "CreateExpand"]);
}

#[test]
fn writes_accumulate_before_the_next_projection() {
    let query = CypherQuery::single(vec![
        match_clause(vec![part(node("n", &[]), vec![])], None),
        Clause::Set(vec![SetItem::Property {
            target: Expr::property("n", "x"),
            value: Expr::literal(1i64),
        }]),
        Clause::With(ProjectionBody {
            items: vec![(Expr::ident("n"), None)],
            ..Default::default()
        }),
        return_items(vec![(Expr::property("n", "x"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(
        shape(&planned.root),
        [
            "Once",
            "ScanAll",
            "SetProperty",
            "Accumulate",
            "Produce",
            "Produce"
        ]
    );
}

#[test]
fn aggregation_plans_an_aggregate_operator() {
    let query = CypherQuery::single(vec![
        match_clause(vec![part(node("n", &[]), vec![])], None),
        return_items(vec![
            (Expr::ident("n"), None),
            (
                Expr::Aggregation {
                    op: AggregationOp::Count,
                    expr: Some(Box::new(Expr::ident("n"))),
                },
                Some("c"),
            ),
        ]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(
        shape(&planned.root),
        ["Once", "ScanAll", "Aggregate", "Produce"]
    );
    assert_eq!(planned.outputs[1].0, "c");
}

#[test]
fn unknown_identifier_is_a_semantic_error() {
    let query = CypherQuery::single(vec![return_items(vec![(Expr::ident("ghost"), None)])]);
    assert_eq!(
        plan_query(&query, &Stats).unwrap_err(),
        PlanError::UnknownIdentifier("ghost".to_owned())
    );
}

#[test]
fn optional_match_wraps_the_branch() {
    let query = CypherQuery::single(vec![
        match_clause(vec![part(node("a", &[]), vec![])], None),
        Clause::Match(Match {
            pattern: Pattern {
                parts: vec![part(
                    node("a", &[]),
                    vec![(edge("e", Direction::Out, &[]), node("b", &[]))],
                )],
            },
            where_clause: None,
            optional: true,
        }),
        return_items(vec![(Expr::ident("b"), None)]),
    ]);
    let planned = plan_query(&query, &Stats).unwrap();
    assert_eq!(shape(&planned.root), ["Once", "ScanAll", "Optional", "Produce"]);
}

#[test]
fn union_requires_matching_columns() {
    let left = SingleQuery {
        clauses: vec![
            match_clause(vec![part(node("n", &[]), vec![])], None),
            return_items(vec![(Expr::ident("n"), Some("x"))]),
        ],
    };
    let right_ok = SingleQuery {
        clauses: vec![
            match_clause(vec![part(node("m", &[]), vec![])], None),
            return_items(vec![(Expr::ident("m"), Some("x"))]),
        ],
    };
    let right_bad = SingleQuery {
        clauses: vec![
            match_clause(vec![part(node("m", &[]), vec![])], None),
            return_items(vec![(Expr::ident("m"), Some("y"))]),
        ],
    };
    let ok = CypherQuery {
        first: left.clone(),
        unions: vec![(false, right_ok)],
    };
    let planned = plan_query(&ok, &Stats).unwrap();
    assert!(matches!(planned.root, LogicalOperator::Union { .. }));

    let bad = CypherQuery {
        first: left,
        unions: vec![(true, right_bad)],
    };
    assert_eq!(
        plan_query(&bad, &Stats).unwrap_err(),
        PlanError::UnionColumnMismatch
    );
}
