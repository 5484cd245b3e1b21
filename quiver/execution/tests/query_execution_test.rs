use std::sync::Arc;

use quiver_execution::{execute, ExecutionContext, QueryResults, StorageStats, TypedValue};
use quiver_planner::ast::*;
use quiver_planner::plan_query;
use quiver_storage::{DatabaseConfig, GraphStore};
use quiver_transaction::Transaction;

fn store() -> Arc<GraphStore> {
    GraphStore::fresh(
        0,
        DatabaseConfig {
            durability_enabled: false,
            lock_timeout_ms: 100,
            ..Default::default()
        },
    )
    .unwrap()
}

fn run(store: &Arc<GraphStore>, transaction: &Arc<Transaction>, query: CypherQuery) -> QueryResults {
    let stats_accessor = store.access(Arc::clone(transaction));
    let planned = plan_query(&query, &StorageStats(&stats_accessor)).unwrap();
    let mut context = ExecutionContext::new(store.access(Arc::clone(transaction)));
    execute(&planned, &mut context).unwrap()
}

fn run_committed(store: &Arc<GraphStore>, query: CypherQuery) -> QueryResults {
    let transaction = store.begin().unwrap();
    let results = run(store, &transaction, query);
    store.commit(&transaction).unwrap();
    results
}

fn node(name: &str, labels: &[&str], properties: Vec<(&str, Expr)>) -> NodePattern {
    NodePattern {
        variable: Some(name.to_owned()),
        labels: labels.iter().map(|label| (*label).to_owned()).collect(),
        properties: properties
            .into_iter()
            .map(|(name, expr)| (name.to_owned(), expr))
            .collect(),
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

fn match_all(parts: Vec<PatternPart>) -> Clause {
    Clause::Match(Match {
        pattern: Pattern { parts },
        where_clause: None,
        optional: false,
    })
}

fn returning(items: Vec<(Expr, Option<&str>)>) -> Clause {
    Clause::Return(ProjectionBody {
        items: items
            .into_iter()
            .map(|(expr, alias)| (expr, alias.map(str::to_owned)))
            .collect(),
        ..Default::default()
    })
}

fn ints(results: &QueryResults) -> Vec<i64> {
    results
        .rows
        .iter()
        .map(|row| match &row[0] {
            TypedValue::Int(value) => *value,
            other => panic!("expected an int, got {other:?}"),
        })
        .collect()
}

#[test]
fn create_then_match_roundtrip() {
    let store = store();
    run_committed(
        &store,
        CypherQuery::single(vec![Clause::Create(Create {
            pattern: Pattern {
                parts: vec![part(
                    node("n", &["Person"], vec![("name", Expr::literal("kim"))]),
                    vec![],
                )],
            },
        })]),
    );

    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(node("n", &["Person"], vec![]), vec![])]),
            returning(vec![(Expr::property("n", "name"), Some("name"))]),
        ]),
    );
    assert_eq!(results.columns, vec!["name"]);
    assert_eq!(results.rows.len(), 1);
    assert!(matches!(&results.rows[0][0], TypedValue::String(name) if name == "kim"));
}

#[test]
fn accumulate_barrier_increments_each_vertex_once() {
    let store = store();
    for _ in 0..3 {
        run_committed(
            &store,
            CypherQuery::single(vec![Clause::Create(Create {
                pattern: Pattern {
                    parts: vec![part(node("n", &[], vec![("x", Expr::literal(0i64))]), vec![])],
                },
            })]),
        );
    }

    // MATCH (n) SET n.x = n.x + 1 WITH n MATCH (n) RETURN n.x
    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(node("n", &[], vec![]), vec![])]),
            Clause::Set(vec![SetItem::Property {
                target: Expr::property("n", "x"),
                value: Expr::binary(BinaryOp::Add, Expr::property("n", "x"), Expr::literal(1i64)),
            }]),
            Clause::With(ProjectionBody {
                items: vec![(Expr::ident("n"), None)],
                ..Default::default()
            }),
            match_all(vec![part(node("n", &[], vec![]), vec![])]),
            returning(vec![(Expr::property("n", "x"), Some("x"))]),
        ]),
    );
    assert_eq!(ints(&results), vec![1, 1, 1]);
}

#[test]
fn expand_follows_typed_edges() {
    let store = store();
    run_committed(
        &store,
        CypherQuery::single(vec![Clause::Create(Create {
            pattern: Pattern {
                parts: vec![part(
                    node("a", &[], vec![("name", Expr::literal("a"))]),
                    vec![
                        (
                            edge("e", Direction::Out, &["KNOWS"]),
                            node("b", &[], vec![("name", Expr::literal("b"))]),
                        ),
                        (
                            edge("f", Direction::Out, &["LIKES"]),
                            node("c", &[], vec![("name", Expr::literal("c"))]),
                        ),
                    ],
                )],
            },
        })]),
    );

    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(
                node("x", &[], vec![]),
                vec![(edge("e", Direction::Out, &["KNOWS"]), node("y", &[], vec![]))],
            )]),
            returning(vec![(Expr::property("y", "name"), Some("name"))]),
        ]),
    );
    assert_eq!(results.rows.len(), 1);
    assert!(matches!(&results.rows[0][0], TypedValue::String(name) if name == "b"));
}

#[test]
fn unwind_orders_skips_and_limits() {
    let store = store();
    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            Clause::Unwind(Unwind {
                expr: Expr::ListLiteral(vec![
                    Expr::literal(3i64),
                    Expr::literal(1i64),
                    Expr::literal(2i64),
                ]),
                variable: "x".to_owned(),
            }),
            Clause::Return(ProjectionBody {
                items: vec![(Expr::ident("x"), Some("x".to_owned()))],
                order_by: vec![SortItem {
                    expr: Expr::ident("x"),
                    ascending: false,
                }],
                limit: Some(Expr::literal(2i64)),
                ..Default::default()
            }),
        ]),
    );
    assert_eq!(ints(&results), vec![3, 2]);
}

#[test]
fn unwind_of_the_empty_list_yields_no_rows() {
    let store = store();
    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            Clause::Unwind(Unwind {
                expr: Expr::ListLiteral(Vec::new()),
                variable: "x".to_owned(),
            }),
            returning(vec![(Expr::ident("x"), None)]),
        ]),
    );
    assert!(results.rows.is_empty());
}

#[test]
fn aggregation_counts_per_group() {
    let store = store();
    for value in [1i64, 1, 2] {
        run_committed(
            &store,
            CypherQuery::single(vec![Clause::Create(Create {
                pattern: Pattern {
                    parts: vec![part(
                        node("n", &["Person"], vec![("group", Expr::literal(value))]),
                        vec![],
                    )],
                },
            })]),
        );
    }
    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(node("n", &["Person"], vec![]), vec![])]),
            Clause::Return(ProjectionBody {
                items: vec![
                    (Expr::property("n", "group"), Some("group".to_owned())),
                    (
                        Expr::Aggregation {
                            op: AggregationOp::Count,
                            expr: Some(Box::new(Expr::ident("n"))),
                        },
                        Some("c".to_owned()),
                    ),
                ],
                order_by: vec![SortItem {
                    expr: Expr::ident("group"),
                    ascending: true,
                }],
                ..Default::default()
            }),
        ]),
    );
    let rows: Vec<(i64, i64)> = results
        .rows
        .iter()
        .map(|row| match (&row[0], &row[1]) {
            (TypedValue::Int(group), TypedValue::Int(count)) => (*group, *count),
            other => panic!("unexpected row {other:?}"),
        })
        .collect();
    assert_eq!(rows, vec![(1, 2), (2, 1)]);
}

#[test]
fn distinct_deduplicates() {
    let store = store();
    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            Clause::Unwind(Unwind {
                expr: Expr::ListLiteral(vec![
                    Expr::literal(1i64),
                    Expr::literal(1i64),
                    Expr::literal(2i64),
                ]),
                variable: "x".to_owned(),
            }),
            Clause::Return(ProjectionBody {
                distinct: true,
                items: vec![(Expr::ident("x"), Some("x".to_owned()))],
                ..Default::default()
            }),
        ]),
    );
    assert_eq!(ints(&results), vec![1, 2]);
}

#[test]
fn optional_match_binds_null_on_no_match() {
    let store = store();
    run_committed(
        &store,
        CypherQuery::single(vec![Clause::Create(Create {
            pattern: Pattern {
                parts: vec![part(node("n", &["Person"], vec![]), vec![])],
            },
        })]),
    );
    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(node("n", &["Person"], vec![]), vec![])]),
            Clause::Match(Match {
                pattern: Pattern {
                    parts: vec![part(
                        node("n", &[], vec![]),
                        vec![(edge("e", Direction::Out, &[]), node("m", &[], vec![]))],
                    )],
                },
                where_clause: None,
                optional: true,
            }),
            returning(vec![(Expr::ident("m"), Some("m"))]),
        ]),
    );
    assert_eq!(results.rows.len(), 1);
    assert!(results.rows[0][0].is_null());
}

#[test]
fn merge_creates_once_then_matches() {
    let store = store();
    let merge = || {
        CypherQuery::single(vec![Clause::Merge(Merge {
            part: part(
                node("n", &["Person"], vec![("name", Expr::literal("kim"))]),
                vec![],
            ),
        })])
    };
    run_committed(&store, merge());
    run_committed(&store, merge());

    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(node("n", &["Person"], vec![]), vec![])]),
            Clause::Return(ProjectionBody {
                items: vec![(
                    Expr::Aggregation {
                        op: AggregationOp::Count,
                        expr: Some(Box::new(Expr::ident("n"))),
                    },
                    Some("c".to_owned()),
                )],
                ..Default::default()
            }),
        ]),
    );
    assert_eq!(ints(&results), vec![1]);
}

#[test]
fn detach_delete_removes_vertices_and_edges() {
    let store = store();
    run_committed(
        &store,
        CypherQuery::single(vec![Clause::Create(Create {
            pattern: Pattern {
                parts: vec![part(
                    node("a", &["Person"], vec![]),
                    vec![(
                        edge("e", Direction::Out, &["KNOWS"]),
                        node("b", &["Person"], vec![]),
                    )],
                )],
            },
        })]),
    );

    run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(node("n", &["Person"], vec![]), vec![])]),
            Clause::Delete(Delete {
                exprs: vec![Expr::ident("n")],
                detach: true,
            }),
        ]),
    );

    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(node("n", &[], vec![]), vec![])]),
            Clause::Return(ProjectionBody {
                items: vec![(
                    Expr::Aggregation {
                        op: AggregationOp::Count,
                        expr: Some(Box::new(Expr::ident("n"))),
                    },
                    Some("c".to_owned()),
                )],
                ..Default::default()
            }),
        ]),
    );
    assert_eq!(ints(&results), vec![0]);
}

#[test]
fn union_distinct_merges_result_sets() {
    let unwind_query = |values: Vec<i64>| SingleQuery {
        clauses: vec![
            Clause::Unwind(Unwind {
                expr: Expr::ListLiteral(values.into_iter().map(Expr::literal).collect()),
                variable: "x".to_owned(),
            }),
            returning(vec![(Expr::ident("x"), Some("x"))]),
        ],
    };
    let store = store();
    let results = run_committed(
        &store,
        CypherQuery {
            first: unwind_query(vec![1, 2]),
            unions: vec![(false, unwind_query(vec![2, 3]))],
        },
    );
    let mut values = ints(&results);
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn variable_length_expansion_collects_paths() {
    let store = store();
    // a -> b -> c
    run_committed(
        &store,
        CypherQuery::single(vec![Clause::Create(Create {
            pattern: Pattern {
                parts: vec![part(
                    node("a", &[], vec![("name", Expr::literal("a"))]),
                    vec![
                        (
                            edge("e", Direction::Out, &["KNOWS"]),
                            node("b", &[], vec![("name", Expr::literal("b"))]),
                        ),
                        (
                            edge("f", Direction::Out, &["KNOWS"]),
                            node("c", &[], vec![("name", Expr::literal("c"))]),
                        ),
                    ],
                )],
            },
        })]),
    );

    // MATCH (s {name: 'a'})-[*1..2]->(t) RETURN t.name
    let variable_edge = EdgePattern {
        variable: Some("es".to_owned()),
        direction: Direction::Out,
        types: vec![],
        kind: EdgePatternKind::Variable {
            lower: Some(1),
            upper: Some(2),
        },
        properties: Vec::new(),
    };
    let results = run_committed(
        &store,
        CypherQuery::single(vec![
            match_all(vec![part(
                node("s", &[], vec![("name", Expr::literal("a"))]),
                vec![(variable_edge, node("t", &[], vec![]))],
            )]),
            returning(vec![(Expr::property("t", "name"), Some("name"))]),
        ]),
    );
    let mut names: Vec<String> = results
        .rows
        .iter()
        .map(|row| match &row[0] {
            TypedValue::String(name) => name.clone(),
            other => panic!("expected a string, got {other:?}"),
        })
        .collect();
    names.sort();
    assert_eq!(names, vec!["b", "c"]);
}
