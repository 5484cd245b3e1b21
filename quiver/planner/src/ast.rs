//! The single-query AST handed over by the parser. Only the shapes the
//! planner consumes are modeled; producing them from query text is the
//! parser's job and out of scope here.

use quiver_common::PropertyValue;

use crate::symbols::Symbol;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(PropertyValue),
    Parameter(String),
    Identifier(String),
    /// An identifier resolved to its frame slot. Produced by the planner;
    /// the parser never emits it, and the evaluator only accepts it.
    SymbolRef(Symbol),
    Property {
        expr: Box<Expr>,
        property: String,
    },
    HasLabel {
        expr: Box<Expr>,
        label: String,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    ListLiteral(Vec<Expr>),
    Aggregation {
        op: AggregationOp,
        expr: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn ident(name: &str) -> Expr {
        Expr::Identifier(name.to_owned())
    }

    pub fn property(name: &str, property: &str) -> Expr {
        Expr::Property {
            expr: Box::new(Expr::ident(name)),
            property: property.to_owned(),
        }
    }

    pub fn literal(value: impl Into<PropertyValue>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Whether any subexpression is an aggregation.
    pub fn has_aggregation(&self) -> bool {
        match self {
            Expr::Aggregation { .. } => true,
            Expr::Literal(_) | Expr::Parameter(_) | Expr::Identifier(_) | Expr::SymbolRef(_) => {
                false
            }
            Expr::Property { expr, .. } | Expr::HasLabel { expr, .. } | Expr::Unary { expr, .. } => {
                expr.has_aggregation()
            }
            Expr::Binary { lhs, rhs, .. } => lhs.has_aggregation() || rhs.has_aggregation(),
            Expr::ListLiteral(items) => items.iter().any(Expr::has_aggregation),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOp {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Collect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgePatternKind {
    Single,
    /// Variable-length expansion, depth-first.
    Variable {
        lower: Option<u64>,
        upper: Option<u64>,
    },
    /// Variable-length expansion, breadth-first.
    BreadthFirst {
        lower: Option<u64>,
        upper: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct EdgePattern {
    pub variable: Option<String>,
    pub direction: Direction,
    pub types: Vec<String>,
    pub kind: EdgePatternKind,
    pub properties: Vec<(String, Expr)>,
}

/// One comma-separated element of a pattern: a start node and a chain of
/// edge/node steps, optionally bound to a path name.
#[derive(Debug, Clone)]
pub struct PatternPart {
    pub path_name: Option<String>,
    pub start: NodePattern,
    pub steps: Vec<(EdgePattern, NodePattern)>,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub parts: Vec<PatternPart>,
}

#[derive(Debug, Clone)]
pub struct Match {
    pub pattern: Pattern,
    pub where_clause: Option<Expr>,
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct Create {
    pub pattern: Pattern,
}

#[derive(Debug, Clone)]
pub struct Merge {
    pub part: PatternPart,
}

#[derive(Debug, Clone)]
pub struct Delete {
    pub exprs: Vec<Expr>,
    pub detach: bool,
}

#[derive(Debug, Clone)]
pub enum SetItem {
    /// `SET n.p = expr`
    Property { target: Expr, value: Expr },
    /// `SET n = expr` / `SET n += expr`
    Properties {
        variable: String,
        value: Expr,
        update: bool,
    },
    /// `SET n:Label1:Label2`
    Labels {
        variable: String,
        labels: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub enum RemoveItem {
    /// `REMOVE n.p`
    Property { target: Expr },
    /// `REMOVE n:Label`
    Labels {
        variable: String,
        labels: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct SortItem {
    pub expr: Expr,
    pub ascending: bool,
}

/// Body shared by `WITH` and `RETURN`.
#[derive(Debug, Clone, Default)]
pub struct ProjectionBody {
    pub distinct: bool,
    pub items: Vec<(Expr, Option<String>)>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
    /// `WITH ... WHERE`; never set on `RETURN`.
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Unwind {
    pub expr: Expr,
    pub variable: String,
}

#[derive(Debug, Clone)]
pub enum Clause {
    Match(Match),
    Create(Create),
    Merge(Merge),
    Delete(Delete),
    Set(Vec<SetItem>),
    Remove(Vec<RemoveItem>),
    Unwind(Unwind),
    With(ProjectionBody),
    Return(ProjectionBody),
}

#[derive(Debug, Clone)]
pub struct SingleQuery {
    pub clauses: Vec<Clause>,
}

/// A full query: one single query plus any `UNION [ALL]` continuations.
#[derive(Debug, Clone)]
pub struct CypherQuery {
    pub first: SingleQuery,
    pub unions: Vec<(bool, SingleQuery)>,
}

impl CypherQuery {
    pub fn single(clauses: Vec<Clause>) -> Self {
        CypherQuery {
            first: SingleQuery { clauses },
            unions: Vec::new(),
        }
    }
}
