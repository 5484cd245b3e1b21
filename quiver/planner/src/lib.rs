//! Query planning: translation of a parsed Cypher-like AST into a tree of
//! pull-based logical operators, with cost-based selection among the
//! applicable index scans.

pub mod ast;
pub mod cost_estimator;
pub mod error;
pub mod operator;
pub mod planner;
pub mod symbols;

pub use cost_estimator::{estimate_cost, CardParam, CostEstimate, CostParam, MiscParam};
pub use error::{PlanError, PlanResult};
pub use operator::{LogicalOperator, PlanningContext, RangeBound};
pub use planner::{plan_query, PlannedQuery};
pub use symbols::{Symbol, SymbolTable};
