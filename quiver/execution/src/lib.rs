//! Pull-based query execution: one cursor per logical operator, frames of
//! typed values indexed by planner symbols, and an evaluation context
//! carrying parameters and the cooperative abort flag.

pub mod context;
pub mod cursor;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod stats;
pub mod value;

use quiver_planner::PlannedQuery;
use smol_str::SmolStr;

pub use context::ExecutionContext;
pub use error::{QueryError, QueryResult};
pub use frame::Frame;
pub use stats::StorageStats;
pub use value::TypedValue;

/// Fully evaluated query output.
#[derive(Debug)]
pub struct QueryResults {
    pub columns: Vec<SmolStr>,
    pub rows: Vec<Vec<TypedValue>>,
}

/// Runs a planned query to completion. On any error the owning transaction
/// is marked for abort before the error propagates, so the commit path can
/// never acknowledge partial effects.
pub fn execute(plan: &PlannedQuery, context: &mut ExecutionContext) -> QueryResult<QueryResults> {
    let mut cursor = cursor::build_cursor(&plan.root);
    let mut frame = Frame::new(plan.symbol_table.len());
    let mut rows = Vec::new();
    let result = (|| {
        while cursor.pull(&mut frame, context)? {
            if !plan.outputs.is_empty() {
                rows.push(
                    plan.outputs
                        .iter()
                        .map(|(_, symbol)| frame.get(*symbol).clone())
                        .collect(),
                );
            }
        }
        Ok(())
    })();
    match result {
        Ok(()) => Ok(QueryResults {
            columns: plan.outputs.iter().map(|(name, _)| name.clone()).collect(),
            rows,
        }),
        Err(error) => {
            context.accessor().transaction().wound();
            Err(error)
        }
    }
}
