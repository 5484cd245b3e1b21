use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use quiver_common::PropertyValue;
use quiver_storage::GraphAccessor;

use crate::error::{QueryError, QueryResult};

/// Everything a cursor needs besides the frame: the transaction-bound graph
/// accessor, the bound parameters, the evaluation timestamp and the
/// cooperative cancellation state.
pub struct ExecutionContext {
    accessor: GraphAccessor,
    parameters: HashMap<String, PropertyValue>,
    timestamp: i64,
    abort_flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ExecutionContext {
    pub fn new(accessor: GraphAccessor) -> Self {
        let timeout = accessor.store().config().query_execution_timeout_sec;
        ExecutionContext {
            accessor,
            parameters: HashMap::new(),
            timestamp: 0,
            abort_flag: Arc::new(AtomicBool::new(false)),
            deadline: (timeout > 0)
                .then(|| Instant::now() + Duration::from_secs(timeout)),
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, PropertyValue>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn accessor(&self) -> &GraphAccessor {
        &self.accessor
    }

    pub fn parameter(&self, name: &str) -> QueryResult<&PropertyValue> {
        self.parameters
            .get(name)
            .ok_or_else(|| QueryError::UnknownParameter(name.to_owned()))
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Handle other threads can use to cancel the query.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort_flag)
    }

    /// Cooperative cancellation point, checked between pulls: an external
    /// abort, the execution timeout, or a wound by an older transaction all
    /// unwind the query here.
    pub fn check(&self) -> QueryResult<()> {
        if self.abort_flag.load(Ordering::Acquire) {
            return Err(QueryError::Aborted("cancelled by the client"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(QueryError::Aborted("execution timeout exceeded"));
            }
        }
        if self.accessor.transaction().should_abort() {
            return Err(QueryError::Aborted("wounded by an older transaction"));
        }
        Ok(())
    }
}
