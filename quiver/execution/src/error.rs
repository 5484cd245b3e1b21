use quiver_storage::StorageError;
use thiserror::Error;

pub type QueryResult<T> = Result<T, QueryError>;

/// Errors surfaced while executing a plan. Storage conflicts pass through
/// unchanged so the caller can distinguish retryable aborts from semantic
/// failures.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("type error: {0}")]
    Type(String),
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("query aborted: {0}")]
    Aborted(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
