use thiserror::Error;

pub type PlanResult<T> = Result<T, PlanError>;

/// Semantic errors surfaced while translating the AST into a plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("`{0}` is not allowed here")]
    InvalidUse(String),
    #[error("aggregation is not allowed in {0}")]
    MisplacedAggregation(&'static str),
    #[error("union queries must return the same columns")]
    UnionColumnMismatch,
    #[error("variable-length pattern bounds are invalid")]
    InvalidRange,
}
