//! Transaction engine: issues transaction identifiers, tracks the
//! active/committed/aborted sets and hands out the snapshots that drive MVCC
//! visibility in the storage layer.

pub mod commit_log;
pub mod engine;
pub mod error;
pub mod snapshot;

pub use commit_log::{CommitLog, TransactionState};
pub use engine::{Engine, Transaction};
pub use error::TransactionError;
pub use snapshot::Snapshot;
