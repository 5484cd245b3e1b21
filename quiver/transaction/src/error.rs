use quiver_common::TxnId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction {0} is not running on this worker")]
    NotRunning(TxnId),
    #[error("transaction {0} has already finished")]
    AlreadyFinished(TxnId),
    #[error("transaction id space exhausted")]
    IdExhausted,
}
