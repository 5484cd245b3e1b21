use std::io;

use quiver_common::Gid;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// MVCC write-write conflict; the transaction must abort and may retry.
    #[error("serialization conflict on record {0}")]
    Serialization(Gid),
    /// A record-lock wait exceeded the configured deadline.
    #[error("lock wait on record {0} timed out")]
    LockTimeout(Gid),
    /// An update targeted a version expired by a committed transaction.
    #[error("record {0} was deleted")]
    RecordDeleted(Gid),
    /// No version of the record is visible to the calling transaction.
    #[error("record {0} not found")]
    NotFound(Gid),
    /// A checked vertex removal found incident edges.
    #[error("vertex {0} still has incident edges")]
    UnableToDeleteVertex(Gid),
    /// The transaction was wounded by an older lock contender and must
    /// abort; retry like a serialization conflict.
    #[error("transaction {0} was wounded by an older writer")]
    Wounded(quiver_common::TxnId),
    #[error("transaction error: {0}")]
    Transaction(#[from] quiver_transaction::TransactionError),
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    /// A remote worker rejected or failed a buffered update.
    #[error("remote update failed: {0}")]
    RemoteUpdate(String),
}

#[derive(Error, Debug)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("data corruption: record checksum mismatch")]
    ChecksumMismatch,
    #[error("data corruption: file hash trailer mismatch")]
    FileHashMismatch,
    #[error("record serialization failed: {0}")]
    SerializationFailed(String),
    #[error("record deserialization failed: {0}")]
    DeserializationFailed(String),
    /// A flush failed earlier; the log refuses further writes and the
    /// database must refuse further commits.
    #[error("write-ahead log is poisoned by an earlier write failure")]
    Poisoned,
}
