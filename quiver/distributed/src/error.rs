use std::io;

use thiserror::Error;

pub type RpcResult<T> = Result<T, RpcError>;

/// Transport-level failures. Every one of these escalates to a transaction
/// abort on the caller.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("IO error talking to {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("unexpected response for {0}")]
    UnexpectedResponse(&'static str),
    #[error("no known endpoint for worker {0}")]
    UnknownWorker(quiver_common::WorkerId),
}
