use std::net::TcpStream;
use std::sync::Mutex;
use std::time::Duration;

use super::{read_frame, write_frame};
use crate::error::{RpcError, RpcResult};
use crate::messages::{RpcRequest, RpcResponse};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// A synchronous RPC client with a small connection pool per endpoint.
/// Connections are shared across all channels talking to the same worker; a
/// call that fails drops its connection instead of returning it.
pub struct Client {
    endpoint: String,
    pool: Mutex<Vec<TcpStream>>,
}

impl Client {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Client {
            endpoint: endpoint.into(),
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn checkout(&self) -> RpcResult<TcpStream> {
        if let Some(stream) = self.pool.lock().unwrap().pop() {
            return Ok(stream);
        }
        let stream = TcpStream::connect(&self.endpoint).map_err(|source| RpcError::Io {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        Ok(stream)
    }

    pub fn call(&self, request: &RpcRequest) -> RpcResult<RpcResponse> {
        let mut stream = self.checkout()?;
        let io = |source| RpcError::Io {
            endpoint: self.endpoint.clone(),
            source,
        };
        stream.set_read_timeout(Some(CALL_TIMEOUT)).map_err(io)?;
        stream.set_write_timeout(Some(CALL_TIMEOUT)).map_err(io)?;
        write_frame(&mut stream, request).map_err(io)?;
        let response = read_frame::<RpcResponse>(&mut stream).map_err(io)?;
        self.pool.lock().unwrap().push(stream);
        Ok(response)
    }
}
