//! The RPC server: an accept thread feeds live connections into a bounded
//! queue drained by a fixed pool of worker threads. A worker reads one
//! request at a time with a short timeout and requeues the connection, so a
//! handful of threads serve arbitrarily many pooled client connections
//! without starving each other.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::{read_frame, write_frame};
use crate::messages::{RpcRequest, RpcResponse};

const QUEUE_CAPACITY: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: RpcRequest) -> RpcResponse;
}

impl<F> RequestHandler for F
where
    F: Fn(RpcRequest) -> RpcResponse + Send + Sync + 'static,
{
    fn handle(&self, request: RpcRequest) -> RpcResponse {
        self(request)
    }
}

struct ConnectionQueue {
    connections: Mutex<VecDeque<TcpStream>>,
    available: Condvar,
}

impl ConnectionQueue {
    fn push(&self, stream: TcpStream) -> bool {
        let mut connections = self.connections.lock().unwrap();
        if connections.len() >= QUEUE_CAPACITY {
            return false;
        }
        connections.push_back(stream);
        self.available.notify_one();
        true
    }

    fn pop(&self, alive: &AtomicBool) -> Option<TcpStream> {
        let mut connections = self.connections.lock().unwrap();
        loop {
            if let Some(stream) = connections.pop_front() {
                return Some(stream);
            }
            if !alive.load(Ordering::Acquire) {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(connections, POLL_INTERVAL)
                .unwrap();
            connections = guard;
        }
    }
}

pub struct RpcServer {
    local_addr: SocketAddr,
    alive: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl RpcServer {
    /// Binds `address` (use port 0 for an ephemeral port) and starts the
    /// accept loop plus `workers_count` handler threads.
    pub fn bind<H: RequestHandler>(
        address: &str,
        workers_count: usize,
        handler: Arc<H>,
    ) -> io::Result<RpcServer> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let alive = Arc::new(AtomicBool::new(true));
        let queue = Arc::new(ConnectionQueue {
            connections: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        });

        let mut threads = Vec::new();
        {
            let alive = Arc::clone(&alive);
            let queue = Arc::clone(&queue);
            threads.push(
                thread::Builder::new()
                    .name("rpc-accept".to_owned())
                    .spawn(move || {
                        while alive.load(Ordering::Acquire) {
                            match listener.accept() {
                                Ok((stream, peer)) => {
                                    debug!(%peer, "accepted RPC connection");
                                    if !queue.push(stream) {
                                        warn!(%peer, "connection queue full, dropping");
                                    }
                                }
                                Err(error) if error.kind() == ErrorKind::WouldBlock => {
                                    thread::sleep(POLL_INTERVAL);
                                }
                                Err(error) => {
                                    warn!(%error, "accept failed");
                                    thread::sleep(POLL_INTERVAL);
                                }
                            }
                        }
                    })?,
            );
        }

        for index in 0..workers_count.max(1) {
            let alive = Arc::clone(&alive);
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            threads.push(
                thread::Builder::new()
                    .name(format!("rpc-worker-{index}"))
                    .spawn(move || {
                        while let Some(stream) = queue.pop(&alive) {
                            match serve_one(stream, handler.as_ref()) {
                                Ok(Some(stream)) => {
                                    // The connection stays live; requeue it.
                                    queue.push(stream);
                                }
                                Ok(None) => {}
                                Err(error) => {
                                    debug!(%error, "dropping RPC connection");
                                }
                            }
                        }
                    })?,
            );
        }

        Ok(RpcServer {
            local_addr,
            alive,
            threads,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> String {
        self.local_addr.to_string()
    }

    pub fn shutdown(&mut self) {
        self.alive.store(false, Ordering::Release);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// External shutdown trigger, used by the StopWorker handler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serves at most one request from the stream. Returns the stream when the
/// connection should be kept, `None` on orderly EOF. The frame header is
/// peeked first so a poll timeout never leaves a half-consumed frame.
fn serve_one<H: RequestHandler + ?Sized>(
    mut stream: TcpStream,
    handler: &H,
) -> io::Result<Option<TcpStream>> {
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    let mut header = [0u8; 4];
    match stream.peek(&mut header) {
        Ok(0) => return Ok(None),
        // A partial header: leave it buffered and come back later.
        Ok(n) if n < header.len() => return Ok(Some(stream)),
        Ok(_) => {}
        Err(error) if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            return Ok(Some(stream));
        }
        Err(error) => return Err(error),
    }
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let request = read_frame::<RpcRequest>(&mut stream)?;
    let response = handler.handle(request);
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;
    write_frame(&mut stream, &response)?;
    Ok(Some(stream))
}
