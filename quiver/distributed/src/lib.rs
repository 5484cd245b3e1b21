//! Cross-worker coordination: the RPC transport, the per-worker buffered
//! update server, the cluster registry and the client side that routes
//! record updates to their owning workers.

pub mod coordination;
pub mod error;
pub mod messages;
pub mod rpc;
pub mod updates;
pub mod worker;

pub use coordination::Coordination;
pub use error::{RpcError, RpcResult};
pub use messages::{RpcRequest, RpcResponse};
pub use rpc::client::Client;
pub use rpc::server::RpcServer;
pub use updates::UpdatesServer;
pub use worker::{UpdatesClients, Worker};
