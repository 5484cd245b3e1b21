//! Transactional storage engine: MVCC version lists over vertex and edge
//! records, a record-lock store with wound-wait deadlock avoidance, label
//! and label-property indexes, a delta-based write-ahead log and the
//! transaction-bound graph accessor that ties them together.

pub mod config;
pub mod delta;
pub mod error;
pub mod graph;
pub mod indexes;
pub mod model;
pub mod mvcc;
pub mod wal;

pub use config::DatabaseConfig;
pub use delta::{StateDelta, UpdateResult};
pub use error::{StorageError, StorageResult};
pub use graph::accessor::{EdgeAccessor, GraphAccessor, VertexAccessor};
pub use graph::store::GraphStore;
pub use graph::RemoteUpdates;
