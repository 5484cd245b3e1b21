use std::path::PathBuf;

use serde::Deserialize;

/// Runtime options recognized by the storage engine. Loading these from a
/// file or the command line is the embedder's job; defaults match a
/// single-worker development setup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub durability_directory: PathBuf,
    pub durability_enabled: bool,
    pub synchronous_commit: bool,
    pub wal_flush_interval_ms: u64,
    pub wal_rotate_deltas_count: usize,
    pub query_execution_timeout_sec: u64,
    pub lock_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            durability_directory: PathBuf::from("durability"),
            durability_enabled: true,
            synchronous_commit: true,
            wal_flush_interval_ms: 100,
            wal_rotate_deltas_count: 10_000,
            query_execution_timeout_sec: 180,
            lock_timeout_ms: 2_000,
        }
    }
}
