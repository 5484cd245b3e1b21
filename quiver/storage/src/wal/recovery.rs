//! Startup replay of the durability directory.
//!
//! Deltas are replayed in the order they appear, grouped under their owning
//! transaction, through the same graph accessor used by live operation; the
//! WAL itself is disabled for the duration. Transactions without a commit
//! marker anywhere in the log are discarded, which also settles the fate of
//! transactions torn at a rotation boundary.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use quiver_common::TxnId;
use quiver_transaction::Transaction;
use tracing::{info, warn};

use super::{read_wal_file, CURRENT_WAL_NAME};
use crate::delta::StateDelta;
use crate::error::{StorageResult, WalError};
use crate::graph::store::GraphStore;

#[derive(Debug, Default)]
pub struct RecoveryStats {
    pub files: usize,
    pub transactions: usize,
    pub deltas: usize,
}

/// WAL files in replay order: rotated files by ascending latest-transaction
/// id, then the live file.
fn wal_files(directory: &std::path::Path) -> StorageResult<Vec<PathBuf>> {
    let mut rotated: Vec<(TxnId, PathBuf)> = Vec::new();
    let mut current = None;
    for entry in fs::read_dir(directory).map_err(WalError::Io)? {
        let entry = entry.map_err(WalError::Io)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == CURRENT_WAL_NAME {
            current = Some(entry.path());
        } else if let Some(id) = name
            .strip_prefix("wal-")
            .and_then(|rest| rest.strip_suffix(".bin"))
            .and_then(|id| id.parse::<TxnId>().ok())
        {
            rotated.push((id, entry.path()));
        }
    }
    rotated.sort_by_key(|(id, _)| *id);
    let mut files: Vec<PathBuf> = rotated.into_iter().map(|(_, path)| path).collect();
    files.extend(current);
    Ok(files)
}

/// The transaction id named by the latest snapshot file, if any; replay
/// starts after it.
fn snapshot_boundary(directory: &std::path::Path) -> TxnId {
    let Ok(entries) = fs::read_dir(directory) else {
        return 0;
    };
    entries
        .flatten()
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("snapshot-"))
                .and_then(|id| id.parse::<TxnId>().ok())
        })
        .max()
        .unwrap_or(0)
}

pub fn recover(store: &Arc<GraphStore>) -> StorageResult<RecoveryStats> {
    let mut stats = RecoveryStats::default();
    if !store.config().durability_enabled {
        return Ok(stats);
    }
    let directory = store.config().durability_directory.clone();
    if !directory.exists() {
        return Ok(stats);
    }

    let boundary = snapshot_boundary(&directory);
    let files = wal_files(&directory)?;
    stats.files = files.len();

    let mut deltas = Vec::new();
    for file in &files {
        match read_wal_file(file) {
            Ok(mut file_deltas) => deltas.append(&mut file_deltas),
            Err(error) => {
                warn!(file = %file.display(), %error, "skipping unreadable WAL tail");
                break;
            }
        }
    }

    let committed: HashSet<TxnId> = deltas
        .iter()
        .filter_map(|delta| match delta {
            StateDelta::TransactionCommit { tx_id } => Some(*tx_id),
            _ => None,
        })
        .collect();

    store.wal().set_enabled(false);
    let mut running: HashMap<TxnId, Arc<Transaction>> = HashMap::new();
    for delta in &deltas {
        let tx_id = delta.tx_id();
        if tx_id <= boundary || !committed.contains(&tx_id) {
            continue;
        }
        let transaction = running
            .entry(tx_id)
            .or_insert_with(|| store.begin_remote(tx_id))
            .clone();
        let accessor = store.access(Arc::clone(&transaction));
        match delta {
            StateDelta::TransactionBegin { .. } => {}
            StateDelta::TransactionCommit { .. } => {
                store.commit(&transaction)?;
                running.remove(&tx_id);
                stats.transactions += 1;
            }
            // Filtered out by the committed set.
            StateDelta::TransactionAbort { .. } => {}
            StateDelta::CreateVertex { gid, .. } => {
                accessor.insert_vertex_at(*gid)?;
            }
            StateDelta::CreateEdge {
                gid,
                from,
                to,
                edge_type,
                ..
            } => {
                accessor.insert_only_edge(*gid, *from, *to, *edge_type)?;
            }
            StateDelta::BuildIndex {
                label, property, ..
            } => {
                accessor.build_index(*label, *property)?;
            }
            _ => accessor.apply_delta(delta)?,
        }
        stats.deltas += 1;
    }
    // A committed transaction can only be left running here if its commit
    // marker fell behind the snapshot boundary; drop it cleanly.
    for (_, transaction) in running {
        store.abort(&transaction)?;
    }
    store.wal().set_enabled(true);

    if stats.deltas > 0 {
        info!(
            files = stats.files,
            transactions = stats.transactions,
            deltas = stats.deltas,
            "recovered graph state from WAL"
        );
    }
    Ok(stats)
}
