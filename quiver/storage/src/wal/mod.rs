//! Delta-based write-ahead log.
//!
//! Record layout (little-endian): `u32 len | u32 crc32 | postcard payload`.
//! A rotated file ends with a sentinel trailer (`u32::MAX` in the length
//! slot followed by a 64-bit FNV-1a hash of every payload written to the
//! file); the live file has no trailer yet. Files are named
//! `wal-<latest_tx_id>.bin` after rotation, `wal-current.bin` while live.

pub mod recovery;

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use quiver_common::TxnId;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::delta::StateDelta;
use crate::error::{StorageResult, WalError};

const RECORD_HEADER_SIZE: usize = 8;
const TRAILER_SENTINEL: u32 = u32::MAX;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub const CURRENT_WAL_NAME: &str = "wal-current.bin";

fn fnv1a(hash: u64, bytes: &[u8]) -> u64 {
    bytes.iter().fold(hash, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Bounded buffer between delta producers and the flush thread. A full
/// buffer back-pressures writers instead of dropping deltas.
struct DeltaBuffer {
    deque: Mutex<VecDeque<StateDelta>>,
    not_full: Condvar,
    capacity: usize,
}

impl DeltaBuffer {
    fn new(capacity: usize) -> Self {
        DeltaBuffer {
            deque: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Condvar::new(),
            capacity,
        }
    }

    fn push(&self, delta: StateDelta) {
        let mut deque = self.deque.lock().unwrap();
        while deque.len() >= self.capacity {
            deque = self.not_full.wait(deque).unwrap();
        }
        deque.push_back(delta);
    }

    fn drain(&self) -> Vec<StateDelta> {
        let mut deque = self.deque.lock().unwrap();
        let drained = deque.drain(..).collect();
        self.not_full.notify_all();
        drained
    }
}

struct WalFile {
    directory: PathBuf,
    writer: BufWriter<File>,
    running_hash: u64,
    delta_count: usize,
    /// Latest transaction with a delta in the current file; names the file
    /// at rotation. Zero means nothing written yet.
    latest_tx: TxnId,
}

impl WalFile {
    fn open(directory: &Path) -> Result<Self, WalError> {
        fs::create_dir_all(directory)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(directory.join(CURRENT_WAL_NAME))?;
        Ok(WalFile {
            directory: directory.to_path_buf(),
            writer: BufWriter::new(file),
            running_hash: FNV_OFFSET,
            delta_count: 0,
            latest_tx: 0,
        })
    }

    fn append(&mut self, delta: &StateDelta) -> Result<(), WalError> {
        let payload = postcard::to_allocvec(delta)
            .map_err(|error| WalError::SerializationFailed(error.to_string()))?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&checksum.to_le_bytes());
        record.extend_from_slice(&payload);
        self.writer.write_all(&record)?;

        self.running_hash = fnv1a(self.running_hash, &payload);
        self.delta_count += 1;
        self.latest_tx = self.latest_tx.max(delta.tx_id());
        Ok(())
    }

    fn sync(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Seals the current file with the hash trailer, renames it after the
    /// latest transaction it contains and opens a fresh live file.
    fn rotate(&mut self) -> Result<(), WalError> {
        let mut trailer = Vec::with_capacity(12);
        trailer.extend_from_slice(&TRAILER_SENTINEL.to_le_bytes());
        trailer.extend_from_slice(&self.running_hash.to_le_bytes());
        self.writer.write_all(&trailer)?;
        self.sync()?;

        let rotated = self.directory.join(format!("wal-{}.bin", self.latest_tx));
        fs::rename(self.directory.join(CURRENT_WAL_NAME), &rotated)?;
        info!(file = %rotated.display(), deltas = self.delta_count, "rotated WAL file");

        *self = WalFile::open(&self.directory)?;
        Ok(())
    }
}

/// The write-ahead log: a bounded ring buffer of [`StateDelta`]s drained to
/// the current WAL file by a periodic flusher (see `GraphStore`), with
/// synchronous flushing of transaction ends when synchronous commit is on.
pub struct Wal {
    buffer: DeltaBuffer,
    file: Mutex<Option<WalFile>>,
    /// Off while recovery replays deltas through the live accessor path.
    enabled: AtomicBool,
    durability_enabled: bool,
    synchronous_commit: bool,
    rotate_deltas_count: usize,
    poisoned: AtomicBool,
}

impl Wal {
    pub fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        let file = if config.durability_enabled {
            Some(WalFile::open(&config.durability_directory)?)
        } else {
            None
        };
        Ok(Wal {
            buffer: DeltaBuffer::new(1 << 13),
            file: Mutex::new(file),
            enabled: AtomicBool::new(true),
            durability_enabled: config.durability_enabled,
            synchronous_commit: config.synchronous_commit,
            rotate_deltas_count: config.wal_rotate_deltas_count.max(1),
            poisoned: AtomicBool::new(false),
        })
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.durability_enabled && self.enabled.load(Ordering::Acquire)
    }

    /// Whether an earlier write failure has poisoned the log. A poisoned
    /// log refuses every further delta, which in turn fails all commits.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Buffers one delta. In synchronous-commit mode a transaction-end
    /// delta flushes the buffer before returning, so a committed
    /// transaction's deltas are durable before the commit is acknowledged.
    pub fn emplace(&self, delta: &StateDelta) -> StorageResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        if self.is_poisoned() {
            return Err(WalError::Poisoned.into());
        }
        let transaction_end = delta.is_transaction_end();
        self.buffer.push(delta.clone());
        if self.synchronous_commit && transaction_end {
            self.flush()?;
        }
        Ok(())
    }

    /// Drains the buffer to the current file, rotating at a transaction-end
    /// boundary once the configured delta count is reached (or
    /// unconditionally at twice the count, when no safe point appeared).
    pub fn flush(&self) -> StorageResult<()> {
        let drained = self.buffer.drain();
        let mut guard = self.file.lock().unwrap();
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };
        let result = (|| -> Result<(), WalError> {
            for delta in &drained {
                file.append(delta)?;
                if file.delta_count >= self.rotate_deltas_count
                    && (delta.is_transaction_end()
                        || file.delta_count >= self.rotate_deltas_count * 2)
                {
                    file.rotate()?;
                }
            }
            if !drained.is_empty() {
                file.sync()?;
            }
            Ok(())
        })();
        if let Err(error) = result {
            self.poisoned.store(true, Ordering::Release);
            warn!(%error, "WAL write failed; refusing further commits");
            return Err(error.into());
        }
        Ok(())
    }
}

/// Decodes every delta of one WAL file, verifying per-record checksums and,
/// when present, the file hash trailer. A torn tail (crash mid-write) ends
/// the iteration without error; corruption before the tail is an error.
pub fn read_wal_file(path: &Path) -> StorageResult<Vec<StateDelta>> {
    let bytes = fs::read(path).map_err(WalError::Io)?;
    let mut deltas = Vec::new();
    let mut running_hash = FNV_OFFSET;
    let mut offset = 0usize;
    while offset + RECORD_HEADER_SIZE <= bytes.len() {
        let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        if len == TRAILER_SENTINEL {
            let trailer_start = offset + 4;
            if trailer_start + 8 != bytes.len() {
                return Err(WalError::FileHashMismatch.into());
            }
            let expected =
                u64::from_le_bytes(bytes[trailer_start..trailer_start + 8].try_into().unwrap());
            if expected != running_hash {
                return Err(WalError::FileHashMismatch.into());
            }
            return Ok(deltas);
        }
        let checksum = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
        let payload_start = offset + RECORD_HEADER_SIZE;
        let payload_end = payload_start + len as usize;
        if payload_end > bytes.len() {
            // Torn final record.
            warn!(file = %path.display(), "WAL file ends mid-record; discarding tail");
            return Ok(deltas);
        }
        let payload = &bytes[payload_start..payload_end];
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != checksum {
            return Err(WalError::ChecksumMismatch.into());
        }
        let delta: StateDelta = postcard::from_bytes(payload)
            .map_err(|error| WalError::DeserializationFailed(error.to_string()))?;
        running_hash = fnv1a(running_hash, payload);
        deltas.push(delta);
        offset = payload_end;
    }
    if offset != bytes.len() {
        warn!(file = %path.display(), "WAL file ends mid-header; discarding tail");
    }
    Ok(deltas)
}
