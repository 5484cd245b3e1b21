use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Internal identifier associated with a transaction.
pub type TxnId = u64;

/// Identifier of one worker process in the cluster.
pub type WorkerId = i32;

/// Internal identifier associated with a label.
///
/// [`NonZeroU32`] is used to enable some memory layout optimizations:
/// `Option<LabelId>` is guaranteed to have the same size as `LabelId`.
pub type LabelId = NonZeroU32;

/// Internal identifier associated with a property key.
pub type PropertyId = u32;

/// Internal identifier associated with an edge type.
pub type EdgeTypeId = u32;

/// Number of high bits of a [`Gid`] that encode the owning worker.
const WORKER_BITS: u32 = 10;
const LOCAL_BITS: u32 = 64 - WORKER_BITS;
const LOCAL_MASK: u64 = (1 << LOCAL_BITS) - 1;

/// An opaque 64-bit global record identifier, unique across the cluster.
///
/// The top [`WORKER_BITS`] bits carry the id of the worker that owns the
/// record; the remainder is a worker-local counter value.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Gid(u64);

impl Gid {
    pub fn new(worker_id: WorkerId, local_id: u64) -> Self {
        debug_assert!(worker_id >= 0 && (worker_id as u64) < (1 << WORKER_BITS));
        debug_assert!(local_id <= LOCAL_MASK);
        Gid(((worker_id as u64) << LOCAL_BITS) | (local_id & LOCAL_MASK))
    }

    pub fn from_raw(raw: u64) -> Self {
        Gid(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The worker that owns this record.
    pub fn worker_id(&self) -> WorkerId {
        (self.0 >> LOCAL_BITS) as WorkerId
    }

    pub fn local_id(&self) -> u64 {
        self.0 & LOCAL_MASK
    }
}

impl fmt::Debug for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gid({}:{})", self.worker_id(), self.local_id())
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.worker_id(), self.local_id())
    }
}

/// A global record address: the owning worker plus the record gid.
///
/// All cross-worker messages refer to records by address; a record pointer is
/// only ever resolved from an address on the worker that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub worker_id: WorkerId,
    pub gid: Gid,
}

impl Address {
    pub fn new(worker_id: WorkerId, gid: Gid) -> Self {
        Address { worker_id, gid }
    }

    pub fn is_local_to(&self, worker_id: WorkerId) -> bool {
        self.worker_id == worker_id
    }
}

impl From<Gid> for Address {
    fn from(gid: Gid) -> Self {
        Address {
            worker_id: gid.worker_id(),
            gid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gid_encodes_worker_in_high_bits() {
        let gid = Gid::new(3, 42);
        assert_eq!(gid.worker_id(), 3);
        assert_eq!(gid.local_id(), 42);
        assert_eq!(Gid::from_raw(gid.raw()), gid);
    }

    #[test]
    fn address_from_gid_is_owner() {
        let gid = Gid::new(7, 1);
        let address = Address::from(gid);
        assert_eq!(address.worker_id, 7);
        assert!(address.is_local_to(7));
        assert!(!address.is_local_to(0));
    }
}
