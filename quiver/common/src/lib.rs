//! Shared identifier types, property values and small utilities used by
//! every other quiver crate.

pub mod scheduler;
pub mod types;
pub mod value;

pub use scheduler::Scheduler;
pub use types::{Address, EdgeTypeId, Gid, LabelId, PropertyId, TxnId, WorkerId};
pub use value::{IndexOrd, PropertyValue, F64};
