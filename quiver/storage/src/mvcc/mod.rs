pub mod lock_store;
pub mod version_list;

pub use lock_store::{LockStore, RecordKind};
pub use version_list::VersionList;
