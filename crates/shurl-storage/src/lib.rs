pub mod config;
pub mod error;
pub mod memory;
pub mod persistent;

pub use config::{open_store, MemoryConfig, PersistentConfig, StoreConfig};
pub use error::{MemoryError, PersistentError, SnapshotError};
pub use memory::MemoryLinkStore;
pub use persistent::RedbLinkStore;
