use shurl_core::Kind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the redb-backed engine.
#[derive(Debug, Error)]
pub enum PersistentError {
    #[error("database error: {0}")]
    Redb(#[from] redb::Error),
    #[error("stored link is invalid: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("opening database [{}] timed out after {timeout:?}", path.display())]
    OpenTimeout { path: PathBuf, timeout: Duration },
    #[error("url index points at missing link [{id}]")]
    DanglingIndex { id: u64 },
    #[error("id space exhausted")]
    IdExhausted,
    #[error("blocking task failed: {0}")]
    Join(String),
}

impl PersistentError {
    /// Error kind reported to callers for this failure.
    pub fn kind(&self) -> Kind {
        match self {
            PersistentError::Redb(redb::Error::Io(_)) => Kind::Io,
            PersistentError::Redb(_) | PersistentError::OpenTimeout { .. } => Kind::Store,
            PersistentError::Codec(_)
            | PersistentError::DanglingIndex { .. }
            | PersistentError::IdExhausted
            | PersistentError::Join(_) => Kind::Internal,
        }
    }
}

macro_rules! impl_from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PersistentError {
                fn from(value: $ty) -> Self {
                    Self::Redb(redb::Error::from(value))
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Failures of the in-memory engine.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("link worker is gone")]
    WorkerLost,
    #[error("id space exhausted")]
    IdExhausted,
}

impl MemoryError {
    pub fn kind(&self) -> Kind {
        match self {
            MemoryError::Snapshot(SnapshotError::Io(_)) => Kind::Io,
            MemoryError::Snapshot(_) => Kind::Store,
            MemoryError::WorkerLost | MemoryError::IdExhausted => Kind::Internal,
        }
    }
}

/// Failures while loading or saving the in-memory engine's snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is malformed: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("snapshot entry [{key}] holds link [{id}]")]
    KeyMismatch { key: u64, id: u64 },
    #[error("snapshot maps url [{url}] to both [{first}] and [{second}]")]
    DuplicateUrl { url: String, first: u64, second: u64 },
    #[error("replacing snapshot failed: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("snapshot task failed: {0}")]
    Join(String),
}
