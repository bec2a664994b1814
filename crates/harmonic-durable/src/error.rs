//! Error types for the durable store
//!
//! Two layers:
//! - [`StorageError`]: raised by a storage backend (quota, permission, engine)
//! - [`DurableError`]: raised by [`DurableStore`](crate::DurableStore) methods

use crate::schema::Collection;

/// Backend (storage engine) errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Storage quota exhausted
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Access to the underlying storage was refused
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Backend has not been opened, or was closed
    #[error("storage backend is closed")]
    Closed,

    /// Collection was not declared in the schema passed to `open`
    #[error("unknown collection: {0}")]
    UnknownCollection(Collection),

    /// Index was not declared for the collection
    #[error("unknown index {index} on {collection}")]
    UnknownIndex {
        /// Collection queried
        collection: Collection,
        /// Index name requested
        index: String,
    },

    /// Stored record could not be encoded or decoded
    #[error("corrupt record {id} in {collection}: {message}")]
    CorruptRecord {
        /// Collection holding the record
        collection: Collection,
        /// Record id
        id: String,
        /// Decoder message
        message: String,
    },

    /// Schema migration failed
    #[error("migration to version {version} failed: {message}")]
    MigrationFailed {
        /// Target schema version
        version: u32,
        /// Engine message
        message: String,
    },

    /// Engine-internal failure
    #[error("storage engine error: {0}")]
    Engine(String),
}

impl StorageError {
    /// Check if retrying the same call could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Engine(_) | Self::QuotaExceeded(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::DiskFull) => Self::QuotaExceeded(err.to_string()),
            Some(ErrorCode::PermissionDenied | ErrorCode::ReadOnly | ErrorCode::CannotOpen) => {
                Self::PermissionDenied(err.to_string())
            }
            _ => Self::Engine(err.to_string()),
        }
    }
}

/// Durable store errors
#[derive(Debug, thiserror::Error)]
pub enum DurableError {
    /// A method was called before `init()` completed
    #[error("durable store not initialized")]
    NotInitialized,

    /// Backend failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Entity could not be (de)serialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Export document carries a format version this build cannot read
    #[error("unsupported export version: {0}")]
    UnsupportedExportVersion(String),
}

impl DurableError {
    /// Check if retrying the same call could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Result alias for durable store operations
pub type DurableResult<T> = Result<T, DurableError>;
