//! Persistence interface and storage engines
//!
//! [`StorageBackend`] is the seam between the durable store's typed
//! contract and whatever engine holds the bytes. Every call is its own
//! short-lived transaction; no call spans another.
//!
//! Engines:
//! - [`MemoryBackend`]: process-local maps with ordered secondary indexes
//! - [`SqliteBackend`]: a SQLite file (or in-memory database)

use crate::error::StorageError;
use crate::schema::{Collection, CollectionSchema, Direction, KeyRange};
use serde_json::Value;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::{SqliteBackend, SqliteLocation};

/// Storage engine contract
///
/// Records are JSON objects; `id` is the primary key. Index queries return
/// each matching record at most once, in index order for the requested
/// direction (records sharing a key are ordered by id).
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open the engine and create any missing collections and indexes
    ///
    /// Must be idempotent; existing data is preserved.
    async fn open(&self, schema: &[CollectionSchema]) -> Result<(), StorageError>;

    /// Release engine resources; later calls fail with `Closed`
    async fn close(&self) -> Result<(), StorageError>;

    /// Fetch a record by id
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError>;

    /// Fetch every record of a collection
    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, StorageError>;

    /// Insert or replace a record
    async fn put(&self, collection: Collection, id: &str, record: Value)
        -> Result<(), StorageError>;

    /// Remove a record; `Ok(false)` if it did not exist
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StorageError>;

    /// Remove every record of a collection, returning how many were removed
    async fn clear(&self, collection: Collection) -> Result<usize, StorageError>;

    /// Number of records in a collection
    async fn count(&self, collection: Collection) -> Result<usize, StorageError>;

    /// Records whose index keys fall within `range`
    async fn query_index(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StorageError>;

    /// Remove records whose index keys fall within `range`
    async fn delete_index_range(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
    ) -> Result<usize, StorageError>;
}
