//! Harmonic Durable Store
//!
//! Local structured storage for the Harmonic dashboard: four collections
//! (messages, documents, projects, analytics) with secondary indexes and
//! asynchronous CRUD, range and index queries.
//!
//! # Architecture
//!
//! - [`DurableStore`]: typed operations, init lifecycle, export/import
//! - [`StorageBackend`]: engine seam (`MemoryBackend`, `SqliteBackend`)
//! - [`schema`]: collections, index declarations, keys and ranges
//!
//! # Example
//!
//! ```rust
//! use harmonic_durable::DurableStore;
//! use harmonic_model::{Message, MessageId, NewMessage, Timestamp};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = DurableStore::in_memory();
//! store.init().await.unwrap();
//!
//! let msg = Message::create(
//!     MessageId::generate(),
//!     NewMessage::user("hi"),
//!     Timestamp::from_millis(1),
//! );
//! store.save_message(&msg).await.unwrap();
//! assert_eq!(store.get_messages(10).await.unwrap().len(), 1);
//! # }
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod export;
pub mod schema;
pub mod store;

// Re-exports
pub use backend::{MemoryBackend, SqliteBackend, SqliteLocation, StorageBackend};
pub use error::{DurableError, DurableResult, StorageError};
pub use export::{ClearReport, ExportData, ExportDocument, StoreStats, EXPORT_FORMAT_VERSION};
pub use schema::{
    default_schema, Collection, CollectionSchema, Direction, IndexKey, IndexSpec, KeyRange,
};
pub use store::{DurableStore, MessageOrder};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the durable store
    pub use crate::{
        DurableError, DurableResult, DurableStore, ExportDocument, MemoryBackend, MessageOrder,
        SqliteBackend, StorageBackend, StoreStats,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
