//! Harmonic Reactive Store
//!
//! Observable in-memory state for the dashboard (chat messages,
//! documents, selection, search term, projects, feature flags) whose
//! actions mutate synchronously, notify subscribers, and mirror each change
//! into a [`harmonic_durable::DurableStore`] in the background.
//!
//! # Key Concepts
//!
//! - **Actions** never fail and never wait for storage
//! - **Persistence worker** applies durable writes one at a time, in call order
//! - **Policies** decide per action family whether a failed write is rolled back
//! - **Failures** are logged and broadcast on [`ReactiveStore::subscribe_failures`]
//!
//! # Example
//!
//! ```rust
//! use harmonic_durable::DurableStore;
//! use harmonic_model::{DocumentPatch, DocumentType, NewDocument};
//! use harmonic_reactive::{ReactiveConfig, ReactiveStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let durable = Arc::new(DurableStore::in_memory());
//! durable.init().await.unwrap();
//! let store = ReactiveStore::new(durable, ReactiveConfig::default()).unwrap();
//!
//! let doc = store.add_document(NewDocument::new("Gears", "notes", DocumentType::Markdown));
//! assert!(store.update_document(&doc.id, DocumentPatch::new().title("Gears v2")).is_applied());
//! assert_eq!(store.snapshot().document(&doc.id).unwrap().version, 2);
//!
//! store.dispose().await.unwrap();
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod persistence;
pub mod policy;
pub mod state;
pub mod store;

// Re-exports
pub use error::{ReactiveError, ReactiveResult};
pub use persistence::PersistenceFailure;
pub use policy::{ActionKind, PersistencePolicies, PersistencePolicy};
pub use state::{AppState, FeatureFlags, Page, Theme};
pub use store::{Mutation, ReactiveConfig, ReactiveStore, SubscriptionId, NAVIGATION_EVENT};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the reactive store
    pub use crate::{
        AppState, Mutation, Page, PersistenceFailure, PersistencePolicy, ReactiveConfig,
        ReactiveStore,
    };
}
