//! Harmonic Model
//!
//! Entity types shared by the reactive and durable stores:
//! - **Message**: chat transcript entries (immutable once created)
//! - **Document**: versioned, tagged documentation items
//! - **Project**: lightweight workspace descriptors
//! - **AnalyticsEvent**: write-only usage events
//!
//! All entities serialize with camelCase field names and integer
//! millisecond timestamps, which is the layout used by the JSON export.
//!
//! # Example
//!
//! ```rust
//! use harmonic_model::{Document, DocumentId, DocumentPatch, DocumentType, NewDocument, Timestamp};
//!
//! let created = Timestamp::from_millis(1_000);
//! let mut doc = Document::create(
//!     DocumentId::generate(),
//!     NewDocument::new("Gears", "Alignment notes", DocumentType::Markdown).with_tags(["astro"]),
//!     created,
//! );
//! assert_eq!(doc.version, 1);
//!
//! doc.apply(DocumentPatch::new().title("Gears v2"), Timestamp::from_millis(2_000));
//! assert_eq!(doc.version, 2);
//! assert!(doc.matches("GEARS"));
//! ```

#![warn(missing_docs)]

pub mod analytics;
pub mod document;
pub mod error;
pub mod id;
pub mod message;
pub mod project;
pub mod time;

// Re-exports
pub use analytics::AnalyticsEvent;
pub use document::{filter_documents, Document, DocumentPatch, DocumentType, NewDocument, TagSet};
pub use error::ModelError;
pub use id::{DocumentId, EventId, MessageId, ProjectId};
pub use message::{CodeBlock, FileSummary, Message, MessageKind, MessageMetadata, NewMessage, Role};
pub use project::{NewProject, Project, ProjectPatch, ProjectStats};
pub use time::{Clock, ManualClock, SystemClock, Timestamp, MILLIS_PER_DAY};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Harmonic entities
    pub use crate::{
        AnalyticsEvent, Clock, Document, DocumentId, DocumentPatch, DocumentType, Message,
        MessageId, MessageKind, NewDocument, NewMessage, NewProject, Project, ProjectId,
        ProjectPatch, Role, Timestamp,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
