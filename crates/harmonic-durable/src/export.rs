//! Export document and store statistics
//!
//! The export layout is fixed:
//!
//! ```json
//! { "version": "1.0", "timestamp": 1700000000000,
//!   "data": { "messages": [], "documents": [], "projects": [], "analytics": [],
//!             "stats": { "totalMessages": 0, "totalDocuments": 0,
//!                        "totalProjects": 0, "totalEvents": 0 } } }
//! ```
//!
//! Collections are emitted in a deterministic order so that equal store
//! contents export to equal bytes.

use crate::error::{DurableError, DurableResult};
use harmonic_model::{AnalyticsEvent, Document, Message, Project, Timestamp};
use serde::{Deserialize, Serialize};

/// Export format version written and accepted by this build
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Row counts per collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Messages
    pub total_messages: usize,
    /// Documents
    pub total_documents: usize,
    /// Projects
    pub total_projects: usize,
    /// Analytics events
    pub total_events: usize,
}

impl StoreStats {
    /// Sum over all collections
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.total_messages + self.total_documents + self.total_projects + self.total_events
    }
}

/// Rows removed by `clear_old_data`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Messages removed
    pub messages: usize,
    /// Analytics events removed
    pub events: usize,
}

/// The `data` section of an export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportData {
    /// Messages, oldest first
    pub messages: Vec<Message>,
    /// Documents, oldest first
    pub documents: Vec<Document>,
    /// Projects, least recently active first
    pub projects: Vec<Project>,
    /// Analytics events, oldest first
    pub analytics: Vec<AnalyticsEvent>,
    /// Counts of the four lists above
    pub stats: StoreStats,
}

impl ExportData {
    /// Build from unordered collections, sorting each deterministically
    #[must_use]
    pub fn new(
        mut messages: Vec<Message>,
        mut documents: Vec<Document>,
        mut projects: Vec<Project>,
        mut analytics: Vec<AnalyticsEvent>,
    ) -> Self {
        messages.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        documents.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        projects.sort_by(|a, b| (a.last_active, &a.id).cmp(&(b.last_active, &b.id)));
        analytics.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));

        let stats = StoreStats {
            total_messages: messages.len(),
            total_documents: documents.len(),
            total_projects: projects.len(),
            total_events: analytics.len(),
        };
        Self {
            messages,
            documents,
            projects,
            analytics,
            stats,
        }
    }
}

/// A full export of the durable store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Format version, `"1.0"`
    pub version: String,
    /// When the export was taken
    pub timestamp: Timestamp,
    /// Exported rows
    pub data: ExportData,
}

impl ExportDocument {
    /// Wrap `data` in a current-version envelope
    #[must_use]
    pub fn new(data: ExportData, timestamp: Timestamp) -> Self {
        Self {
            version: EXPORT_FORMAT_VERSION.to_string(),
            timestamp,
            data,
        }
    }

    /// Fail unless this build can read the document's format version
    pub fn check_version(&self) -> DurableResult<()> {
        if self.version == EXPORT_FORMAT_VERSION {
            Ok(())
        } else {
            Err(DurableError::UnsupportedExportVersion(self.version.clone()))
        }
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> DurableResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and version-check an export
    pub fn from_json(json: &str) -> DurableResult<Self> {
        let doc: Self = serde_json::from_str(json)?;
        doc.check_version()?;
        Ok(doc)
    }
}
