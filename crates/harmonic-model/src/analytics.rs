//! Analytics events
//!
//! Write-only from the UI's point of view; read back only for dashboards
//! and exports.

use crate::id::EventId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A logged analytics event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Unique identifier
    pub id: EventId,
    /// Free-form event name
    pub event: String,
    /// Arbitrary payload
    #[serde(default)]
    pub data: Value,
    /// When the event was logged
    pub timestamp: Timestamp,
}

impl AnalyticsEvent {
    /// Create an event with a fresh id
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value, timestamp: Timestamp) -> Self {
        Self {
            id: EventId::generate(),
            event: event.into(),
            data,
            timestamp,
        }
    }
}
