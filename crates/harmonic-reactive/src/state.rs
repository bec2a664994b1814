//! Application state held by the reactive store
//!
//! Subscribers and callers only ever see `&AppState` through a snapshot;
//! all mutation goes through store actions.

use harmonic_model::{filter_documents, Document, DocumentId, Message, Project, ProjectId};
use serde::{Deserialize, Serialize};

/// Dashboard page currently shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    /// Metrics overview
    #[default]
    Dashboard,
    /// Assistant chat
    Chat,
    /// Documentation manager
    Documentation,
    /// Project list
    Projects,
    /// Usage analytics
    Analytics,
    /// Preferences
    Settings,
}

impl Page {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Chat => "chat",
            Self::Documentation => "documentation",
            Self::Projects => "projects",
            Self::Analytics => "analytics",
            Self::Settings => "settings",
        }
    }
}

/// Color theme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Dark (default)
    #[default]
    Dark,
    /// Light
    Light,
}

/// Feature toggles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeatureFlags {
    /// Log a `navigation` analytics event on every page change
    pub navigation_analytics: bool,
}

/// Snapshot of everything the UI renders from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    /// Page currently shown
    pub current_page: Page,
    /// Chat transcript, oldest first
    pub messages: Vec<Message>,
    /// Documents in insertion order
    pub documents: Vec<Document>,
    /// Selected document id
    pub selected_document: Option<DocumentId>,
    /// Documentation search term
    pub search_term: String,
    /// Projects in insertion order
    pub projects: Vec<Project>,
    /// Selected project id
    pub selected_project: Option<ProjectId>,
    /// Feature toggles
    pub feature_flags: FeatureFlags,
    /// Color theme
    pub theme: Theme,
    /// True once rows from the durable store have been loaded
    pub hydrated: bool,
}

impl AppState {
    /// Documents matching the current search term
    ///
    /// Recomputed on every call.
    #[must_use]
    pub fn filtered_documents(&self) -> Vec<&Document> {
        filter_documents(&self.documents, &self.search_term)
    }

    /// Document by id
    #[must_use]
    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| &d.id == id)
    }

    /// The selected document, if it still exists
    #[must_use]
    pub fn selected_document(&self) -> Option<&Document> {
        self.selected_document.as_ref().and_then(|id| self.document(id))
    }

    /// Project by id
    #[must_use]
    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| &p.id == id)
    }

    /// The selected project, if it still exists
    #[must_use]
    pub fn selected_project(&self) -> Option<&Project> {
        self.selected_project.as_ref().and_then(|id| self.project(id))
    }

    pub(crate) fn document_index(&self, id: &DocumentId) -> Option<usize> {
        self.documents.iter().position(|d| &d.id == id)
    }

    pub(crate) fn project_index(&self, id: &ProjectId) -> Option<usize> {
        self.projects.iter().position(|p| &p.id == id)
    }
}
