//! Projects

use crate::id::ProjectId;
use crate::time::Timestamp;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// File and line counts for a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    /// Number of files
    pub files: u64,
    /// Number of lines
    pub lines: u64,
}

/// A project descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Languages used, insertion ordered
    #[serde(default)]
    pub languages: IndexSet<String>,
    /// Size statistics
    #[serde(default)]
    pub stats: ProjectStats,
    /// Bumped on every mutation or selection
    pub last_active: Timestamp,
}

impl Project {
    /// Materialize a project from its input
    #[must_use]
    pub fn create(id: ProjectId, input: NewProject, now: Timestamp) -> Self {
        Self {
            id,
            name: input.name,
            description: input.description,
            languages: input.languages,
            stats: input.stats,
            last_active: now,
        }
    }

    /// Merge a patch and mark the project active
    pub fn apply(&mut self, patch: ProjectPatch, now: Timestamp) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(languages) = patch.languages {
            self.languages = languages;
        }
        if let Some(stats) = patch.stats {
            self.stats = stats;
        }
        self.touch(now);
    }

    /// Bump `last_active` (never backwards)
    #[inline]
    pub fn touch(&mut self, now: Timestamp) {
        self.last_active = self.last_active.max(now);
    }
}

/// Input for the "add project" action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProject {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Languages used
    pub languages: IndexSet<String>,
    /// Size statistics
    pub stats: ProjectStats,
}

impl NewProject {
    /// Create a project input with a name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With languages
    #[must_use]
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// With stats
    #[inline]
    #[must_use]
    pub fn with_stats(mut self, files: u64, lines: u64) -> Self {
        self.stats = ProjectStats { files, lines };
        self
    }
}

/// Partial update for a project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Replacement language set
    pub languages: Option<IndexSet<String>>,
    /// New stats
    pub stats: Option<ProjectStats>,
}

impl ProjectPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set name
    #[inline]
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set description
    #[inline]
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set stats
    #[inline]
    #[must_use]
    pub fn stats(mut self, files: u64, lines: u64) -> Self {
        self.stats = Some(ProjectStats { files, lines });
        self
    }
}
