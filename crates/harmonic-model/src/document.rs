//! Documentation items and the document search predicate
//!
//! Documents carry a version counter that starts at 1 and grows by exactly
//! one per applied patch. `updated_at` never moves backwards and is always
//! `>= created_at`.

use crate::error::ModelError;
use crate::id::DocumentId;
use crate::time::Timestamp;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ordered set of tags (insertion order kept for display, duplicates dropped)
pub type TagSet = IndexSet<String>;

/// Kind of documentation item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Markdown prose
    #[default]
    Markdown,
    /// Source code snippet
    Code,
    /// API reference
    Api,
}

impl DocumentType {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Code => "code",
            Self::Api => "api",
        }
    }
}

impl FromStr for DocumentType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(Self::Markdown),
            "code" => Ok(Self::Code),
            "api" => Ok(Self::Api),
            other => Err(ModelError::UnknownDocumentType(other.to_string())),
        }
    }
}

/// A documentation item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique identifier, immutable
    pub id: DocumentId,
    /// Title text
    pub title: String,
    /// Body text
    pub content: String,
    /// Kind of item
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    /// Tags in insertion order
    #[serde(default)]
    pub tags: TagSet,
    /// Creation instant, immutable
    pub created_at: Timestamp,
    /// Last mutation instant
    pub updated_at: Timestamp,
    /// Update counter, starts at 1
    pub version: u64,
    /// Optional author name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Document {
    /// Materialize a new document at version 1
    #[must_use]
    pub fn create(id: DocumentId, input: NewDocument, now: Timestamp) -> Self {
        Self {
            id,
            title: input.title,
            content: input.content,
            doc_type: input.doc_type,
            tags: input.tags,
            created_at: now,
            updated_at: now,
            version: 1,
            author: input.author,
        }
    }

    /// Merge a partial patch, bump `updated_at` and the version
    ///
    /// `updated_at` advances by at least one millisecond per patch so that
    /// every update is observable even when the clock has not ticked.
    pub fn apply(&mut self, patch: DocumentPatch, now: Timestamp) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(doc_type) = patch.doc_type {
            self.doc_type = doc_type;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(author) = patch.author {
            self.author = author;
        }
        self.updated_at = now.max(self.updated_at.offset(1));
        self.version += 1;
    }

    /// Case-insensitive match of `term` against title, content and tags
    ///
    /// An empty term matches every document.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        self.matches_lowercase(&term.to_lowercase())
    }

    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.title.to_lowercase().contains(needle)
            || self.content.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }

    /// Case-insensitive match of `query` against title and content only
    #[must_use]
    pub fn text_contains(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        needle.is_empty()
            || self.title.to_lowercase().contains(&needle)
            || self.content.to_lowercase().contains(&needle)
    }

    /// True if any of `tags` is present on the document
    #[must_use]
    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.tags.contains(t.as_ref()))
    }
}

/// Filter documents by a search term (title, content or any tag)
///
/// Pure function of its inputs; order of `documents` is preserved.
#[must_use]
pub fn filter_documents<'a>(documents: &'a [Document], term: &str) -> Vec<&'a Document> {
    let needle = term.to_lowercase();
    documents
        .iter()
        .filter(|d| d.matches_lowercase(&needle))
        .collect()
}

/// Input for the "add document" action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDocument {
    /// Title text
    pub title: String,
    /// Body text
    pub content: String,
    /// Kind of item
    pub doc_type: DocumentType,
    /// Tags in insertion order
    pub tags: TagSet,
    /// Optional author name
    pub author: Option<String>,
}

impl NewDocument {
    /// Create an untagged document input
    #[inline]
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        doc_type: DocumentType,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            doc_type,
            tags: TagSet::new(),
            author: None,
        }
    }

    /// With tags (duplicates dropped, first occurrence wins)
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// With author
    #[inline]
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Partial update for a document
///
/// Identity and bookkeeping fields (`id`, `created_at`, `updated_at`,
/// `version`) are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    /// New title
    pub title: Option<String>,
    /// New body
    pub content: Option<String>,
    /// New kind
    pub doc_type: Option<DocumentType>,
    /// Replacement tag set
    pub tags: Option<TagSet>,
    /// New author (`Some(None)` clears it)
    pub author: Option<Option<String>>,
}

impl DocumentPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set title
    #[inline]
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set content
    #[inline]
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set kind
    #[inline]
    #[must_use]
    pub fn doc_type(mut self, doc_type: DocumentType) -> Self {
        self.doc_type = Some(doc_type);
        self
    }

    /// Replace tags
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Set or clear author
    #[inline]
    #[must_use]
    pub fn author(mut self, author: Option<String>) -> Self {
        self.author = Some(author);
        self
    }

    /// True if the patch changes nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.doc_type.is_none()
            && self.tags.is_none()
            && self.author.is_none()
    }
}
