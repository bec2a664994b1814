//! Chat messages
//!
//! Messages are created once by the "add message" action and never updated
//! in place. Only a bulk clear (or age-based pruning in the durable layer)
//! removes them.

use crate::error::ModelError;
use crate::id::MessageId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the user
    User,
    /// Produced by the assistant
    Assistant,
}

impl Role {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ModelError::UnknownRole(other.to_string())),
        }
    }
}

/// Message-kind tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Code question or answer
    Code,
    /// Documentation lookup
    Documentation,
    /// Anything else
    #[default]
    General,
}

impl MessageKind {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Documentation => "documentation",
            Self::General => "general",
        }
    }
}

impl FromStr for MessageKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "documentation" => Ok(Self::Documentation),
            "general" => Ok(Self::General),
            other => Err(ModelError::UnknownMessageKind(other.to_string())),
        }
    }
}

/// Code block referenced by a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Language tag of the block
    pub language: String,
    /// Source text
    pub code: String,
}

/// Summary of a file attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Optional structured annotations on a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Primary language of the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Code blocks referenced by the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_blocks: Vec<CodeBlock>,
    /// Attached file summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<FileSummary>,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier
    pub id: MessageId,
    /// Message text
    pub content: String,
    /// Author
    pub role: Role,
    /// Kind tag
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Creation instant
    pub timestamp: Timestamp,
    /// Optional annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Materialize a message from its input, assigning id and timestamp
    #[must_use]
    pub fn create(id: MessageId, input: NewMessage, timestamp: Timestamp) -> Self {
        Self {
            id,
            content: input.content,
            role: input.role,
            kind: input.kind,
            timestamp,
            metadata: input.metadata,
        }
    }
}

/// Input for the "add message" action (no id or timestamp yet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Message text
    pub content: String,
    /// Author
    pub role: Role,
    /// Kind tag
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Optional annotations
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
}

impl NewMessage {
    /// Create a general message
    #[inline]
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role,
            kind: MessageKind::General,
            metadata: None,
        }
    }

    /// Shorthand for a user message
    #[inline]
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Shorthand for an assistant message
    #[inline]
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// With kind tag
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// With metadata
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
