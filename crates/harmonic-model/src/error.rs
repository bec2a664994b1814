//! Error types for the entity model

/// Errors raised while parsing or validating entities
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Unknown message role string
    #[error("unknown message role: {0}")]
    UnknownRole(String),

    /// Unknown message kind string
    #[error("unknown message type: {0}")]
    UnknownMessageKind(String),

    /// Unknown document type string
    #[error("unknown document type: {0}")]
    UnknownDocumentType(String),
}
