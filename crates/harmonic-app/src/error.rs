//! Application-level errors

use harmonic_durable::DurableError;
use harmonic_reactive::ReactiveError;

/// Errors raised while configuring or running the service
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration file missing, unparsable or invalid
    #[error("config error in {path}: {message}")]
    Config {
        /// File (or `<string>`) the config came from
        path: String,
        /// What was wrong
        message: String,
    },

    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable store failure
    #[error(transparent)]
    Durable(#[from] DurableError),

    /// Reactive store lifecycle failure
    #[error(transparent)]
    Reactive(#[from] ReactiveError),
}

impl AppError {
    pub(crate) fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }
}
