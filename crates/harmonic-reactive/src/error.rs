//! Error types for the reactive store
//!
//! Actions never fail; only lifecycle calls (construction, hydration,
//! flush, dispose) return these.

use harmonic_durable::DurableError;

/// Reactive store lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// Constructed outside a Tokio runtime
    #[error("reactive store requires a running tokio runtime")]
    NoRuntime,

    /// Persistence worker is no longer running
    #[error("persistence worker stopped")]
    WorkerStopped,

    /// Durable store failure during hydration
    #[error(transparent)]
    Durable(#[from] DurableError),
}

/// Result alias for reactive store lifecycle calls
pub type ReactiveResult<T> = Result<T, ReactiveError>;
