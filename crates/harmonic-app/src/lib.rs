//! Harmonic App
//!
//! Wires the durable and reactive stores into one service with a
//! configuration file, log setup and an operator CLI (`harmonic`).

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod service;

// Re-exports
pub use config::{DatabaseTarget, HarmonicConfig, LoggingConfig};
pub use error::AppError;
pub use logging::{init_tracing, resolve_filter};
pub use service::{backend_for, Harmonic};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
