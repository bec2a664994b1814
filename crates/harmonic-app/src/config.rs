//! Service configuration
//!
//! Resolution order (highest priority first):
//! 1. Explicit overrides (CLI flags)
//! 2. Environment variables (`HARMONIC_DATABASE`, `HARMONIC_LOG`, `RUST_LOG`)
//! 3. TOML file
//! 4. Compiled defaults
//!
//! ```toml
//! database = "harmonic.db"        # or "memory"
//! initial_message_limit = 50
//! retention_days = 30
//! failure_channel_capacity = 64
//!
//! [policies]
//! add_document = "optimistic_with_rollback"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use crate::error::AppError;
use harmonic_reactive::{PersistencePolicies, ReactiveConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `database`
pub const DATABASE_ENV: &str = "HARMONIC_DATABASE";
/// Environment variable overriding `logging.level` (full `EnvFilter` syntax)
pub const LOG_ENV: &str = "HARMONIC_LOG";

/// Where durable data lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DatabaseTarget {
    /// Process memory; nothing survives exit
    #[default]
    Memory,
    /// SQLite database file
    Sqlite(PathBuf),
}

impl From<String> for DatabaseTarget {
    fn from(value: String) -> Self {
        if value.is_empty() || value.eq_ignore_ascii_case("memory") || value == ":memory:" {
            Self::Memory
        } else {
            Self::Sqlite(PathBuf::from(value))
        }
    }
}

impl From<DatabaseTarget> for String {
    fn from(target: DatabaseTarget) -> Self {
        match target {
            DatabaseTarget::Memory => "memory".to_string(),
            DatabaseTarget::Sqlite(path) => path.display().to_string(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `harmonic_reactive=debug`
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicConfig {
    /// Storage location
    pub database: DatabaseTarget,
    /// Messages loaded into memory on start
    pub initial_message_limit: usize,
    /// Age in days beyond which `prune` removes messages and events
    pub retention_days: u32,
    /// Rollback policy per action family
    pub policies: PersistencePolicies,
    /// Buffered persistence failures per lagging listener
    pub failure_channel_capacity: usize,
    /// Log output
    pub logging: LoggingConfig,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self {
            database: DatabaseTarget::Memory,
            initial_message_limit: 50,
            retention_days: 30,
            policies: PersistencePolicies::default(),
            failure_channel_capacity: 64,
            logging: LoggingConfig::default(),
        }
    }
}

impl HarmonicConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With storage location
    #[inline]
    #[must_use]
    pub fn with_database(mut self, database: DatabaseTarget) -> Self {
        self.database = database;
        self
    }

    /// With initial message limit
    #[inline]
    #[must_use]
    pub fn with_initial_message_limit(mut self, limit: usize) -> Self {
        self.initial_message_limit = limit;
        self
    }

    /// With retention window
    #[inline]
    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// With persistence policies
    #[inline]
    #[must_use]
    pub fn with_policies(mut self, policies: PersistencePolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(path.display().to_string(), e.to_string()))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, AppError> {
        Self::parse(toml_str, "<string>")
    }

    fn parse(toml_str: &str, origin: &str) -> Result<Self, AppError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| AppError::config(origin, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(database) = std::env::var(DATABASE_ENV) {
            self.database = DatabaseTarget::from(database);
        }
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.initial_message_limit == 0 {
            return Err(AppError::config(
                "initial_message_limit",
                "must be greater than 0",
            ));
        }
        if self.failure_channel_capacity == 0 {
            return Err(AppError::config(
                "failure_channel_capacity",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Settings for the reactive store
    #[must_use]
    pub fn reactive(&self) -> ReactiveConfig {
        ReactiveConfig {
            policies: self.policies,
            failure_channel_capacity: self.failure_channel_capacity,
        }
    }
}
