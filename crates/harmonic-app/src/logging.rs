//! Tracing subscriber setup

use crate::config::{LoggingConfig, LOG_ENV};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the global subscriber
///
/// See [`resolve_filter`] for where the filter comes from. Only the first
/// call has an effect; later calls (and an already-installed subscriber)
/// are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = resolve_filter(config);

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr);
        let installed = if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if installed.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    });
}

/// Log filter: `HARMONIC_LOG`, then `RUST_LOG`, then `config.level`
///
/// Unparseable values fall through to the next source; `info` is the last
/// resort.
#[must_use]
pub fn resolve_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    // Both variables are process-wide, so every case runs in one test.
    #[test]
    fn filter_sources_in_priority_order() {
        let config = LoggingConfig {
            level: "error".to_string(),
            json: false,
        };
        std::env::remove_var(LOG_ENV);
        std::env::remove_var("RUST_LOG");
        assert_eq!(resolve_filter(&config).max_level_hint(), Some(LevelFilter::ERROR));

        std::env::set_var("RUST_LOG", "warn");
        assert_eq!(resolve_filter(&config).max_level_hint(), Some(LevelFilter::WARN));

        std::env::set_var(LOG_ENV, "debug");
        assert_eq!(resolve_filter(&config).max_level_hint(), Some(LevelFilter::DEBUG));

        std::env::remove_var(LOG_ENV);
        std::env::remove_var("RUST_LOG");
    }
}
