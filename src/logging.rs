//! Logging setup
//!
//! The cache only emits `tracing` events. Hosts that do not install their
//! own subscriber can call [`init_logging`].

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: `level` for this crate, warn elsewhere
pub fn default_filter(level: &str) -> EnvFilter {
    let level = match level.trim().to_lowercase().as_str() {
        l @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => l.to_string(),
        _ => "info".to_string(),
    };
    EnvFilter::new(format!("warn,artifact_cache={}", level))
}

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false`
/// if a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match config.format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_uses_configured_level() {
        let filter = default_filter("debug").to_string();
        assert!(filter.contains("artifact_cache=debug"), "{filter}");
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let filter = default_filter("chatty").to_string();
        assert!(filter.contains("artifact_cache=info"), "{filter}");
    }

    #[test]
    fn second_init_is_harmless() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
