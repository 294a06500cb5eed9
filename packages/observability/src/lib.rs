//! # Observability
//!
//! Structured logging for the portal crates.
//!
//! Library crates only emit events through the `tracing` macros. The host
//! binary calls [`init`] or [`init_with_config`] exactly once at startup and
//! decides where those events go:
//!
//! - a JSONL file (default `~/.portal/logs/portal.jsonl`), one object per line
//!   carrying `timestamp`, `level`, `service`, `pid`, `target`, `message` and
//!   the structured `fields` of the event
//! - optionally a compact human-readable stream on stderr
//!
//! Field values whose names look like credentials (`token`, `refresh_token`,
//! `authorization`, `password`, ...) are replaced with `[redacted]` before they
//! are written.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "portal".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod file_sink;
mod json_layer;

use std::path::PathBuf;

pub use file_sink::{default_log_path, FileLogWriter};
pub use json_layer::{redact_field, JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "portal", "portal-watch").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.portal/logs/portal.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for the given service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// When the log file cannot be opened, logging degrades to stderr only
/// instead of aborting the host process. Calling this more than once is a
/// no-op after the first successful installation.
pub fn init_with_config(config: LogConfig) {
    file_sink::init_subscriber(&config);
}

pub use tracing::{debug, error, info, instrument, trace, warn};

pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
