//! Logging initialization for the portal host.
//!
//! Every binary writes structured JSONL to `~/.portal/logs/portal.jsonl`
//! through the observability crate.

pub use observability::LogConfig;

/// Initialize the logging system for the `portal` binary.
///
/// - Structured JSONL output to `~/.portal/logs/portal.jsonl`
/// - Log level from RUST_LOG env var or the provided default
/// - Compact stderr stream when `PORTAL_LOG_STDERR` is set
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("portal started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("portal", level);
}

/// Initialize logging with a custom service name.
///
/// Use this when long-running commands (such as `watch`) should be told
/// apart from one-shot commands in the central log stream.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        also_stderr: stderr_requested(),
        ..Default::default()
    });
}

fn stderr_requested() -> bool {
    std::env::var("PORTAL_LOG_STDERR")
        .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
