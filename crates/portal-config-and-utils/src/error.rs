//! Errors raised while loading portal configuration and preparing its
//! runtime directory.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Unknown flavor, or a config file that is not a JSON object.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing `config.json`, or creating the runtime directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `api_base` does not parse as an absolute URL.
    #[error("Invalid API base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Malformed `config.json` or override values.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to place `~/.portal` in.
    #[error("Path error: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
