//! Persistence media for the portal session.
//!
//! - [`MemoryStorage`]: process-local map, used by tests and ephemeral runs
//! - [`FileStorage`]: JSON file standing in for browser local storage
//! - [`CookieStorage`]: cookie jar with per-cookie retention and `SameSite=Lax`

mod cookies;
mod file;
mod keys;
mod memory;
mod traits;

pub use cookies::CookieStorage;
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::KeyValueStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The medium exists but refused the operation
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
