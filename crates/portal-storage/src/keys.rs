//! Storage key constants.

/// Keys owned by the storage crate itself.
pub struct StorageKeys;

impl StorageKeys {
    /// Serialized cookie jar inside its backing medium.
    pub const COOKIE_JAR: &'static str = "cookie_jar";
}
