//! Configuration management for the portal.
//!
//! Two deployments share the same session core: the administrative console
//! (cookie-backed) and the member application (local-storage-backed). Each
//! flavor ships its own endpoint defaults; a config file only needs to name
//! the fields it overrides.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default backend base address.
pub const DEFAULT_API_BASE: &str = "http://localhost:9999/mortise";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Key of the whole-session JSON blob in local storage. The admin console
/// used it before it moved to cookies, so it doubles as the legacy key.
pub const LEGACY_SESSION_KEY: &str = "mortise.auth.session";

const DAY_SECS: i64 = 24 * 60 * 60;

/// Which application this process acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentFlavor {
    /// Administrative console, session kept in cookies.
    Admin,
    /// Member application, session kept in local storage.
    Member,
}

impl DeploymentFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentFlavor::Admin => "admin",
            DeploymentFlavor::Member => "member",
        }
    }
}

impl FromStr for DeploymentFlavor {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(DeploymentFlavor::Admin),
            "member" | "web" => Ok(DeploymentFlavor::Member),
            other => Err(CoreError::Config(format!(
                "Unknown deployment flavor: {other}"
            ))),
        }
    }
}

/// Backend paths consumed by the auth client and the projection caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    pub login_path: String,
    pub refresh_path: String,
    pub callback_path: String,
    pub me_path: Option<String>,
    /// Provider redirect base; the provider id is appended as a path segment.
    pub oauth_authorize_base_path: String,
    /// When set, the provider URL is resolved from the backend instead of
    /// being built locally.
    pub oauth_authorization_url_path: Option<String>,
    pub menus_path: Option<String>,
    pub profile_path: Option<String>,
}

impl AuthEndpoints {
    pub fn admin() -> Self {
        Self {
            login_path: "/api/v1/admin/auth/login".to_string(),
            refresh_path: "/api/v1/admin/auth/refresh-token".to_string(),
            callback_path: "/api/v1/admin/auth/callback".to_string(),
            me_path: Some("/api/v1/admin/auth/me".to_string()),
            oauth_authorize_base_path: "/oauth2/authorization".to_string(),
            oauth_authorization_url_path: None,
            menus_path: Some("/api/v1/admin/auth/menus".to_string()),
            profile_path: Some("/api/v1/admin/auth/profile".to_string()),
        }
    }

    pub fn member() -> Self {
        Self {
            login_path: "/api/v1/member/auth/login".to_string(),
            refresh_path: "/api/v1/member/auth/refresh-token".to_string(),
            callback_path: "/api/v1/member/auth/callback".to_string(),
            me_path: Some("/api/v1/member/auth/me".to_string()),
            oauth_authorize_base_path: "/oauth2/authorization".to_string(),
            oauth_authorization_url_path: Some(
                "/api/v1/member/auth/oauth2/authorization-url".to_string(),
            ),
            menus_path: None,
            profile_path: None,
        }
    }

    pub fn for_flavor(flavor: DeploymentFlavor) -> Self {
        match flavor {
            DeploymentFlavor::Admin => Self::admin(),
            DeploymentFlavor::Member => Self::member(),
        }
    }
}

/// Timing of the proactive renewal check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalConfig {
    pub check_interval_secs: u64,
    pub lead_window_secs: u64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            lead_window_secs: 5 * 60,
        }
    }
}

impl RenewalConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn lead_window(&self) -> Duration {
        Duration::from_secs(self.lead_window_secs)
    }
}

/// Names and retention of the four session cookies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieConfig {
    pub token_name: String,
    pub refresh_token_name: String,
    pub token_type_name: String,
    pub user_name: String,
    /// Retention of token, token type and user cookies.
    pub token_max_age_secs: i64,
    pub refresh_max_age_secs: i64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            token_name: "mortise-admin-token".to_string(),
            refresh_token_name: "mortise-admin-refresh-token".to_string(),
            token_type_name: "mortise-admin-token-type".to_string(),
            user_name: "mortise-admin-user".to_string(),
            token_max_age_secs: 7 * DAY_SECS,
            refresh_max_age_secs: 30 * DAY_SECS,
        }
    }
}

/// Main portal configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    pub flavor: DeploymentFlavor,
    /// Backend base address every endpoint path is appended to.
    pub api_base: String,
    pub auth: AuthEndpoints,
    /// Where an unrecoverable authorization failure sends the user.
    pub login_entry: String,
    pub renewal: RenewalConfig,
    pub cookies: CookieConfig,
    pub local_storage_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_flavor(DeploymentFlavor::Admin)
    }
}

impl Config {
    /// Built-in defaults for one deployment flavor.
    pub fn for_flavor(flavor: DeploymentFlavor) -> Self {
        let login_entry = match flavor {
            DeploymentFlavor::Admin => "/auth/login",
            DeploymentFlavor::Member => "/app/auth/login",
        };

        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            flavor,
            api_base: DEFAULT_API_BASE.to_string(),
            auth: AuthEndpoints::for_flavor(flavor),
            login_entry: login_entry.to_string(),
            renewal: RenewalConfig::default(),
            cookies: CookieConfig::default(),
            local_storage_key: LEGACY_SESSION_KEY.to_string(),
        }
    }

    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let flavor = std::env::var("PORTAL_FLAVOR")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DeploymentFlavor::Admin);
        let mut config = Self::for_flavor(flavor);
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let overrides = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            serde_json::Value::Object(serde_json::Map::new())
        };

        let env_flavor = match std::env::var("PORTAL_FLAVOR") {
            Ok(raw) => Some(raw.parse::<DeploymentFlavor>()?),
            Err(_) => None,
        };

        let mut config = Self::from_overrides(overrides, env_flavor)?;
        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_overrides(serde_json::from_str(&content)?, None)
    }

    /// Merge a partial JSON document over the defaults of its flavor.
    ///
    /// `flavor_override` wins over the flavor named in the document.
    fn from_overrides(
        overrides: serde_json::Value,
        flavor_override: Option<DeploymentFlavor>,
    ) -> CoreResult<Self> {
        if !overrides.is_object() {
            return Err(CoreError::Config(
                "config file must contain a JSON object".to_string(),
            ));
        }

        let flavor = match flavor_override {
            Some(flavor) => flavor,
            None => match overrides.get("flavor") {
                Some(value) => serde_json::from_value(value.clone())?,
                None => DeploymentFlavor::Admin,
            },
        };

        let mut merged = serde_json::to_value(Self::for_flavor(flavor))?;
        merge_json(&mut merged, overrides);
        merged["flavor"] = serde_json::to_value(flavor)?;

        Ok(serde_json::from_value(merged)?)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    /// Apply `PORTAL_LOG_LEVEL` and `PORTAL_API_BASE` through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("PORTAL_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.log_level = level.trim().to_string();
        }
        if let Some(base) = lookup("PORTAL_API_BASE").filter(|v| !v.trim().is_empty()) {
            self.api_base = base.trim().to_string();
        }
    }

    /// Get the API base as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base).map_err(CoreError::from)
    }

    /// Join an endpoint path onto the API base with exactly one slash
    /// between them.
    pub fn endpoint_url(&self, path: &str) -> String {
        join_url(&self.api_base, path)
    }
}

/// Join `path` onto `base` with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", &base[..base.len() - 1], path),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn merge_json(target: &mut serde_json::Value, overrides: serde_json::Value) {
    match (target, overrides) {
        (serde_json::Value::Object(target), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, value) => *target = value,
    }
}
