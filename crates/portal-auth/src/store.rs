//! Durable mirrors of the in-memory session.
//!
//! A store never fails: an unavailable or corrupt medium reads as "no
//! session" and write errors are logged. The session manager stays the only
//! authority over what the current session is.

use crate::session::{project_user, Session, DEFAULT_TOKEN_TYPE};
use portal_config_and_utils::CookieConfig;
use portal_storage::{CookieStorage, KeyValueStorage};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Load/save/clear capability over one persistence medium.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<Session>;

    fn save(&self, session: &Session);

    fn clear(&self);

    /// Short backend name for logs and status output.
    fn backend(&self) -> &'static str;
}

const COOKIE_USER_KEYS: [&str; 2] = ["id", "account"];

/// Session split across four `SameSite=Lax` cookies.
///
/// Only the token cookie decides whether a session exists; the other three
/// are best-effort.
pub struct CookieSessionStore {
    cookies: Arc<CookieStorage>,
    names: CookieConfig,
    legacy: Option<(Arc<dyn KeyValueStorage>, String)>,
}

impl CookieSessionStore {
    pub fn new(cookies: Arc<CookieStorage>, names: CookieConfig) -> Self {
        Self {
            cookies,
            names,
            legacy: None,
        }
    }

    /// Also erase the legacy local-storage blob on every [`SessionStore::clear`],
    /// so a later migration cannot bring a logged-out session back.
    pub fn with_legacy_purge(
        mut self,
        storage: Arc<dyn KeyValueStorage>,
        key: impl Into<String>,
    ) -> Self {
        self.legacy = Some((storage, key.into()));
        self
    }

    pub fn cookies(&self) -> &Arc<CookieStorage> {
        &self.cookies
    }

    fn has_token(&self) -> bool {
        self.cookies
            .get(&self.names.token_name)
            .is_some_and(|token| !token.is_empty())
    }

    fn read_user(&self) -> Value {
        let Some(encoded) = self.cookies.get(&self.names.user_name) else {
            return Value::Null;
        };
        urlencoding::decode(&encoded)
            .ok()
            .and_then(|decoded| serde_json::from_str(&decoded).ok())
            .unwrap_or(Value::Null)
    }

    fn write(&self, name: &str, value: Option<&str>, max_age_secs: i64) {
        let result = match value {
            Some(value) => self.cookies.set(name, value, max_age_secs),
            None => self.cookies.remove(name),
        };
        if let Err(err) = result {
            warn!(cookie = name, error = %err, "Failed to write session cookie");
        }
    }
}

impl SessionStore for CookieSessionStore {
    fn load(&self) -> Option<Session> {
        let token = self
            .cookies
            .get(&self.names.token_name)
            .filter(|token| !token.is_empty())?;

        Some(Session {
            token,
            refresh_token: self
                .cookies
                .get(&self.names.refresh_token_name)
                .filter(|token| !token.is_empty()),
            token_type: self
                .cookies
                .get(&self.names.token_type_name)
                .filter(|token_type| !token_type.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            expires_in: None,
            refresh_expires_in: None,
            user: self.read_user(),
            raw: None,
        })
    }

    fn save(&self, session: &Session) {
        let names = &self.names;
        self.write(
            &names.token_name,
            Some(session.token.as_str()),
            names.token_max_age_secs,
        );
        self.write(
            &names.refresh_token_name,
            session.refresh_credential(),
            names.refresh_max_age_secs,
        );
        self.write(
            &names.token_type_name,
            Some(session.token_type.as_str()),
            names.token_max_age_secs,
        );

        let user = if session.user.is_null() {
            None
        } else {
            let projection = project_user(&session.user, &COOKIE_USER_KEYS);
            Some(urlencoding::encode(&projection.to_string()).into_owned())
        };
        self.write(&names.user_name, user.as_deref(), names.token_max_age_secs);
    }

    fn clear(&self) {
        let names = &self.names;
        for name in [
            &names.token_name,
            &names.refresh_token_name,
            &names.token_type_name,
            &names.user_name,
        ] {
            self.write(name, None, 0);
        }

        if let Some((storage, key)) = &self.legacy {
            if let Err(err) = storage.delete(key) {
                warn!(error = %err, "Failed to purge legacy session blob");
            }
        }
    }

    fn backend(&self) -> &'static str {
        "cookie"
    }
}

/// Whole session as one JSON blob under a single key.
///
/// `None` storage models an environment without local storage.
pub struct LocalSessionStore {
    storage: Option<Arc<dyn KeyValueStorage>>,
    key: String,
}

impl LocalSessionStore {
    pub fn new(storage: Option<Arc<dyn KeyValueStorage>>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }
}

impl SessionStore for LocalSessionStore {
    fn load(&self) -> Option<Session> {
        let storage = self.storage.as_ref()?;

        let raw = match storage.get(&self.key) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "Local storage unreadable, treating as no session");
                return None;
            }
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if session.is_authenticated() => Some(session),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "Erasing corrupt stored session");
                if let Err(err) = storage.delete(&self.key) {
                    warn!(error = %err, "Failed to erase corrupt stored session");
                }
                None
            }
        }
    }

    fn save(&self, session: &Session) {
        let Some(storage) = &self.storage else {
            return;
        };
        let result = serde_json::to_string(session)
            .map_err(|err| err.to_string())
            .and_then(|json| storage.set(&self.key, &json).map_err(|err| err.to_string()));
        if let Err(err) = result {
            warn!(error = %err, "Failed to persist session");
        }
    }

    fn clear(&self) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(err) = storage.delete(&self.key) {
            warn!(error = %err, "Failed to clear stored session");
        }
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

/// What the one-time legacy migration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy blob was present.
    NothingToMigrate,
    /// The legacy session was copied into cookies and the blob erased.
    Migrated,
    /// Cookies already held a session, or the blob had no token; blob erased.
    Discarded,
    /// The blob was not valid JSON; blob erased, nothing copied.
    Malformed,
    /// The legacy medium could not be read.
    Unavailable,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Value,
}

/// Move a legacy local-storage session into the cookie store.
///
/// Copies only when the cookies hold no token and the blob has one. The blob
/// is erased whenever it was present, so running this again is a no-op.
/// Never fails.
pub fn migrate_legacy_session(
    cookies: &CookieSessionStore,
    legacy: &dyn KeyValueStorage,
    key: &str,
) -> MigrationOutcome {
    let raw = match legacy.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return MigrationOutcome::NothingToMigrate,
        Err(err) => {
            warn!(error = %err, "Legacy session medium unavailable, skipping migration");
            return MigrationOutcome::Unavailable;
        }
    };

    let outcome = match serde_json::from_str::<LegacySession>(&raw) {
        Err(err) => {
            debug!(error = %err, "Legacy session blob is malformed");
            MigrationOutcome::Malformed
        }
        Ok(old) => match old.token.filter(|token| !token.is_empty()) {
            Some(token) if !cookies.has_token() => {
                let mut session = Session::new(token).with_user(old.user);
                session.refresh_token = old.refresh_token.filter(|token| !token.is_empty());
                cookies.save(&session);
                info!("Migrated legacy session into cookies");
                MigrationOutcome::Migrated
            }
            _ => MigrationOutcome::Discarded,
        },
    };

    if let Err(err) = legacy.delete(key) {
        warn!(error = %err, "Failed to erase legacy session blob");
    }

    outcome
}
