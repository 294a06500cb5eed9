//! Cookie storage.
//!
//! Each value is an independent cookie with its own retention window, always
//! issued with `Path=/` and `SameSite=Lax`. The jar can be mirrored into a
//! [`KeyValueStorage`] so values survive restarts, and it can be rebuilt from
//! a `Cookie` request header so a server-side context sees the same values
//! as the client that sent them.

use crate::{KeyValueStorage, StorageKeys, StorageResult};
use cookie::{Cookie, CookieJar, SameSite};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    /// Unix seconds; absent for cookies that came from a request header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

/// Cookie jar with per-cookie max-age.
pub struct CookieStorage {
    jar: Mutex<CookieJar>,
    backing: Option<Arc<dyn KeyValueStorage>>,
}

impl Default for CookieStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieStorage {
    /// Jar that lives only as long as this value.
    pub fn new() -> Self {
        Self {
            jar: Mutex::new(CookieJar::new()),
            backing: None,
        }
    }

    /// Jar mirrored into `backing`. Expired or unreadable entries are dropped.
    pub fn persistent(backing: Arc<dyn KeyValueStorage>) -> Self {
        let mut jar = CookieJar::new();
        let now = OffsetDateTime::now_utc();

        let stored = match backing.get(StorageKeys::COOKIE_JAR) {
            Ok(Some(raw)) => serde_json::from_str::<Vec<StoredCookie>>(&raw).unwrap_or_else(|err| {
                warn!(error = %err, "Discarding unreadable cookie jar");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "Cookie jar medium unavailable, starting empty");
                Vec::new()
            }
        };

        for record in stored {
            let expires = match record.expires_at {
                Some(ts) => match OffsetDateTime::from_unix_timestamp(ts) {
                    Ok(at) if at > now => Some(at),
                    _ => continue,
                },
                None => None,
            };
            jar.add(build_cookie(record.name, record.value, expires));
        }

        Self {
            jar: Mutex::new(jar),
            backing: Some(backing),
        }
    }

    /// Jar holding the pairs of a `Cookie` request header.
    pub fn from_header(header: &str) -> Self {
        let mut jar = CookieJar::new();
        for parsed in Cookie::split_parse(header) {
            match parsed {
                Ok(cookie) => {
                    let name = cookie.name().to_string();
                    let value = cookie.value().to_string();
                    jar.add(build_cookie(name, value, None));
                }
                Err(err) => debug!(error = %err, "Skipping malformed cookie pair"),
            }
        }

        Self {
            jar: Mutex::new(jar),
            backing: None,
        }
    }

    /// Set `name` for `max_age_secs` seconds.
    pub fn set(&self, name: &str, value: &str, max_age_secs: i64) -> StorageResult<()> {
        let expires = OffsetDateTime::now_utc() + Duration::seconds(max_age_secs);
        let cookie = Cookie::build((name.to_string(), value.to_string()))
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::seconds(max_age_secs))
            .expires(expires)
            .build();

        let mut jar = self.jar.lock();
        jar.add(cookie);
        self.persist(&jar)
    }

    /// Current value of `name`, or `None` when missing or expired.
    pub fn get(&self, name: &str) -> Option<String> {
        let jar = self.jar.lock();
        let cookie = jar.get(name)?;
        if is_expired(cookie, OffsetDateTime::now_utc()) {
            return None;
        }
        Some(cookie.value().to_string())
    }

    pub fn remove(&self, name: &str) -> StorageResult<()> {
        let mut jar = self.jar.lock();
        if jar.get(name).is_none() {
            return Ok(());
        }
        jar.remove(Cookie::build((name.to_string(), "")).path("/").build());
        self.persist(&jar)
    }

    /// `Cookie` request header carrying every live cookie.
    pub fn cookie_header(&self) -> String {
        let now = OffsetDateTime::now_utc();
        let jar = self.jar.lock();
        let mut pairs: Vec<String> = jar
            .iter()
            .filter(|cookie| !is_expired(cookie, now))
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
            .collect();
        pairs.sort();
        pairs.join("; ")
    }

    /// `Set-Cookie` header values for every live cookie.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        let now = OffsetDateTime::now_utc();
        let jar = self.jar.lock();
        let mut headers: Vec<String> = jar
            .iter()
            .filter(|cookie| !is_expired(cookie, now))
            .map(|cookie| cookie.to_string())
            .collect();
        headers.sort();
        headers
    }

    fn persist(&self, jar: &CookieJar) -> StorageResult<()> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };

        let records: Vec<StoredCookie> = jar
            .iter()
            .map(|cookie| StoredCookie {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
                expires_at: cookie.expires_datetime().map(|at| at.unix_timestamp()),
            })
            .collect();

        backing.set(StorageKeys::COOKIE_JAR, &serde_json::to_string(&records)?)
    }
}

fn build_cookie(name: String, value: String, expires: Option<OffsetDateTime>) -> Cookie<'static> {
    let builder = Cookie::build((name, value)).same_site(SameSite::Lax).path("/");
    match expires {
        Some(at) => builder.expires(at).build(),
        None => builder.build(),
    }
}

fn is_expired(cookie: &Cookie<'_>, now: OffsetDateTime) -> bool {
    cookie
        .expires_datetime()
        .is_some_and(|expires| expires <= now)
}
