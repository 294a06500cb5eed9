#![allow(dead_code)]

use portal_auth::{
    ApiClient, AuthClient, CookieSessionStore, LocalSessionStore, RecordingNavigator, Session,
    SessionManager,
};
use portal_config_and_utils::{AuthEndpoints, CookieConfig, DeploymentFlavor, LEGACY_SESSION_KEY};
use portal_storage::{CookieStorage, KeyValueStorage, MemoryStorage};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::ResponseTemplate;

pub const LOGIN_ENTRY: &str = "/app/auth/login";

/// A member deployment backed by in-memory local storage.
pub struct MemberHarness {
    pub manager: SessionManager,
    pub api: ApiClient,
    pub storage: Arc<dyn KeyValueStorage>,
    pub navigator: Arc<RecordingNavigator>,
}

impl MemberHarness {
    pub fn new(api_base: &str) -> Self {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let store = Arc::new(LocalSessionStore::new(
            Some(storage.clone()),
            LEGACY_SESSION_KEY,
        ));
        let navigator = Arc::new(RecordingNavigator::new());
        let manager = SessionManager::new(
            AuthClient::new(api_base, AuthEndpoints::member()),
            store,
            DeploymentFlavor::Member,
            navigator.clone(),
        );
        let api = ApiClient::new(api_base, manager.clone(), LOGIN_ENTRY);

        Self {
            manager,
            api,
            storage,
            navigator,
        }
    }

    /// Persist `session` and seed the manager from it.
    pub fn seed(&self, session: &Session) {
        self.storage
            .set(
                LEGACY_SESSION_KEY,
                &serde_json::to_string(session).expect("serialize session"),
            )
            .expect("write session");
        assert!(self.manager.restore());
    }

    pub fn stored(&self) -> Option<Session> {
        self.storage
            .get(LEGACY_SESSION_KEY)
            .expect("read session")
            .map(|raw| serde_json::from_str(&raw).expect("parse session"))
    }
}

/// An admin deployment backed by an in-memory cookie jar.
pub struct AdminHarness {
    pub manager: SessionManager,
    pub api: ApiClient,
    pub cookies: Arc<CookieStorage>,
    pub navigator: Arc<RecordingNavigator>,
}

impl AdminHarness {
    pub fn new(api_base: &str) -> Self {
        let cookies = Arc::new(CookieStorage::new());
        let store = Arc::new(CookieSessionStore::new(
            cookies.clone(),
            CookieConfig::default(),
        ));
        let navigator = Arc::new(RecordingNavigator::new());
        let manager = SessionManager::new(
            AuthClient::new(api_base, AuthEndpoints::admin()),
            store,
            DeploymentFlavor::Admin,
            navigator.clone(),
        );
        let api = ApiClient::new(api_base, manager.clone(), "/auth/login");

        Self {
            manager,
            api,
            cookies,
            navigator,
        }
    }
}

pub fn envelope(data: Value) -> Value {
    json!({"code": 200, "message": "ok", "data": data})
}

pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(envelope(data))
}

pub fn ok_after(data: Value, delay: Duration) -> ResponseTemplate {
    ok(data).set_delay(delay)
}

pub fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({"code": 401, "message": "token expired"}))
}

pub fn credentials(token: &str, refresh_token: &str) -> Value {
    json!({
        "memberId": 42,
        "username": "m",
        "nickname": "Em",
        "token": token,
        "refreshToken": refresh_token,
        "tokenType": "Bearer"
    })
}
