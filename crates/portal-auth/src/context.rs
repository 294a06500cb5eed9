//! Wiring of the session core for one deployment.
//!
//! Start-up order:
//! 1. open the storage media and build the session store for the flavor
//! 2. run the legacy migration (admin only)
//! 3. create the manager and seed it from the store
//! 4. create the authenticated API client
//! 5. start the renewal scheduler
//!
//! [`AppContext::start`] must be called inside a tokio runtime.

use crate::client::AuthClient;
use crate::interceptor::ApiClient;
use crate::manager::SessionManager;
use crate::navigation::Navigator;
use crate::projection::Projections;
use crate::resource::AdminResource;
use crate::scheduler::{RenewalHandle, RenewalScheduler};
use crate::store::{
    migrate_legacy_session, CookieSessionStore, LocalSessionStore, MigrationOutcome, SessionStore,
};
use portal_config_and_utils::{Config, CoreError, DeploymentFlavor, Paths};
use portal_storage::{CookieStorage, FileStorage, KeyValueStorage, StorageError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Config error: {0}")]
    Config(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ContextResult<T> = Result<T, ContextError>;

pub struct AppContext {
    config: Config,
    manager: SessionManager,
    api: ApiClient,
    migration: Option<MigrationOutcome>,
    scheduler: Option<RenewalHandle>,
}

impl AppContext {
    pub fn start(
        config: Config,
        paths: &Paths,
        navigator: Arc<dyn Navigator>,
    ) -> ContextResult<Self> {
        paths.ensure_dirs()?;

        let local: Arc<dyn KeyValueStorage> =
            Arc::new(FileStorage::open(paths.local_storage_file())?);
        let key = config.local_storage_key.clone();

        let (store, migration) = match config.flavor {
            DeploymentFlavor::Admin => {
                let jar: Arc<dyn KeyValueStorage> =
                    Arc::new(FileStorage::open(paths.cookie_file())?);
                let cookies = Arc::new(CookieStorage::persistent(jar));
                let store = CookieSessionStore::new(cookies, config.cookies.clone())
                    .with_legacy_purge(local.clone(), key.clone());
                let outcome = migrate_legacy_session(&store, local.as_ref(), &key);
                (Arc::new(store) as Arc<dyn SessionStore>, Some(outcome))
            }
            DeploymentFlavor::Member => {
                let store = LocalSessionStore::new(Some(local), key);
                (Arc::new(store) as Arc<dyn SessionStore>, None)
            }
        };

        let manager = SessionManager::new(
            AuthClient::from_config(&config),
            store,
            config.flavor,
            navigator,
        );
        let restored = manager.restore();

        let api = ApiClient::from_config(&config, manager.clone());
        let scheduler = RenewalScheduler::start(manager.clone(), config.renewal.clone());

        info!(
            flavor = config.flavor.as_str(),
            backend = manager.store_backend(),
            restored,
            migration = ?migration,
            "Session context started"
        );

        Ok(Self {
            config,
            manager,
            api,
            migration,
            scheduler: Some(scheduler),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn migration(&self) -> Option<MigrationOutcome> {
        self.migration
    }

    pub fn projections(&self) -> Projections {
        Projections::new(self.api.clone())
    }

    pub fn resource(&self, base_path: impl Into<String>) -> AdminResource {
        AdminResource::new(self.api.clone(), base_path)
    }

    /// Stop the scheduler and let a refresh in flight finish.
    ///
    /// The backend retires a refresh token once it is used, so a renewal cut
    /// off here would leave a dead token in the store. The stored session is
    /// left in place.
    pub async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.manager.settle().await;
        info!("Session context stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::RecordingNavigator;
    use crate::session::Session;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use portal_config_and_utils::LEGACY_SESSION_KEY;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn unreachable_config(flavor: DeploymentFlavor) -> Config {
        let mut config = Config::for_flavor(flavor);
        config.api_base = "http://127.0.0.1:1".to_string();
        config
    }

    #[tokio::test]
    async fn test_member_context_restores_local_session() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(temp.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        let local = FileStorage::open(paths.local_storage_file()).unwrap();
        local
            .set(
                LEGACY_SESSION_KEY,
                &serde_json::to_string(&Session::new("T1")).unwrap(),
            )
            .unwrap();

        let context = AppContext::start(
            unreachable_config(DeploymentFlavor::Member),
            &paths,
            Arc::new(RecordingNavigator::new()),
        )
        .unwrap();

        assert_eq!(context.manager().store_backend(), "local");
        assert_eq!(context.manager().auth_header(), "Bearer T1");
        assert!(context.migration().is_none());
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_admin_context_migrates_legacy_blob() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(temp.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        let local = FileStorage::open(paths.local_storage_file()).unwrap();
        local
            .set(
                LEGACY_SESSION_KEY,
                r#"{"token":"T1","refreshToken":"R1","user":{"id":1,"account":"a"}}"#,
            )
            .unwrap();

        let context = AppContext::start(
            unreachable_config(DeploymentFlavor::Admin),
            &paths,
            Arc::new(RecordingNavigator::new()),
        )
        .unwrap();

        assert_eq!(context.migration(), Some(MigrationOutcome::Migrated));
        assert_eq!(context.manager().store_backend(), "cookie");
        assert_eq!(context.manager().auth_header(), "Bearer T1");
        context.shutdown().await;

        // blob gone, cookies persisted across restarts
        let reopened = FileStorage::open(paths.local_storage_file()).unwrap();
        assert_eq!(reopened.get(LEGACY_SESSION_KEY).unwrap(), None);

        let context = AppContext::start(
            unreachable_config(DeploymentFlavor::Admin),
            &paths,
            Arc::new(RecordingNavigator::new()),
        )
        .unwrap();
        assert_eq!(context.migration(), Some(MigrationOutcome::NothingToMigrate));
        assert!(context.manager().is_authenticated());
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_renewal_in_flight() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/member/auth/refresh-token"))
            .and(body_json(json!({"refreshToken": "R1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "code": 200,
                        "message": "ok",
                        "data": {"token": "T2", "refreshToken": "R2"}
                    }))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(temp.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        let exp = chrono::Utc::now().timestamp() + 60;
        let claims = URL_SAFE_NO_PAD.encode(json!({"exp": exp}).to_string());
        let near_expiry = Session::new(format!("e30.{claims}.sig")).with_refresh_token("R1");
        FileStorage::open(paths.local_storage_file())
            .unwrap()
            .set(
                LEGACY_SESSION_KEY,
                &serde_json::to_string(&near_expiry).unwrap(),
            )
            .unwrap();

        let mut config = Config::for_flavor(DeploymentFlavor::Member);
        config.api_base = server.uri();
        let context =
            AppContext::start(config, &paths, Arc::new(RecordingNavigator::new())).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(context.manager().refresh_in_flight());
        let manager = context.manager().clone();
        context.shutdown().await;

        assert!(!manager.refresh_in_flight());
        assert_eq!(manager.auth_header(), "Bearer T2");

        // the rotated refresh token reached disk before shutdown returned
        let reopened = FileStorage::open(paths.local_storage_file()).unwrap();
        let stored: Session =
            serde_json::from_str(&reopened.get(LEGACY_SESSION_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored.token, "T2");
        assert_eq!(stored.refresh_token.as_deref(), Some("R2"));
    }
}
