//! Data cached next to the session: the navigation menu tree and the profile.
//!
//! The cache is owned by the [`SessionManager`](crate::SessionManager) and
//! emptied on logout. [`Projections`] loads it through the authenticated
//! [`ApiClient`].

use crate::interceptor::{ApiClient, ApiRequest};
use crate::{AuthError, AuthResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// One entry of the admin navigation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuLink {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_no: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_open: Option<bool>,
}

#[derive(Debug, Default)]
pub struct ProjectionCache {
    menus: Mutex<Vec<MenuLink>>,
    profile: Mutex<Option<Value>>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn menus(&self) -> Vec<MenuLink> {
        self.menus.lock().clone()
    }

    pub fn set_menus(&self, menus: Vec<MenuLink>) {
        *self.menus.lock() = menus;
    }

    pub fn profile(&self) -> Option<Value> {
        self.profile.lock().clone()
    }

    pub fn set_profile(&self, profile: Value) {
        *self.profile.lock() = Some(profile);
    }

    pub fn invalidate_profile(&self) {
        *self.profile.lock() = None;
    }

    pub fn clear(&self) {
        self.menus.lock().clear();
        *self.profile.lock() = None;
    }
}

/// Loader for the cached projections.
#[derive(Clone)]
pub struct Projections {
    api: ApiClient,
}

impl Projections {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn cache(&self) -> &ProjectionCache {
        self.api.manager().projections()
    }

    /// Load the menu tree. Failures leave an empty tree; nothing is loaded
    /// without a session.
    pub async fn fetch_menus(&self) -> Vec<MenuLink> {
        let manager = self.api.manager();
        if !manager.is_authenticated() {
            return Vec::new();
        }
        let Some(path) = manager.client().endpoints().menus_path.clone() else {
            debug!("No menus endpoint configured");
            return Vec::new();
        };

        let menus = match self
            .api
            .send::<Option<Vec<MenuLink>>>(&ApiRequest::get(path))
            .await
        {
            Ok(menus) => menus.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Failed to load menus");
                Vec::new()
            }
        };

        self.cache().set_menus(menus.clone());
        menus
    }

    pub fn menus(&self) -> Vec<MenuLink> {
        self.cache().menus()
    }

    /// The profile, loaded once and then served from the cache.
    pub async fn profile(&self) -> AuthResult<Option<Value>> {
        if let Some(profile) = self.cache().profile() {
            return Ok(Some(profile));
        }

        let path = self.profile_path()?;
        let profile: Value = self.api.send(&ApiRequest::get(path)).await?;
        if profile.is_null() {
            return Ok(None);
        }
        self.cache().set_profile(profile.clone());
        Ok(Some(profile))
    }

    /// Save profile changes, then reload the session user and the profile.
    pub async fn update_profile(&self, changes: Value) -> AuthResult<Option<Value>> {
        let path = self.profile_path()?;
        self.api
            .send::<Value>(&ApiRequest::put(path).json(changes))
            .await?;

        self.api.manager().fetch_current_user().await?;
        self.cache().invalidate_profile();
        self.profile().await
    }

    fn profile_path(&self) -> AuthResult<String> {
        self.api
            .manager()
            .client()
            .endpoints()
            .profile_path
            .clone()
            .ok_or_else(|| AuthError::Configuration("profile path is not configured".to_string()))
    }
}
