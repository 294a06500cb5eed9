//! Authenticated HTTP client.
//!
//! Every request carries the current `Authorization` header unless it opts
//! out with `skip_auth`. A 401 triggers one shared refresh and at most one
//! retry of the original request. When the session cannot be renewed the
//! user is sent to the login entry and the original error is returned.

use crate::envelope::decode_response;
use crate::manager::SessionManager;
use crate::{AuthError, AuthResult};
use portal_config_and_utils::{join_url, Config};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// A request routed through [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Send without the session header and never refresh on 401.
    pub skip_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            skip_auth: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

/// HTTP client bound to a [`SessionManager`].
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    api_base: String,
    manager: SessionManager,
    login_entry: String,
}

impl ApiClient {
    pub fn new(
        api_base: impl Into<String>,
        manager: SessionManager,
        login_entry: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into(),
            manager,
            login_entry: login_entry.into(),
        }
    }

    pub fn from_config(config: &Config, manager: SessionManager) -> Self {
        Self::new(config.api_base.clone(), manager, config.login_entry.clone())
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn login_entry(&self) -> &str {
        &self.login_entry
    }

    /// Send `request` and decode the envelope's `data` as `T`.
    pub async fn send<T: DeserializeOwned>(&self, request: &ApiRequest) -> AuthResult<T> {
        match self.execute(request).await {
            Err(err) if err.is_unauthorized() && !request.skip_auth => {
                self.recover(request, err).await
            }
            result => result,
        }
    }

    async fn recover<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        original: AuthError,
    ) -> AuthResult<T> {
        debug!(
            method = %request.method,
            path = %request.path,
            "Unauthorized response, renewing session"
        );

        let renewed = self.manager.refresh().await;
        if !renewed.is_some_and(|session| session.is_authenticated()) {
            warn!(
                path = %request.path,
                login_entry = %self.login_entry,
                "Session could not be renewed, redirecting to login"
            );
            self.manager.navigator().navigate(&self.login_entry);
            return Err(original);
        }

        // One retry only; a second 401 goes back to the caller as is.
        debug!(path = %request.path, "Retrying request with renewed session");
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> AuthResult<T> {
        let url = join_url(&self.api_base, &request.path);
        let mut builder = self.http.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if !request.skip_auth {
            let header = self.manager.auth_header();
            if !header.is_empty() {
                builder = builder.header(reqwest::header::AUTHORIZATION, header);
            }
        }

        let response = builder.send().await?;
        decode_response(response).await
    }
}
