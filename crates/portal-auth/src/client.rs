//! Stateless client for the four credential-lifecycle endpoints.
//!
//! Each method performs exactly one request and runs the response through
//! the envelope decoder. Nothing here retries.

use crate::envelope::decode_response;
use crate::{AuthError, AuthResult};
use portal_config_and_utils::{join_url, AuthEndpoints, Config};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Account/password pair posted to the login endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub account: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationUrlResponse {
    #[serde(default)]
    authorization_url: Option<String>,
}

/// Request builder for the auth endpoints of one deployment.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Client,
    api_base: String,
    endpoints: AuthEndpoints,
}

impl AuthClient {
    pub fn new(api_base: impl Into<String>, endpoints: AuthEndpoints) -> Self {
        Self::with_http_client(Client::new(), api_base, endpoints)
    }

    /// Share a connection pool with other clients.
    pub fn with_http_client(
        http: Client,
        api_base: impl Into<String>,
        endpoints: AuthEndpoints,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            endpoints,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_base.clone(), config.auth.clone())
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        authorization: Option<&str>,
    ) -> AuthResult<Value> {
        let url = join_url(&self.api_base, path);
        debug!(method = %method, url = %url, "Auth request");

        let mut builder = self.http.request(method, &url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(authorization) = authorization.filter(|h| !h.is_empty()) {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
        }

        let response = builder.send().await?;
        decode_response(response).await
    }

    /// POST the credentials; the payload should carry a token.
    pub async fn login(&self, credentials: &LoginCredentials) -> AuthResult<Value> {
        let body = serde_json::to_value(credentials)
            .map_err(|err| AuthError::Protocol(err.to_string()))?;
        self.request(Method::POST, &self.endpoints.login_path, &[], Some(&body), None)
            .await
    }

    /// POST `{refreshToken}`.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<Value> {
        let body = serde_json::to_value(RefreshRequest { refresh_token })
            .map_err(|err| AuthError::Protocol(err.to_string()))?;
        self.request(Method::POST, &self.endpoints.refresh_path, &[], Some(&body), None)
            .await
    }

    /// Exchange the opaque OAuth `state` from a provider callback.
    pub async fn callback(&self, state: &str) -> AuthResult<Value> {
        self.request(
            Method::GET,
            &self.endpoints.callback_path,
            &[("state", state)],
            None,
            None,
        )
        .await
    }

    /// GET the current profile.
    pub async fn me(&self, authorization: Option<&str>) -> AuthResult<Value> {
        let path = self
            .endpoints
            .me_path
            .as_deref()
            .ok_or_else(|| AuthError::Configuration("me path is not configured".to_string()))?;
        self.request(Method::GET, path, &[], None, authorization).await
    }

    /// Provider URL built purely from configuration.
    pub fn authorize_redirect_url(&self, provider: &str) -> String {
        let base = join_url(&self.api_base, &self.endpoints.oauth_authorize_base_path);
        join_url(&base, &urlencoding::encode(provider))
    }

    /// Ask the backend for the provider URL.
    pub async fn authorization_url(&self, provider: &str) -> AuthResult<String> {
        let base = self
            .endpoints
            .oauth_authorization_url_path
            .as_deref()
            .ok_or_else(|| {
                AuthError::Configuration("authorization URL path is not configured".to_string())
            })?;
        let path = join_url(base, &urlencoding::encode(provider));

        let data = self.request(Method::GET, &path, &[], None, None).await?;
        let response: AuthorizationUrlResponse = serde_json::from_value(data)
            .map_err(|err| AuthError::Protocol(err.to_string()))?;

        response
            .authorization_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AuthError::Protocol("no authorization URL in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_redirect_url_encodes_provider() {
        let client = AuthClient::new("http://localhost:9999/mortise", AuthEndpoints::admin());
        assert_eq!(
            client.authorize_redirect_url("git hub"),
            "http://localhost:9999/mortise/oauth2/authorization/git%20hub"
        );
    }

    #[tokio::test]
    async fn test_me_requires_configured_path() {
        let mut endpoints = AuthEndpoints::admin();
        endpoints.me_path = None;
        let client = AuthClient::new("http://127.0.0.1:1", endpoints);

        let err = client.me(None).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_authorization_url_requires_configured_path() {
        let client = AuthClient::new("http://127.0.0.1:1", AuthEndpoints::admin());
        let err = client.authorization_url("github").await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transient_transport_error() {
        let client = AuthClient::new("http://127.0.0.1:1", AuthEndpoints::admin());
        let err = client.refresh("R1").await.unwrap_err();
        assert!(matches!(err, AuthError::Transport { status: None, .. }));
        assert!(err.is_transient());
    }
}
