//! The persisted credential set and the per-flavor normalization of
//! credential payloads into it.

use crate::{AuthError, AuthResult};
use portal_config_and_utils::DeploymentFlavor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// Authenticated credential set.
///
/// A session is only ever replaced as a whole value. An empty `token` means
/// "no session".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<i64>,
    /// Opaque profile snapshot.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub user: Value,
    /// Backend payload the session was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_in: None,
            refresh_expires_in: None,
            user: Value::Null,
            raw: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = user;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    /// Refresh token, if one is held and non-empty.
    pub fn refresh_credential(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|token| !token.is_empty())
    }

    /// `"<tokenType> <token>"`, defaulting the type to Bearer.
    pub fn auth_header(&self) -> String {
        let token_type = if self.token_type.trim().is_empty() {
            DEFAULT_TOKEN_TYPE
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", token_type, self.token)
    }

    /// Identifier of the signed-in user, whichever flavor produced it.
    pub fn user_id(&self) -> Option<String> {
        ["id", "memberId"]
            .iter()
            .find_map(|key| self.user.get(key).and_then(scalar_to_string))
    }

    /// Human-facing name of the signed-in user.
    pub fn user_label(&self) -> Option<String> {
        ["account", "nickname", "username"]
            .iter()
            .find_map(|key| self.user.get(key).and_then(scalar_to_string))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Copy the listed keys that are present and non-null into a new object.
pub(crate) fn project_user(source: &Value, keys: &[&str]) -> Value {
    let mut projected = Map::new();
    if let Some(object) = source.as_object() {
        for key in keys {
            if let Some(value) = object.get(*key).filter(|v| !v.is_null()) {
                projected.insert((*key).to_string(), value.clone());
            }
        }
    }
    Value::Object(projected)
}

const ADMIN_USER_KEYS: [&str; 2] = ["id", "account"];
const MEMBER_USER_KEYS: [&str; 4] = ["memberId", "username", "nickname", "avatarUrl"];

/// User fields kept by each flavor.
pub(crate) fn user_keys(flavor: DeploymentFlavor) -> &'static [&'static str] {
    match flavor {
        DeploymentFlavor::Admin => &ADMIN_USER_KEYS,
        DeploymentFlavor::Member => &MEMBER_USER_KEYS,
    }
}

/// Build a [`Session`] from a login, refresh or callback payload.
///
/// Admin payloads carry `{id, account, token, refreshToken}` and always use
/// Bearer. Member payloads add `tokenType`, expiry hints and profile fields,
/// and keep the whole payload as `raw`. A payload without a token fails with
/// [`AuthError::InvalidCredentialResponse`].
pub fn normalize_credentials(flavor: DeploymentFlavor, payload: Value) -> AuthResult<Session> {
    let object = payload
        .as_object()
        .ok_or(AuthError::InvalidCredentialResponse)?;
    let token = non_empty_str(object, "token").ok_or(AuthError::InvalidCredentialResponse)?;
    let refresh_token = non_empty_str(object, "refreshToken");
    let user = project_user(&payload, user_keys(flavor));

    let session = match flavor {
        DeploymentFlavor::Admin => Session {
            token,
            refresh_token,
            token_type: default_token_type(),
            expires_in: None,
            refresh_expires_in: None,
            user,
            raw: None,
        },
        DeploymentFlavor::Member => Session {
            token,
            refresh_token,
            token_type: non_empty_str(object, "tokenType").unwrap_or_else(default_token_type),
            expires_in: object.get("expiresIn").and_then(Value::as_i64),
            refresh_expires_in: object.get("refreshExpiresIn").and_then(Value::as_i64),
            user,
            raw: Some(payload.clone()),
        },
    };

    Ok(session)
}
