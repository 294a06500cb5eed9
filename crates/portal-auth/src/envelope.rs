//! Envelope decoding.
//!
//! Every backend response is `{code, message, data}`. A response is a
//! success only when the HTTP status is 2xx and `code`, if present, is 200.

use crate::{AuthError, AuthResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// The single business code that means success.
pub const SUCCESS_CODE: i64 = 200;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode a raw response into the envelope's `data`.
pub fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> AuthResult<T> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<Envelope>(body)
            .ok()
            .and_then(|envelope| envelope.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with status {status}"));
        debug!(status, "Transport-level failure");
        return Err(AuthError::transport(Some(status), message));
    }

    if body.trim().is_empty() {
        return Err(AuthError::Protocol("empty response body".to_string()));
    }

    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|err| AuthError::Protocol(format!("not an envelope: {err}")))?;

    if let Some(code) = envelope.code {
        if code != SUCCESS_CODE {
            return Err(AuthError::Business {
                code,
                message: envelope.message.unwrap_or_default(),
            });
        }
    }

    serde_json::from_value(envelope.data)
        .map_err(|err| AuthError::Protocol(format!("unexpected data shape: {err}")))
}

/// Read a response body and decode it.
pub async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> AuthResult<T> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    decode_envelope(status, &body)
}
