//! Authentication error types.
//!
//! The variants form a closed taxonomy produced by the decoding layer.
//! Callers branch on the kind, never on message text.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Network failure or non-2xx HTTP status
    #[error("Transport error: {message}")]
    Transport {
        /// HTTP status, absent when the request never got a response
        status: Option<u16>,
        message: String,
    },

    /// Body missing or not shaped like an envelope
    #[error("Malformed response: {0}")]
    Protocol(String),

    /// Well-formed envelope carrying a non-success code
    #[error("Request rejected ({code}): {message}")]
    Business { code: i64, message: String },

    /// Success envelope whose payload has no token
    #[error("Credential response is missing a token")]
    InvalidCredentialResponse,

    /// Endpoint not configured for this deployment
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        AuthError::Transport {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of a transport failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns true for a transport failure with status 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors are requests that never got a response and 5xx
    /// responses.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Transport { status: None, .. } => true,
            AuthError::Transport {
                status: Some(status),
                ..
            } => (500..600).contains(status),
            _ => false,
        }
    }

    /// Message to show a user: the one the backend sent, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        let carried = match self {
            AuthError::Transport { message, .. } | AuthError::Business { message, .. } => {
                Some(message.as_str())
            }
            _ => None,
        };
        carried
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Transport {
            status: err.status().map(|status| status.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_is_only_transport_401() {
        assert!(AuthError::transport(Some(401), "expired").is_unauthorized());
        assert!(!AuthError::transport(Some(403), "forbidden").is_unauthorized());
        assert!(!AuthError::Business {
            code: 401,
            message: "expired".to_string()
        }
        .is_unauthorized());
    }

    #[test]
    fn test_is_transient() {
        assert!(AuthError::transport(None, "connection refused").is_transient());
        assert!(AuthError::transport(Some(503), "unavailable").is_transient());
        assert!(!AuthError::transport(Some(400), "bad request").is_transient());
        assert!(!AuthError::Protocol("empty".to_string()).is_transient());
        assert!(!AuthError::InvalidCredentialResponse.is_transient());
    }

    #[test]
    fn test_user_message_prefers_carried_message() {
        let err = AuthError::Business {
            code: 500,
            message: "Account locked".to_string(),
        };
        assert_eq!(err.user_message("Login failed"), "Account locked");
    }

    #[test]
    fn test_user_message_falls_back() {
        let blank = AuthError::transport(Some(500), "  ");
        assert_eq!(blank.user_message("Request failed"), "Request failed");
        assert_eq!(
            AuthError::InvalidCredentialResponse.user_message("Login failed"),
            "Login failed"
        );
    }
}
