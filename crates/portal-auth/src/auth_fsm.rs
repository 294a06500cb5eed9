//! Session state machine using rust-fsm.
//!
//! ```text
//!                  Restore / LoginSucceeded
//! ┌─────────────────┐ ───────────────────────► ┌─────────────────┐
//! │ Unauthenticated │                          │  Authenticated  │ ◄─┐ LoginSucceeded
//! └─────────────────┘ ◄─────────────────────── └─────────────────┘ ──┘ RefreshSucceeded
//!                            Logout                                   ProfileUpdated
//! ```
//!
//! A refresh in flight is not a state of its own: it is tracked next to the
//! machine as the pending-refresh slot of the session manager.

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unauthenticated)

    Unauthenticated => {
        Restore => Authenticated,
        LoginSucceeded => Authenticated,
        Logout => Unauthenticated
    },
    Authenticated => {
        LoginSucceeded => Authenticated,
        RefreshSucceeded => Authenticated,
        ProfileUpdated => Authenticated,
        Logout => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

impl From<&SessionMachineState> for AuthState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unauthenticated => AuthState::Unauthenticated,
            SessionMachineState::Authenticated => AuthState::Authenticated,
        }
    }
}

/// Payload delivered to the state-change callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    pub state: AuthState,
    /// User snapshot of the session, when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

/// Point-in-time view of the session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub authenticated: bool,
    pub refresh_in_flight: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_unauthenticated() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_login_then_refresh_then_logout() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::LoginSucceeded).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);

        machine.consume(&SessionMachineInput::RefreshSucceeded).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);

        machine.consume(&SessionMachineInput::Logout).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_restore_authenticates() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::Restore).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_logout_is_idempotent() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::Logout).unwrap();
        machine.consume(&SessionMachineInput::Logout).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_refresh_requires_a_session() {
        let mut machine = SessionMachine::new();
        assert!(machine
            .consume(&SessionMachineInput::RefreshSucceeded)
            .is_err());
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_restore_only_from_unauthenticated() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::LoginSucceeded).unwrap();
        assert!(machine.consume(&SessionMachineInput::Restore).is_err());
    }

    #[test]
    fn test_auth_state_conversion() {
        assert_eq!(
            AuthState::from(&SessionMachineState::Unauthenticated),
            AuthState::Unauthenticated
        );
        assert!(AuthState::from(&SessionMachineState::Authenticated).is_authenticated());
    }
}
