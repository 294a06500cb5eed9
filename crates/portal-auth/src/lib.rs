//! Session lifecycle for the Mortise portal.
//!
//! This crate provides:
//! - Envelope decoding of every backend response into a closed error taxonomy
//! - Cookie-backed and local-storage-backed session stores, plus the
//!   one-time migration between them
//! - Login, OAuth callback exchange and refresh with at most one refresh in
//!   flight
//! - Proactive renewal of JWTs that are about to expire
//! - An authenticated HTTP client that renews and retries once on 401

mod auth_fsm;
mod client;
mod context;
mod envelope;
mod error;
mod interceptor;
mod manager;
mod navigation;
mod projection;
mod resource;
mod scheduler;
mod session;
mod store;

pub use auth_fsm::session_machine;
pub use auth_fsm::{
    AuthSnapshot, AuthState, AuthStateChangedPayload, SessionMachine, SessionMachineInput,
    SessionMachineState,
};
pub use client::{AuthClient, LoginCredentials};
pub use context::{AppContext, ContextError, ContextResult};
pub use envelope::{decode_envelope, decode_response, SUCCESS_CODE};
pub use error::{AuthError, AuthResult};
pub use interceptor::{ApiClient, ApiRequest};
pub use manager::{AuthStateCallback, SessionManager};
pub use navigation::{Navigator, RecordingNavigator, TracingNavigator};
pub use projection::{MenuLink, ProjectionCache, Projections};
pub use resource::{AdminResource, PageQuery, PageResult};
pub use scheduler::{decode_token_expiry, should_renew, RenewalHandle, RenewalScheduler};
pub use session::{normalize_credentials, Session, DEFAULT_TOKEN_TYPE};
pub use store::{
    migrate_legacy_session, CookieSessionStore, LocalSessionStore, MigrationOutcome, SessionStore,
};
