//! Configuration, paths, errors and logging setup shared by the portal crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    AuthEndpoints, Config, CookieConfig, DeploymentFlavor, RenewalConfig, DEFAULT_API_BASE,
    DEFAULT_LOG_LEVEL, LEGACY_SESSION_KEY, join_url,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
