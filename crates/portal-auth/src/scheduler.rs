//! Proactive renewal of tokens that are about to expire.
//!
//! The scheduler checks once on start and then every `check_interval`. A
//! check renews the session when the access token is a JWT whose `exp` lies
//! less than `lead_window` ahead. Opaque tokens and tokens without `exp` are
//! left to the 401 path of the interceptor.

use crate::manager::SessionManager;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use portal_config_and_utils::RenewalConfig;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Expiry encoded in the `exp` claim of a JWT, if any.
pub fn decode_token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts[1].is_empty() {
        return None;
    }

    let segment = parts[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD_NO_PAD.decode(segment))
        .ok()?;
    let payload: Value = serde_json::from_slice(&bytes).ok()?;

    let exp_millis = (payload.get("exp")?.as_f64()? * 1000.0) as i64;
    if exp_millis == 0 {
        return None;
    }
    DateTime::from_timestamp_millis(exp_millis)
}

/// Whether `token` expires within `lead_window` of `now`.
pub fn should_renew(token: &str, now: DateTime<Utc>, lead_window: Duration) -> bool {
    let Some(expiry) = decode_token_expiry(token) else {
        return false;
    };
    let Ok(lead) = chrono::Duration::from_std(lead_window) else {
        return false;
    };
    expiry - now < lead
}

pub struct RenewalScheduler;

impl RenewalScheduler {
    /// Start checking in the background. The first check runs immediately.
    pub fn start(manager: SessionManager, config: RenewalConfig) -> RenewalHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let check_interval = config.check_interval();
        let lead_window = config.lead_window();

        info!(
            check_interval_secs = check_interval.as_secs(),
            lead_window_secs = lead_window.as_secs(),
            "Starting renewal scheduler"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Renewal scheduler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        check(&manager, lead_window);
                    }
                }
            }
        });

        RenewalHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

fn check(manager: &SessionManager, lead_window: Duration) {
    let Some(session) = manager.current_session() else {
        return;
    };
    if !should_renew(&session.token, Utc::now(), lead_window) {
        return;
    }

    debug!("Access token close to expiry, renewing");
    // registered here so a stop right after this check can still settle it
    if let Some(refresh) = manager.begin_refresh() {
        tokio::spawn(refresh);
    }
}

/// Owner of a running scheduler. Dropping it aborts the task.
pub struct RenewalHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RenewalHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the scheduler and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Renewal scheduler stopped");
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
