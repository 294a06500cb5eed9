//! Full-page navigation requested by the session core.
//!
//! The core never renders anything; it only asks the host to go somewhere
//! (a provider authorization URL, or the login entry after an unrecoverable
//! authorization failure).

use parking_lot::Mutex;
use tracing::info;

/// Host-side navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Records the request in the log and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, target: &str) {
        info!(target_url = %target, "Navigation requested");
    }
}

/// Keeps every requested target, in order.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) {
        self.visited.lock().push(target.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_navigator_keeps_order() {
        let navigator = RecordingNavigator::new();
        navigator.navigate("/auth/login");
        navigator.navigate("https://idp.example.com/authorize");
        assert_eq!(
            navigator.visited(),
            vec!["/auth/login", "https://idp.example.com/authorize"]
        );
    }
}
