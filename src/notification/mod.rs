//! Desktop notifications.
//!
//! The daemon announces phase completions and blocker terminations through
//! the [`Notifier`] trait. Delivery is fire-and-forget: `notify` returns
//! immediately and failures are only logged.
//!
//! - [`OsascriptNotifier`]: macOS notifications via `osascript`
//! - [`MockNotifier`]: records calls for tests
//! - [`NoopNotifier`]: discards everything

pub mod error;

use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

pub use self::error::NotificationError;

/// Title shown on every notification.
pub const APP_TITLE: &str = "Tomato";

/// Default timeout for a single `osascript` run in seconds.
const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    /// Shows a notification. Must not block the caller.
    fn notify(&self, title: &str, message: &str);
}

// ============================================================================
// OsascriptNotifier
// ============================================================================

/// Sends notifications through `osascript -e 'display notification …'`.
#[derive(Debug, Clone)]
pub struct OsascriptNotifier {
    timeout_seconds: u64,
}

impl OsascriptNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_timeout(timeout_seconds: u64) -> Self {
        Self { timeout_seconds }
    }
}

impl Default for OsascriptNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for OsascriptNotifier {
    fn notify(&self, title: &str, message: &str) {
        if !cfg!(target_os = "macos") {
            debug!("notification skipped on this platform: {title}: {message}");
            return;
        }

        let script = build_script(title, message);
        let timeout_seconds = self.timeout_seconds;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = display_notification(script, timeout_seconds).await {
                        warn!("failed to show notification: {e}");
                    }
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    if let Err(e) = run_osascript(&script) {
                        warn!("failed to show notification: {e}");
                    }
                });
            }
        }
    }
}

/// Builds the AppleScript source for one notification.
fn build_script(title: &str, message: &str) -> String {
    format!(
        "display notification \"{}\" with title \"{}\"",
        escape_applescript(message),
        escape_applescript(title)
    )
}

fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

async fn display_notification(script: String, timeout_seconds: u64) -> Result<(), NotificationError> {
    let task = tokio::task::spawn_blocking(move || run_osascript(&script));

    match timeout(Duration::from_secs(timeout_seconds), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(NotificationError::SpawnFailed(e.to_string())),
        Err(_) => Err(NotificationError::Timeout(timeout_seconds)),
    }
}

fn run_osascript(script: &str) -> Result<(), NotificationError> {
    let output = Command::new("osascript")
        .arg("-e")
        .arg(script)
        .output()
        .map_err(|e| NotificationError::SpawnFailed(e.to_string()))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(NotificationError::ExecutionFailed(stderr.trim().to_string()))
    }
}

// ============================================================================
// NoopNotifier
// ============================================================================

/// Notifier that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _title: &str, _message: &str) {}
}

// ============================================================================
// MockNotifier
// ============================================================================

/// Notifier that records `(title, message)` pairs.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications sent so far, oldest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((title.to_string(), message.to_string()));
    }
}
