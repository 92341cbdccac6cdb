//! Notification error types.
//!
//! Notifications are a side effect: every error here is logged by the
//! caller and never reaches the timer.

use thiserror::Error;

/// Errors that can occur while delivering a desktop notification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// `osascript` could not be spawned.
    #[error("failed to run osascript: {0}")]
    SpawnFailed(String),

    /// `osascript` exited with a failure status.
    #[error("osascript failed: {0}")]
    ExecutionFailed(String),

    /// Delivery did not finish within the timeout.
    #[error("notification timed out after {0} seconds")]
    Timeout(u64),
}

impl NotificationError {
    /// Returns true if this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
