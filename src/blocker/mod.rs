//! Distraction blocker.
//!
//! While a focus interval is active (or always, when `always_block` is on),
//! the blocker polls the process table and terminates the configured
//! distracting process, announcing each termination with a notification.
//!
//! Enforcement is poll-based and best-effort: toggles take effect on the
//! next poll, and scan or termination failures are logged and ignored.

pub mod error;
pub mod process;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::notification::Notifier;

pub use self::error::BlockerError;
pub use self::process::{MockProcessControl, ProcessControl, ProcessInfo, SysinfoProcessControl};

/// Default poll cadence of the blocker loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Flags deciding whether the blocker enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockerState {
    /// Master switch
    pub enabled: bool,
    /// Enforce outside focus intervals too
    pub always_block: bool,
    /// Set by the daemon: `phase == Work && run_state == Running`
    pub in_focus_interval: bool,
}

impl BlockerState {
    pub fn new(enabled: bool, always_block: bool) -> Self {
        Self {
            enabled,
            always_block,
            in_focus_interval: false,
        }
    }

    /// `enabled && (in_focus_interval || always_block)`
    pub fn should_block(&self) -> bool {
        self.enabled && (self.in_focus_interval || self.always_block)
    }
}

/// Coordinates blocker flags with the poll loop.
pub struct Blocker {
    state: RwLock<BlockerState>,
    process_name: String,
    control: Arc<dyn ProcessControl>,
    notifier: Arc<dyn Notifier>,
}

impl Blocker {
    pub fn new(
        state: BlockerState,
        process_name: impl Into<String>,
        control: Arc<dyn ProcessControl>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state: RwLock::new(state),
            process_name: process_name.into(),
            control,
            notifier,
        }
    }

    /// Name of the process this blocker terminates.
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub fn state(&self) -> BlockerState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_always_block(&self) -> bool {
        self.state().always_block
    }

    pub fn should_block(&self) -> bool {
        self.state().should_block()
    }

    /// Flips `enabled` and returns the new value.
    pub fn toggle_enabled(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.enabled = !state.enabled;
        state.enabled
    }

    /// Flips `always_block` and returns the new value.
    pub fn toggle_always_block(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.always_block = !state.always_block;
        state.always_block
    }

    pub fn set_in_focus_interval(&self, in_focus: bool) {
        self.state.write().unwrap_or_else(|e| e.into_inner()).in_focus_interval = in_focus;
    }

    /// Runs one poll: terminates every matching process if blocking applies.
    ///
    /// Returns the number of processes terminated. Errors are logged.
    pub async fn enforce_once(&self) -> usize {
        if !self.should_block() {
            return 0;
        }

        let control = Arc::clone(&self.control);
        let name = self.process_name.clone();
        let result = tokio::task::spawn_blocking(move || terminate_matching(control.as_ref(), &name))
            .await
            .map_err(|e| BlockerError::TaskFailed(e.to_string()))
            .and_then(|r| r);

        let terminated = match result {
            Ok(terminated) => terminated,
            Err(e) => {
                warn!("blocker scan failed: {e}");
                return 0;
            }
        };

        for process in &terminated {
            info!("terminated {} (pid {})", process.name, process.pid);
            self.notifier.notify(
                &format!("{} blocked", process.name),
                &format!("{} is blocked during focus time", process.name),
            );
        }
        terminated.len()
    }

    /// Polls every `interval` until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.enforce_once().await;
                }
            }
        }
        debug!("blocker loop stopped");
    }
}

/// Terminates all processes named `name`; individual failures are skipped.
fn terminate_matching(
    control: &dyn ProcessControl,
    name: &str,
) -> Result<Vec<ProcessInfo>, BlockerError> {
    let mut terminated = Vec::new();
    for process in control.list_processes()? {
        if process.name != name {
            continue;
        }
        match control.terminate(&process) {
            Ok(()) => terminated.push(process),
            Err(e) => warn!("{e}"),
        }
    }
    Ok(terminated)
}

// ============================================================================
// Tests
// ============================================================================
