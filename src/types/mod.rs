//! Core data types for the Tomato timer.
//!
//! This module defines the data structures used for:
//! - The phase state machine (work / short break / long break cycling)
//! - Timer configuration with validation
//! - IPC request/response serialization

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

// ============================================================================
// Phase
// ============================================================================

/// One segment of the work/break cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Focused work interval
    #[default]
    Work,
    /// Short break between work intervals
    ShortBreak,
    /// Long break after the configured number of work intervals
    LongBreak,
}

impl Phase {
    /// Returns the string representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Work => "work",
            Phase::ShortBreak => "short_break",
            Phase::LongBreak => "long_break",
        }
    }

    /// Returns true for either kind of break.
    pub fn is_break(&self) -> bool {
        matches!(self, Phase::ShortBreak | Phase::LongBreak)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RunState
// ============================================================================

/// Whether the active phase's countdown is advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started (fresh, or just reset/skipped)
    #[default]
    Idle,
    /// Tick loop active
    Running,
    /// Tick loop halted, remaining time frozen
    Paused,
}

impl RunState {
    /// Returns the string representation of the run state.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TimerConfig
// ============================================================================

/// Phase lengths and the long-break threshold, fixed for a daemon's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Work phase length
    pub work: Duration,
    /// Short break length
    pub short_break: Duration,
    /// Long break length
    pub long_break: Duration,
    /// Number of completed work intervals before a long break
    pub long_break_after: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            work: Duration::from_secs(30 * 60),
            short_break: Duration::from_secs(5 * 60),
            long_break: Duration::from_secs(20 * 60),
            long_break_after: 4,
        }
    }
}

impl TimerConfig {
    /// Creates a configuration from whole minutes.
    pub fn from_minutes(work: u64, short_break: u64, long_break: u64, long_break_after: u32) -> Self {
        Self {
            work: Duration::from_secs(work * 60),
            short_break: Duration::from_secs(short_break * 60),
            long_break: Duration::from_secs(long_break * 60),
            long_break_after,
        }
    }

    /// Sets the work phase length.
    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    /// Sets the short break length.
    pub fn with_short_break(mut self, short_break: Duration) -> Self {
        self.short_break = short_break;
        self
    }

    /// Sets the long break length.
    pub fn with_long_break(mut self, long_break: Duration) -> Self {
        self.long_break = long_break;
        self
    }

    /// Sets the long-break threshold.
    pub fn with_long_break_after(mut self, intervals: u32) -> Self {
        self.long_break_after = intervals;
        self
    }

    /// Full length of the given phase.
    pub fn duration_for(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Work => self.work,
            Phase::ShortBreak => self.short_break,
            Phase::LongBreak => self.long_break,
        }
    }

    /// Validates the configuration.
    ///
    /// All durations must be positive and the threshold at least 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("work", self.work),
            ("short_break", self.short_break),
            ("long_break", self.long_break),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} duration must be positive")));
            }
        }
        if self.long_break_after < 1 {
            return Err(ConfigError::Invalid(
                "long_break_after must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TimerState
// ============================================================================

/// The mutable state of the phase state machine.
///
/// All methods are synchronous and perform no I/O; callers provide the
/// locking (see `daemon::timer::Timer`).
#[derive(Debug, Clone)]
pub struct TimerState {
    /// Whether the countdown is advancing
    pub run_state: RunState,
    /// Current phase
    pub phase: Phase,
    /// Time left in the current phase
    pub remaining: Duration,
    /// Work intervals completed today (survives resets)
    pub intervals_today: u32,
    /// Work intervals completed since the last long break, in `[0, long_break_after)`
    pub intervals_since_break: u32,
    /// Phase lengths and threshold
    pub config: TimerConfig,
}

impl TimerState {
    /// Creates an idle state at the start of a work phase.
    pub fn new(config: TimerConfig) -> Self {
        Self {
            run_state: RunState::Idle,
            phase: Phase::Work,
            remaining: config.work,
            intervals_today: 0,
            intervals_since_break: 0,
            config,
        }
    }

    /// Seeds today's completed interval count.
    pub fn with_intervals_today(mut self, intervals_today: u32) -> Self {
        self.intervals_today = intervals_today;
        self
    }

    /// Moves to the next phase and returns the phase that just ended.
    ///
    /// `run_state` is left untouched; the caller decides whether the new
    /// phase keeps running.
    pub fn advance_phase(&mut self) -> Phase {
        let completed = self.phase;

        self.phase = match completed {
            Phase::Work => {
                self.intervals_today += 1;
                self.intervals_since_break += 1;

                if self.intervals_since_break >= self.config.long_break_after {
                    self.intervals_since_break = 0;
                    Phase::LongBreak
                } else {
                    Phase::ShortBreak
                }
            }
            Phase::ShortBreak | Phase::LongBreak => Phase::Work,
        };
        self.remaining = self.config.duration_for(self.phase);

        completed
    }

    /// Subtracts elapsed wall-clock time from the countdown.
    ///
    /// Returns the completed phase when the countdown is exhausted. Overshoot
    /// past zero is discarded: the new phase always starts at its full length.
    pub fn advance_by(&mut self, elapsed: Duration) -> Option<Phase> {
        if elapsed >= self.remaining {
            Some(self.advance_phase())
        } else {
            self.remaining -= elapsed;
            None
        }
    }

    /// Returns to an idle work phase, keeping today's count.
    pub fn reset(&mut self) {
        self.run_state = RunState::Idle;
        self.phase = Phase::Work;
        self.remaining = self.config.work;
        self.intervals_since_break = 0;
    }

    /// Returns true if the countdown is advancing.
    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    /// Returns true if the countdown is halted mid-phase.
    pub fn is_paused(&self) -> bool {
        self.run_state == RunState::Paused
    }

    /// Read-only snapshot for status reporting.
    pub fn status(&self) -> TimerStatus {
        TimerStatus {
            run_state: self.run_state,
            phase: self.phase,
            remaining: self.remaining,
            intervals_today: self.intervals_today,
        }
    }
}

// ============================================================================
// TimerStatus
// ============================================================================

/// Snapshot of `{run_state, phase, remaining, intervals_today}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStatus {
    pub run_state: RunState,
    pub phase: Phase,
    pub remaining: Duration,
    pub intervals_today: u32,
}

impl TimerStatus {
    /// Whole seconds left, truncated.
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining.as_secs()
    }

    /// Remaining time as `mm:ss`.
    pub fn format_remaining(&self) -> String {
        format_mm_ss(self.remaining_seconds())
    }

    /// Whether the blocker should treat this as a focus interval.
    pub fn in_focus_interval(&self) -> bool {
        self.phase == Phase::Work && self.run_state == RunState::Running
    }
}

/// Formats seconds as `mm:ss` (minutes are not wrapped at 60).
pub fn format_mm_ss(total_seconds: u64) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

// ============================================================================
// IPC Types
// ============================================================================

/// Actions understood by the control socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Status,
    Start,
    Pause,
    Resume,
    Skip,
    Reset,
    ToggleBlock,
    ToggleAlwaysBlock,
}

impl Action {
    /// Parses the wire name of an action.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Action::Status),
            "start" => Some(Action::Start),
            "pause" => Some(Action::Pause),
            "resume" => Some(Action::Resume),
            "skip" => Some(Action::Skip),
            "reset" => Some(Action::Reset),
            "toggle_block" => Some(Action::ToggleBlock),
            "toggle_always_block" | "toggle_always" => Some(Action::ToggleAlwaysBlock),
            _ => None,
        }
    }

    /// Returns the wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Status => "status",
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Skip => "skip",
            Action::Reset => "reset",
            Action::ToggleBlock => "toggle_block",
            Action::ToggleAlwaysBlock => "toggle_always_block",
        }
    }

    /// Returns true for actions that change daemon state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Action::Status)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IPC request from client to daemon.
///
/// The action is kept as a string so unknown actions can be answered with a
/// structured error instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcRequest {
    /// Action name
    pub action: String,
}

impl IpcRequest {
    /// Creates a request for the given action.
    pub fn new(action: Action) -> Self {
        Self {
            action: action.as_str().to_string(),
        }
    }
}

/// Status payload carried by successful responses and push updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// Run state
    pub run_state: RunState,
    /// Current phase
    pub phase: Phase,
    /// Remaining time formatted as `mm:ss`
    pub remaining: String,
    /// Remaining whole seconds
    pub remaining_seconds: u64,
    /// Work intervals completed today
    pub intervals_today: u32,
    /// Daily interval goal
    pub daily_goal: u32,
    /// Whether the blocker is enabled
    pub block_enabled: bool,
    /// Whether the blocker also runs outside focus intervals
    pub always_block: bool,
    /// Completed intervals for the trailing seven days, oldest first
    pub week_values: Vec<u32>,
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Whether the action succeeded
    pub success: bool,
    /// Status after the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusPayload>,
    /// Error description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(data: StatusPayload) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
