//! Tomato Timer Library
//!
//! This library provides the core functionality for the Tomato pomodoro
//! daemon and its command-line client. It includes:
//! - Phase engine and tick driver for pomodoro sessions
//! - Distraction blocker that terminates a configured process during focus
//! - Control socket server and client (newline-delimited JSON)
//! - Interval history storage (SQLite or in-memory)
//! - Desktop notifications
//! - Configuration and CLI utilities

pub mod blocker;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod notification;
pub mod storage;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{AppConfig, Paths};
pub use daemon::{Daemon, DaemonBuilder, Timer, TimerEvent};
pub use types::{
    Action, IpcRequest, IpcResponse, Phase, RunState, StatusPayload, TimerConfig, TimerState,
};
