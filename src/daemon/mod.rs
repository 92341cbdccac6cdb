//! Daemon module for the Tomato timer.
//!
//! This module contains the core daemon functionality:
//! - `timer`: Phase engine and tick driver
//! - `service`: Orchestration of timer, blocker, store and notifications
//! - `ipc`: Control socket server and request dispatch
//! - `push`: Status fan-out to display front-ends

pub mod ipc;
pub mod push;
pub mod service;
pub mod timer;

pub use ipc::{IpcError, IpcServer, RequestHandler};
pub use push::StatusBroadcaster;
pub use service::{Daemon, DaemonBuilder};
pub use timer::{Timer, TimerEvent};
