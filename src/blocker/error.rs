//! Blocker error types.

use thiserror::Error;

/// Errors from scanning or terminating processes.
///
/// The blocker is best-effort; these are logged and swallowed by the poll
/// loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockerError {
    /// The process table could not be read.
    #[error("failed to list processes: {0}")]
    ScanFailed(String),

    /// The process exited before it could be terminated.
    #[error("process {0} no longer exists")]
    ProcessGone(u32),

    /// The OS refused to deliver the kill signal.
    #[error("failed to terminate {name} (pid {pid})")]
    TerminateFailed { name: String, pid: u32 },

    /// The blocking scan task panicked or was cancelled.
    #[error("scan task failed: {0}")]
    TaskFailed(String),
}
