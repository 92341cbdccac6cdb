//! Process table access for the blocker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::error::BlockerError;

/// A running process as seen by the blocker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl ProcessInfo {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// Lists and terminates processes.
///
/// Both calls may block on the OS; the blocker runs them on a blocking task.
pub trait ProcessControl: Send + Sync {
    fn list_processes(&self) -> Result<Vec<ProcessInfo>, BlockerError>;
    fn terminate(&self, process: &ProcessInfo) -> Result<(), BlockerError>;
}

// ============================================================================
// SysinfoProcessControl
// ============================================================================

/// [`ProcessControl`] backed by `sysinfo`.
pub struct SysinfoProcessControl {
    system: Mutex<System>,
}

impl SysinfoProcessControl {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SysinfoProcessControl {
    fn list_processes(&self) -> Result<Vec<ProcessInfo>, BlockerError> {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::new());

        Ok(system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
            })
            .collect())
    }

    fn terminate(&self, process: &ProcessInfo) -> Result<(), BlockerError> {
        let system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        let target = system
            .process(Pid::from_u32(process.pid))
            .ok_or(BlockerError::ProcessGone(process.pid))?;

        if target.kill() {
            Ok(())
        } else {
            Err(BlockerError::TerminateFailed {
                name: process.name.clone(),
                pid: process.pid,
            })
        }
    }
}

// ============================================================================
// MockProcessControl
// ============================================================================

/// In-memory process table for tests.
#[derive(Debug, Default)]
pub struct MockProcessControl {
    running: Mutex<Vec<ProcessInfo>>,
    terminated: Mutex<Vec<ProcessInfo>>,
    should_fail_list: AtomicBool,
    should_fail_terminate: AtomicBool,
}

impl MockProcessControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table holding `names`, with pids assigned from 100.
    #[must_use]
    pub fn with_processes(names: &[&str]) -> Self {
        let mock = Self::new();
        for name in names {
            mock.spawn(name);
        }
        mock
    }

    /// Adds a process and returns its pid.
    pub fn spawn(&self, name: &str) -> u32 {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let terminated = self.terminated.lock().unwrap_or_else(|e| e.into_inner()).len();
        let pid = 100 + (running.len() + terminated) as u32;
        running.push(ProcessInfo::new(pid, name));
        pid
    }

    pub fn set_should_fail_list(&self, should_fail: bool) {
        self.should_fail_list.store(should_fail, Ordering::SeqCst);
    }

    pub fn set_should_fail_terminate(&self, should_fail: bool) {
        self.should_fail_terminate.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn running(&self) -> Vec<ProcessInfo> {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[must_use]
    pub fn terminated(&self) -> Vec<ProcessInfo> {
        self.terminated.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[must_use]
    pub fn terminate_count(&self) -> usize {
        self.terminated.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ProcessControl for MockProcessControl {
    fn list_processes(&self) -> Result<Vec<ProcessInfo>, BlockerError> {
        if self.should_fail_list.load(Ordering::SeqCst) {
            return Err(BlockerError::ScanFailed("simulated failure".to_string()));
        }
        Ok(self.running())
    }

    fn terminate(&self, process: &ProcessInfo) -> Result<(), BlockerError> {
        if self.should_fail_terminate.load(Ordering::SeqCst) {
            return Err(BlockerError::TerminateFailed {
                name: process.name.clone(),
                pid: process.pid,
            });
        }

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let index = running
            .iter()
            .position(|p| p.pid == process.pid)
            .ok_or(BlockerError::ProcessGone(process.pid))?;
        let removed = running.remove(index);
        self.terminated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(removed);
        Ok(())
    }
}
