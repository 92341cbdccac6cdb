//! Timer engine for the Tomato daemon.
//!
//! `Timer` wraps the pure [`TimerState`] machine behind a reader/writer lock
//! and drives it in real time:
//! - Every mutation (start/pause/resume/skip/reset/tick) takes the write lock
//!   for its full duration and performs no I/O while holding it
//! - Each Running period owns exactly one tick loop, identified by a
//!   cancellation token that is cancelled under the write lock
//! - Phase completions are sent on an event channel while the transition is
//!   still under the lock, and are handled by the receiver off the critical
//!   path

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{Phase, RunState, TimerState, TimerStatus};

/// Polling cadence of the tick loop.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// TimerEvent
// ============================================================================

/// Events emitted by the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// Countdown started from Idle
    Started {
        /// Phase that started running
        phase: Phase,
    },
    /// Countdown halted
    Paused {
        /// Remaining time frozen at the pause
        remaining: Duration,
    },
    /// Countdown continued from Paused
    Resumed {
        /// Phase that resumed running
        phase: Phase,
    },
    /// A phase ended, either by running out or by `skip`
    PhaseCompleted {
        /// Phase that just ended
        completed: Phase,
        /// Phase that is now current
        next: Phase,
        /// Work intervals completed today after the transition
        intervals_today: u32,
    },
    /// Timer returned to an idle work phase
    Reset,
}

// ============================================================================
// Timer
// ============================================================================

struct Inner {
    state: TimerState,
    /// Reference instant for the next elapsed-time computation
    last_tick: Instant,
    /// Token of the live tick loop, present only while Running
    tick_token: Option<CancellationToken>,
}

struct Shared {
    inner: RwLock<Inner>,
    event_tx: mpsc::UnboundedSender<TimerEvent>,
    tick_interval: Duration,
    shutdown: CancellationToken,
    active_loops: AtomicUsize,
}

/// Lock-guarded phase engine with its tick driver.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct Timer {
    shared: Arc<Shared>,
}

impl Timer {
    /// Creates a timer with the default tick interval.
    pub fn new(state: TimerState, event_tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self::with_tick_interval(state, DEFAULT_TICK_INTERVAL, event_tx)
    }

    /// Creates a timer polling every `tick_interval`.
    pub fn with_tick_interval(
        state: TimerState,
        tick_interval: Duration,
        event_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: RwLock::new(Inner {
                    state,
                    last_tick: Instant::now(),
                    tick_token: None,
                }),
                event_tx,
                tick_interval,
                shutdown: CancellationToken::new(),
                active_loops: AtomicUsize::new(0),
            }),
        }
    }

    /// Starts the countdown. Resumes when Paused; no-op when already Running.
    ///
    /// Returns true if the timer was not running before.
    pub fn start(&self) -> bool {
        let mut inner = self.shared.write();
        if inner.state.is_running() || self.shared.shutdown.is_cancelled() {
            return false;
        }

        let event = if inner.state.is_paused() {
            TimerEvent::Resumed {
                phase: inner.state.phase,
            }
        } else {
            TimerEvent::Started {
                phase: inner.state.phase,
            }
        };
        self.shared.begin_running(&mut inner);
        self.shared.emit(event);
        true
    }

    /// Halts the countdown, keeping the remaining time.
    ///
    /// Returns false unless the timer was Running. The tick loop performs no
    /// further mutation once this returns.
    pub fn pause(&self) -> bool {
        let mut inner = self.shared.write();
        if !inner.state.is_running() {
            return false;
        }

        stop_ticking(&mut inner);
        let elapsed = inner.last_tick.elapsed();
        inner.state.remaining = inner.state.remaining.saturating_sub(elapsed);
        inner.state.run_state = RunState::Paused;

        self.shared.emit(TimerEvent::Paused {
            remaining: inner.state.remaining,
        });
        true
    }

    /// Continues a paused countdown. No-op from any other state.
    pub fn resume(&self) -> bool {
        let mut inner = self.shared.write();
        if !inner.state.is_paused() || self.shared.shutdown.is_cancelled() {
            return false;
        }

        self.shared.begin_running(&mut inner);
        self.shared.emit(TimerEvent::Resumed {
            phase: inner.state.phase,
        });
        true
    }

    /// Ends the current phase immediately and leaves the timer Idle.
    ///
    /// Returns the phase that was skipped. The completion event is queued
    /// before the lock is released; its handling does not block the caller.
    pub fn skip(&self) -> Phase {
        let mut inner = self.shared.write();
        stop_ticking(&mut inner);

        let completed = inner.state.advance_phase();
        inner.state.run_state = RunState::Idle;

        self.shared.emit(TimerEvent::PhaseCompleted {
            completed,
            next: inner.state.phase,
            intervals_today: inner.state.intervals_today,
        });
        completed
    }

    /// Returns to an idle work phase. Today's interval count is kept.
    pub fn reset(&self) {
        let mut inner = self.shared.write();
        stop_ticking(&mut inner);
        inner.state.reset();
        self.shared.emit(TimerEvent::Reset);
    }

    /// Overwrites today's interval count.
    pub fn set_intervals_today(&self, intervals_today: u32) {
        self.shared.write().state.intervals_today = intervals_today;
    }

    /// Snapshot of `{run_state, phase, remaining, intervals_today}`.
    pub fn status(&self) -> TimerStatus {
        self.shared.read().state.status()
    }

    /// Full copy of the state machine.
    pub fn state(&self) -> TimerState {
        self.shared.read().state.clone()
    }

    /// Number of tick loops currently alive.
    pub fn active_tick_loops(&self) -> usize {
        self.shared.active_loops.load(Ordering::SeqCst)
    }

    /// Stops the tick loop for good. Later `start`/`resume` calls are no-ops.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let mut inner = self.shared.write();
        stop_ticking(&mut inner);
    }

    /// Returns true once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TimerEvent) {
        if let Err(e) = self.event_tx.send(event) {
            debug!("timer event dropped, no receiver: {:?}", e.0);
        }
    }

    /// Enters a new Running epoch with its own tick loop.
    fn begin_running(self: &Arc<Self>, inner: &mut Inner) {
        stop_ticking(inner);

        inner.state.run_state = RunState::Running;
        inner.last_tick = Instant::now();

        let token = self.shutdown.child_token();
        inner.tick_token = Some(token.clone());

        let guard = LoopGuard::new(Arc::clone(self));
        tokio::spawn(async move {
            let shared = Arc::clone(&guard.shared);
            tick_loop(shared, token).await;
            drop(guard);
        });
    }

    /// Applies one tick. Returns false when the loop should exit.
    fn on_tick(&self, token: &CancellationToken) -> bool {
        let mut inner = self.write();
        if token.is_cancelled() || !inner.state.is_running() {
            return false;
        }

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(inner.last_tick);
        inner.last_tick = now;

        if let Some(completed) = inner.state.advance_by(elapsed) {
            self.emit(TimerEvent::PhaseCompleted {
                completed,
                next: inner.state.phase,
                intervals_today: inner.state.intervals_today,
            });
        }
        true
    }
}

fn stop_ticking(inner: &mut Inner) {
    if let Some(token) = inner.tick_token.take() {
        token.cancel();
    }
}

/// Tracks a live tick loop; dropped when the loop task ends or is discarded.
struct LoopGuard {
    shared: Arc<Shared>,
}

impl LoopGuard {
    fn new(shared: Arc<Shared>) -> Self {
        shared.active_loops.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.shared.active_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn tick_loop(shared: Arc<Shared>, token: CancellationToken) {
    let mut ticker = interval(shared.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if !shared.on_tick(&token) {
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
