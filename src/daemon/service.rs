//! Daemon orchestration.
//!
//! `Daemon` owns the timer, the blocker and the persistence/notification
//! collaborators, and wires them together:
//! - seeds today's interval count from the store at construction and again
//!   when the local date changes
//! - serializes mutating actions and re-derives the blocker's focus flag
//! - consumes timer completion events off the critical path (record,
//!   notify, re-sync, push)
//! - runs the blocker poll loop and the periodic status push loop
//! - shuts everything down idempotently

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use crossbeam_channel::Receiver;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blocker::{
    Blocker, BlockerState, ProcessControl, SysinfoProcessControl, DEFAULT_POLL_INTERVAL,
};
use crate::config::AppConfig;
use crate::notification::{Notifier, OsascriptNotifier};
use crate::storage::{today, IntervalStore, MemoryStore, WEEK_DAYS};
use crate::types::{Action, Phase, RunState, StatusPayload, TimerConfig, TimerState};

use super::ipc::{self, IpcServer, RequestHandler};
use super::push::StatusBroadcaster;
use super::timer::{Timer, TimerEvent, DEFAULT_TICK_INTERVAL};

/// Cadence of the status push loop while the timer runs.
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// DaemonBuilder
// ============================================================================

/// Assembles a [`Daemon`] from configuration and collaborators.
pub struct DaemonBuilder {
    timer_config: TimerConfig,
    daily_goal: u32,
    blocker_state: BlockerState,
    blocked_process: String,
    tick_interval: Duration,
    blocker_poll_interval: Duration,
    push_interval: Duration,
    store: Option<Arc<dyn IntervalStore>>,
    process_control: Option<Arc<dyn ProcessControl>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl DaemonBuilder {
    /// Starts from the values in `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timer_config: config.timer_config(),
            daily_goal: config.daily_goal,
            blocker_state: BlockerState::new(config.block_enabled, config.always_block),
            blocked_process: config.blocked_process.clone(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            blocker_poll_interval: DEFAULT_POLL_INTERVAL,
            push_interval: DEFAULT_PUSH_INTERVAL,
            store: None,
            process_control: None,
            notifier: None,
        }
    }

    pub fn timer_config(mut self, timer_config: TimerConfig) -> Self {
        self.timer_config = timer_config;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn blocker_poll_interval(mut self, interval: Duration) -> Self {
        self.blocker_poll_interval = interval;
        self
    }

    pub fn push_interval(mut self, interval: Duration) -> Self {
        self.push_interval = interval;
        self
    }

    pub fn store(mut self, store: Arc<dyn IntervalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn process_control(mut self, control: Arc<dyn ProcessControl>) -> Self {
        self.process_control = Some(control);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Builds the daemon. Nothing is spawned until [`Daemon::run`] or
    /// [`Daemon::spawn_background`].
    pub fn build(self) -> Arc<Daemon> {
        let store: Arc<dyn IntervalStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(OsascriptNotifier::new()),
        };
        let control: Arc<dyn ProcessControl> = match self.process_control {
            Some(control) => control,
            None => Arc::new(SysinfoProcessControl::new()),
        };

        let seeded_day = today();
        let intervals_today = match store.count_for_date(seeded_day) {
            Ok(count) => count,
            Err(e) => {
                warn!("failed to read today's interval count, starting from 0: {e}");
                0
            }
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let state = TimerState::new(self.timer_config).with_intervals_today(intervals_today);
        let timer = Timer::with_tick_interval(state, self.tick_interval, event_tx);
        let blocker = Arc::new(Blocker::new(
            self.blocker_state,
            self.blocked_process,
            control,
            Arc::clone(&notifier),
        ));

        Arc::new(Daemon {
            timer,
            blocker,
            store,
            notifier,
            broadcaster: StatusBroadcaster::new(),
            daily_goal: self.daily_goal,
            blocker_poll_interval: self.blocker_poll_interval,
            push_interval: self.push_interval,
            gate: tokio::sync::Mutex::new(()),
            counted_day: Mutex::new(seeded_day),
            events: Mutex::new(Some(event_rx)),
            shutdown: CancellationToken::new(),
        })
    }
}

// ============================================================================
// Daemon
// ============================================================================

/// The long-running timer engine.
pub struct Daemon {
    timer: Timer,
    blocker: Arc<Blocker>,
    store: Arc<dyn IntervalStore>,
    notifier: Arc<dyn Notifier>,
    broadcaster: StatusBroadcaster,
    daily_goal: u32,
    blocker_poll_interval: Duration,
    push_interval: Duration,
    /// Serializes mutating actions; status reads bypass it
    gate: tokio::sync::Mutex<()>,
    /// Local date the timer's interval count belongs to
    counted_day: Mutex<NaiveDate>,
    /// Completion events, taken by the event loop
    events: Mutex<Option<mpsc::UnboundedReceiver<TimerEvent>>>,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn builder(config: &AppConfig) -> DaemonBuilder {
        DaemonBuilder::from_config(config)
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn blocker(&self) -> &Arc<Blocker> {
        &self.blocker
    }

    pub fn daily_goal(&self) -> u32 {
        self.daily_goal
    }

    /// Executes one action and returns the resulting status.
    ///
    /// Mutating actions are serialized; the returned status reflects the
    /// action and every action completed before it. Once the daemon is
    /// stopping, mutating actions only report the status.
    pub async fn execute(&self, action: Action) -> StatusPayload {
        if !action.is_mutating() {
            return self.status_payload().await;
        }

        let _gate = self.gate.lock().await;
        if self.shutdown.is_cancelled() {
            debug!("ignoring {action}, daemon is stopping");
            return self.status_payload().await;
        }

        debug!("executing {action}");
        match action {
            Action::Start => {
                self.timer.start();
            }
            Action::Pause => {
                self.timer.pause();
            }
            Action::Resume => {
                self.timer.resume();
            }
            Action::Skip => {
                self.timer.skip();
            }
            Action::Reset => self.timer.reset(),
            Action::ToggleBlock => {
                let enabled = self.blocker.toggle_enabled();
                info!("blocker {}", if enabled { "enabled" } else { "disabled" });
            }
            Action::ToggleAlwaysBlock => {
                let always = self.blocker.toggle_always_block();
                info!("always-block {}", if always { "on" } else { "off" });
            }
            Action::Status => {}
        }
        self.sync_blocker();

        let payload = self.status_payload().await;
        self.broadcaster.publish(&payload);
        payload
    }

    /// Current status with today's and the weekly counts.
    ///
    /// `week_values` is exactly what the store reports; `intervals_today`
    /// also covers completions the store has not recorded yet. Storage
    /// failures fall back to the in-memory count and zeros.
    pub async fn status_payload(&self) -> StatusPayload {
        let counts = self.read_stored_counts().await;
        self.roll_over_day(&counts);

        let status = self.timer.status();
        let blocker = self.blocker.state();

        StatusPayload {
            run_state: status.run_state,
            phase: status.phase,
            remaining: status.format_remaining(),
            remaining_seconds: status.remaining_seconds(),
            intervals_today: status.intervals_today.max(counts.today.unwrap_or(0)),
            daily_goal: self.daily_goal,
            block_enabled: blocker.enabled,
            always_block: blocker.always_block,
            week_values: counts.week.unwrap_or_else(|| vec![0; WEEK_DAYS]),
        }
    }

    /// Reads today's count and the trailing week on a blocking task.
    async fn read_stored_counts(&self) -> StoredCounts {
        let store = Arc::clone(&self.store);
        let read = tokio::task::spawn_blocking(move || {
            let date = today();
            (
                date,
                store.count_for_date(date),
                store.counts_for_week_ending(date),
            )
        })
        .await;

        match read {
            Ok((date, count, week)) => StoredCounts {
                date,
                today: count
                    .inspect_err(|e| warn!("failed to read today's count: {e}"))
                    .ok(),
                week: week
                    .map(|days| days.iter().map(|day| day.intervals).collect())
                    .inspect_err(|e| warn!("failed to read weekly counts: {e}"))
                    .ok(),
            },
            Err(e) => {
                warn!("store read task failed: {e}");
                StoredCounts {
                    date: today(),
                    today: None,
                    week: None,
                }
            }
        }
    }

    /// Re-seeds the timer's count from the store once the local date changes.
    fn roll_over_day(&self, counts: &StoredCounts) {
        let mut day = self.counted_day.lock().unwrap_or_else(|e| e.into_inner());
        if *day == counts.date {
            return;
        }
        info!("date changed to {}, re-seeding today's intervals", counts.date);
        *day = counts.date;
        self.timer.set_intervals_today(counts.today.unwrap_or(0));
    }

    /// Registers a channel subscriber for pushed status updates.
    pub fn subscribe(&self) -> Receiver<StatusPayload> {
        self.broadcaster.subscribe()
    }

    /// Registers a callback invoked with every pushed status update.
    pub fn set_observer(&self, observer: impl Fn(&StatusPayload) + Send + Sync + 'static) {
        self.broadcaster.add_observer(Arc::new(observer));
    }

    /// Feeds `phase == Work && run_state == Running` to the blocker.
    ///
    /// Callers hold `gate`.
    fn sync_blocker(&self) {
        let in_focus = self.timer.status().in_focus_interval();
        self.blocker.set_in_focus_interval(in_focus);
    }

    async fn push_status(&self) {
        if self.broadcaster.has_subscribers() {
            let payload = self.status_payload().await;
            self.broadcaster.publish(&payload);
        }
    }

    async fn record_completed_interval(&self) {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.record_interval_completed(today())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to record completed interval: {e}"),
            Err(e) => warn!("record task failed: {e}"),
        }
    }

    /// Reacts to one timer event. Side-effect failures are logged only.
    async fn handle_event(&self, event: TimerEvent) {
        match event {
            TimerEvent::PhaseCompleted {
                completed,
                next,
                intervals_today,
            } => {
                info!("{completed} complete, next: {next} ({intervals_today} today)");
                if completed == Phase::Work {
                    self.record_completed_interval().await;
                    self.notifier.notify("Work interval complete!", "Time for a break.");
                } else {
                    self.notifier.notify("Break complete!", "Ready to focus?");
                }

                {
                    let _gate = self.gate.lock().await;
                    self.sync_blocker();
                }
                self.push_status().await;
            }
            other => debug!("timer event: {other:?}"),
        }
    }

    /// Spawns the event, blocker and push loops.
    ///
    /// Returns no handles if the loops were already spawned.
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let Some(events) = self.events.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return Vec::new();
        };

        vec![
            tokio::spawn(Arc::clone(self).event_loop(events)),
            tokio::spawn(
                Arc::clone(&self.blocker).run(self.blocker_poll_interval, self.shutdown.clone()),
            ),
            tokio::spawn(Arc::clone(self).push_loop()),
        ]
    }

    async fn event_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TimerEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        // Wait out an action already past the gate; later ones see the stop.
        drop(self.gate.lock().await);

        // Completions queued before the stop are still recorded.
        while let Ok(event) = events.try_recv() {
            self.handle_event(event).await;
        }
        debug!("event loop stopped");
    }

    async fn push_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.push_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if self.timer.status().run_state == RunState::Running {
                        self.push_status().await;
                    }
                }
            }
        }
        debug!("push loop stopped");
    }

    /// Serves the control socket at `socket_path` until [`Daemon::stop`].
    ///
    /// Fails fast if another daemon already answers on the socket. All
    /// resources are released before this returns, on success or error.
    pub async fn run(self: Arc<Self>, socket_path: &Path) -> Result<()> {
        let server = match IpcServer::new(socket_path) {
            Ok(server) => server,
            Err(e) => {
                self.shutdown();
                return Err(anyhow::Error::new(e).context(format!(
                    "failed to start control socket at {}",
                    socket_path.display()
                )));
            }
        };
        info!("listening on {}", socket_path.display());

        let tasks = self.spawn_background();
        let handler = Arc::new(RequestHandler::new(Arc::clone(&self)));
        ipc::serve(&server, handler, self.shutdown.clone()).await;

        self.stop();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("background task failed: {e}");
            }
        }
        drop(server);
        self.shutdown();
        info!("daemon stopped");
        Ok(())
    }

    /// Halts the countdown and signals every loop to stop. Returns
    /// immediately.
    ///
    /// The tick loop stops first, so no phase can complete after the event
    /// loop has drained its queue.
    pub fn stop(&self) {
        self.timer.shutdown();
        self.shutdown.cancel();
    }

    /// Stops all loops and the timer and closes the store.
    ///
    /// Idempotent and safe to call concurrently.
    pub fn shutdown(&self) {
        self.stop();
        if let Err(e) = self.store.close() {
            warn!("failed to close interval store: {e}");
        }
    }
}

/// Store reads backing one status payload.
struct StoredCounts {
    date: NaiveDate,
    today: Option<u32>,
    week: Option<Vec<u32>>,
}

// ============================================================================
// Tests
// ============================================================================
