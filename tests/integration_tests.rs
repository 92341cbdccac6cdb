//! Integration tests for daemon-client IPC communication.
//!
//! These tests run a real `Daemon` on a temporary socket and talk to it
//! with `IpcClient`:
//! - fresh start and status
//! - cycling through work intervals into a long break
//! - blocker toggles, reset, seeding from persistence
//! - concurrent clients, single-instance socket, shutdown

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};

use tomato::blocker::MockProcessControl;
use tomato::cli::{DaemonNotRunning, IpcClient};
use tomato::config::AppConfig;
use tomato::daemon::Daemon;
use tomato::notification::MockNotifier;
use tomato::storage::{today, IntervalStore, MemoryStore, SqliteStore};
use tomato::types::{Action, IpcRequest, Phase, RunState, StatusPayload, TimerConfig};

// ============================================================================
// Test Helpers
// ============================================================================

/// Creates a temporary socket path for testing.
fn create_temp_socket_path() -> PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integration_test.sock");
    // Keep the directory so it's not deleted
    std::mem::forget(dir);
    path
}

fn test_config() -> AppConfig {
    AppConfig {
        block_enabled: false,
        ..AppConfig::default()
    }
}

fn build_daemon(store: Arc<dyn IntervalStore>) -> Arc<Daemon> {
    Daemon::builder(&test_config())
        .timer_config(TimerConfig::from_minutes(25, 5, 15, 4))
        .store(store)
        .notifier(Arc::new(MockNotifier::new()))
        .process_control(Arc::new(MockProcessControl::new()))
        .build()
}

/// Waits until something answers on the socket.
async fn wait_for_daemon(socket_path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while std::os::unix::net::UnixStream::connect(socket_path).is_err() {
        assert!(Instant::now() < deadline, "daemon did not come up");
        sleep(Duration::from_millis(10)).await;
    }
}

/// Starts `daemon` on a fresh socket.
async fn spawn_daemon(daemon: Arc<Daemon>) -> (PathBuf, JoinHandle<anyhow::Result<()>>) {
    let socket_path = create_temp_socket_path();
    let run_path = socket_path.clone();
    let handle = tokio::spawn(async move { daemon.run(&run_path).await });
    wait_for_daemon(&socket_path).await;
    (socket_path, handle)
}

async fn send(socket_path: &Path, action: Action) -> StatusPayload {
    IpcClient::with_socket_path(socket_path)
        .send(action)
        .await
        .unwrap()
}

// ============================================================================
// End-to-End Scenarios
// ============================================================================

#[tokio::test]
async fn test_start_then_status() {
    let (socket_path, _handle) = spawn_daemon(build_daemon(Arc::new(MemoryStore::new()))).await;

    let started = send(&socket_path, Action::Start).await;
    let status = send(&socket_path, Action::Status).await;

    assert_eq!(started.run_state, RunState::Running);
    assert_eq!(status.phase, Phase::Work);
    assert_eq!(status.run_state, RunState::Running);
    assert!(
        (1498..=1500).contains(&status.remaining_seconds),
        "unexpected remaining: {}",
        status.remaining_seconds
    );
}

#[tokio::test]
async fn test_four_work_intervals_lead_to_long_break() {
    let store = Arc::new(MemoryStore::new());
    let (socket_path, _handle) = spawn_daemon(build_daemon(store.clone())).await;

    // work, short, work, short, work, short, work
    for _ in 0..7 {
        send(&socket_path, Action::Skip).await;
    }
    let status = send(&socket_path, Action::Status).await;

    assert_eq!(status.phase, Phase::LongBreak);
    assert_eq!(status.intervals_today, 4);
    assert_eq!(status.run_state, RunState::Idle);
    assert_eq!(status.remaining, "15:00");

    // Completions are recorded off the request path.
    let deadline = Instant::now() + Duration::from_secs(2);
    while store.count_for_today().unwrap() < 4 {
        assert!(Instant::now() < deadline, "intervals were not recorded");
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.count_for_today().unwrap(), 4);
}

#[tokio::test]
async fn test_toggle_block_twice_restores_value() {
    let (socket_path, _handle) = spawn_daemon(build_daemon(Arc::new(MemoryStore::new()))).await;

    let before = send(&socket_path, Action::Status).await.block_enabled;
    let first = send(&socket_path, Action::ToggleBlock).await;
    let second = send(&socket_path, Action::ToggleBlock).await;

    assert_eq!(first.block_enabled, !before);
    assert_eq!(second.block_enabled, before);
}

#[tokio::test]
async fn test_reset_when_fresh_keeps_defaults_and_seed() {
    let store = Arc::new(MemoryStore::with_counts([(today(), 2)]));
    let (socket_path, _handle) = spawn_daemon(build_daemon(store)).await;

    let initial = send(&socket_path, Action::Status).await;
    send(&socket_path, Action::Reset).await;
    let after = send(&socket_path, Action::Status).await;

    assert_eq!(after, initial);
    assert_eq!(after.intervals_today, 2);
    assert_eq!(after.phase, Phase::Work);
    assert_eq!(after.run_state, RunState::Idle);
    assert_eq!(after.remaining_seconds, 1500);
}

// ============================================================================
// Command Semantics
// ============================================================================

#[tokio::test]
async fn test_pause_and_resume_keep_remaining() {
    let (socket_path, _handle) = spawn_daemon(build_daemon(Arc::new(MemoryStore::new()))).await;

    send(&socket_path, Action::Start).await;
    let paused = send(&socket_path, Action::Pause).await;
    sleep(Duration::from_millis(1200)).await;
    let still_paused = send(&socket_path, Action::Status).await;
    let resumed = send(&socket_path, Action::Start).await;

    assert_eq!(paused.run_state, RunState::Paused);
    assert_eq!(still_paused.remaining_seconds, paused.remaining_seconds);
    assert_eq!(resumed.run_state, RunState::Running);
    assert_eq!(resumed.remaining_seconds, paused.remaining_seconds);
}

#[tokio::test]
async fn test_double_start_is_noop() {
    let daemon = build_daemon(Arc::new(MemoryStore::new()));
    let (socket_path, _handle) = spawn_daemon(daemon.clone()).await;

    send(&socket_path, Action::Start).await;
    let second = send(&socket_path, Action::Start).await;

    assert_eq!(second.run_state, RunState::Running);
    assert_eq!(daemon.timer().active_tick_loops(), 1);
}

#[tokio::test]
async fn test_unknown_action_gets_error_response() {
    let (socket_path, _handle) = spawn_daemon(build_daemon(Arc::new(MemoryStore::new()))).await;

    let response = IpcClient::with_socket_path(&socket_path)
        .request(&IpcRequest {
            action: "launch_rocket".to_string(),
        })
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("unknown action: launch_rocket"));

    // The daemon keeps serving afterwards.
    assert_eq!(send(&socket_path, Action::Status).await.run_state, RunState::Idle);
}

#[tokio::test]
async fn test_malformed_request_gets_error_response() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let (socket_path, _handle) = spawn_daemon(build_daemon(Arc::new(MemoryStore::new()))).await;

    let mut stream = tokio::net::UnixStream::connect(&socket_path).await.unwrap();
    stream.write_all(b"{this is not json\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).await.unwrap();

    let response: tomato::IpcResponse = serde_json::from_str(&line).unwrap();
    assert!(!response.success);
    assert!(response.error.unwrap().starts_with("invalid request"));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_status_during_start_sees_whole_states() {
    let (socket_path, _handle) = spawn_daemon(build_daemon(Arc::new(MemoryStore::new()))).await;

    let mut readers = Vec::new();
    for _ in 0..16 {
        let path = socket_path.clone();
        readers.push(tokio::spawn(async move { send(&path, Action::Status).await }));
    }
    let start_path = socket_path.clone();
    let starter = tokio::spawn(async move { send(&start_path, Action::Start).await });

    for reader in readers {
        let status = reader.await.unwrap();
        assert_eq!(status.phase, Phase::Work);
        match status.run_state {
            RunState::Idle => assert_eq!(status.remaining_seconds, 1500),
            RunState::Running => assert!(status.remaining_seconds >= 1498),
            RunState::Paused => panic!("no client paused the timer"),
        }
    }
    assert_eq!(starter.await.unwrap().run_state, RunState::Running);
}

#[tokio::test]
async fn test_status_after_start_response_observes_start() {
    let (socket_path, _handle) = spawn_daemon(build_daemon(Arc::new(MemoryStore::new()))).await;

    send(&socket_path, Action::Start).await;

    let mut readers = Vec::new();
    for _ in 0..8 {
        let path = socket_path.clone();
        readers.push(tokio::spawn(async move { send(&path, Action::Status).await }));
    }
    for reader in readers {
        assert_eq!(reader.await.unwrap().run_state, RunState::Running);
    }
}

#[tokio::test]
async fn test_concurrent_skips_are_serialized() {
    let daemon = build_daemon(Arc::new(MemoryStore::new()));
    let (socket_path, _handle) = spawn_daemon(daemon.clone()).await;

    let mut skippers = Vec::new();
    for _ in 0..8 {
        let path = socket_path.clone();
        skippers.push(tokio::spawn(async move { send(&path, Action::Skip).await }));
    }
    for skipper in skippers {
        skipper.await.unwrap();
    }

    // 8 skips starting from work complete 4 work phases, ending on work.
    let status = send(&socket_path, Action::Status).await;
    assert_eq!(status.intervals_today, 4);
    assert_eq!(status.phase, Phase::Work);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_second_daemon_fails_fast() {
    let (socket_path, _handle) = spawn_daemon(build_daemon(Arc::new(MemoryStore::new()))).await;

    let second_store = Arc::new(MemoryStore::new());
    let second = build_daemon(second_store.clone());
    let result = timeout(Duration::from_secs(2), Arc::clone(&second).run(&socket_path))
        .await
        .expect("second daemon should not block");

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("already running"));
    assert!(second.timer().is_shut_down());
    assert!(second_store.count_for_today().is_err(), "store left open");
    assert_eq!(send(&socket_path, Action::Status).await.run_state, RunState::Idle);
}

#[tokio::test]
async fn test_stop_closes_socket_and_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("tomato.db")).unwrap());
    let daemon = build_daemon(store.clone());
    let (socket_path, handle) = spawn_daemon(daemon.clone()).await;

    send(&socket_path, Action::Start).await;
    daemon.stop();
    daemon.stop();

    timeout(Duration::from_secs(2), handle)
        .await
        .expect("daemon did not stop")
        .unwrap()
        .unwrap();

    assert!(!socket_path.exists());
    assert!(daemon.timer().is_shut_down());
    assert!(store.count_for_today().is_err());

    let err = IpcClient::with_socket_path(&socket_path)
        .with_retries(1)
        .send(Action::Status)
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<DaemonNotRunning>().is_some());
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tomato.db");

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let daemon = build_daemon(store);
        let (socket_path, handle) = spawn_daemon(daemon.clone()).await;
        send(&socket_path, Action::Skip).await;
        daemon.stop();
        timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let (socket_path, _handle) = spawn_daemon(build_daemon(store)).await;
    let status = send(&socket_path, Action::Status).await;

    assert_eq!(status.intervals_today, 1);
    assert_eq!(status.week_values.last(), Some(&1));
}
