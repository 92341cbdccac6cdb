//! Control socket for the Tomato daemon.
//!
//! This module provides Unix Domain Socket IPC functionality:
//! - Server that listens on a Unix socket, one request per connection
//! - Newline-delimited JSON framing with size and time limits
//! - Request dispatch to the daemon, with structured error responses for
//!   malformed requests and unknown actions

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{Action, IpcRequest, IpcResponse};

use super::service::Daemon;

// ============================================================================
// Constants
// ============================================================================

/// Maximum request size in bytes (4KB)
pub const MAX_REQUEST_SIZE: usize = 4096;

/// Read timeout in seconds
const READ_TIMEOUT_SECS: u64 = 5;

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Another daemon answers on the socket
    #[error("Another daemon is already running on {0}")]
    AlreadyRunning(PathBuf),

    /// Socket binding error
    #[error("Failed to bind socket: {0}")]
    BindError(String),

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Client closed the connection without sending a request
    #[error("Connection closed by client")]
    ConnectionClosed,

    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Write error
    #[error("Failed to write response: {0}")]
    WriteError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// A stale socket file is removed before binding; a socket with a live
    /// daemon behind it is left alone and `AlreadyRunning` is returned.
    pub fn new(socket_path: &Path) -> Result<Self, IpcError> {
        if socket_path.exists() {
            if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
                return Err(IpcError::AlreadyRunning(socket_path.to_path_buf()));
            }
            std::fs::remove_file(socket_path).map_err(|e| {
                IpcError::BindError(format!("failed to remove stale socket {socket_path:?}: {e}"))
            })?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IpcError::BindError(format!("failed to create socket directory {parent:?}: {e}"))
            })?;
        }

        let listener = UnixListener::bind(socket_path)
            .map_err(|e| IpcError::BindError(format!("{socket_path:?}: {e}")))?;

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming client connection.
    pub async fn accept(&self) -> Result<UnixStream, IpcError> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| IpcError::ConnectionError(e.to_string()))?;
        Ok(stream)
    }

    /// Reads one request line (without the trailing newline).
    ///
    /// Applies a read timeout and the request size limit. A request that ends
    /// at EOF without a newline is accepted.
    pub async fn receive_request(stream: &mut UnixStream) -> Result<Vec<u8>, IpcError> {
        let mut line = Vec::new();
        let mut reader = BufReader::new(&mut *stream).take(MAX_REQUEST_SIZE as u64);

        let n = timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            reader.read_until(b'\n', &mut line),
        )
        .await
        .map_err(|_| IpcError::Timeout)?
        .map_err(|e| IpcError::ReadError(e.to_string()))?;

        if n == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        } else if n >= MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge);
        }
        Ok(line)
    }

    /// Serializes and sends an IPC response followed by a newline.
    pub async fn send_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<(), IpcError> {
        let mut json =
            serde_json::to_vec(response).map_err(|e| IpcError::SerializationError(e.to_string()))?;
        json.push(b'\n');

        stream
            .write_all(&json)
            .await
            .map_err(|e| IpcError::WriteError(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| IpcError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        // Clean up socket file on drop
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ============================================================================
// RequestHandler
// ============================================================================

/// Handles IPC requests by dispatching to the daemon.
pub struct RequestHandler {
    daemon: Arc<Daemon>,
}

impl RequestHandler {
    /// Creates a new request handler for the given daemon.
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self { daemon }
    }

    /// Handles one raw request line and returns the response.
    pub async fn handle(&self, raw: &[u8]) -> IpcResponse {
        let request: IpcRequest = match serde_json::from_slice(raw) {
            Ok(request) => request,
            Err(e) => return IpcResponse::error(format!("invalid request: {e}")),
        };

        match Action::parse(&request.action) {
            Some(action) => IpcResponse::success(self.daemon.execute(action).await),
            None => IpcResponse::error(format!("unknown action: {}", request.action)),
        }
    }

    /// Serves one connection: read one request, write one response.
    pub async fn handle_connection(&self, mut stream: UnixStream) {
        let response = match IpcServer::receive_request(&mut stream).await {
            Ok(raw) => self.handle(&raw).await,
            Err(IpcError::RequestTooLarge) => {
                IpcResponse::error(format!("invalid request: {}", IpcError::RequestTooLarge))
            }
            Err(IpcError::ConnectionClosed) => return,
            Err(e) => {
                debug!("dropping connection: {e}");
                return;
            }
        };

        if let Err(e) = IpcServer::send_response(&mut stream, &response).await {
            debug!("failed to answer client: {e}");
        }
    }
}

/// Accepts connections until `shutdown` is cancelled.
///
/// Each connection is handled on its own task; a failing connection never
/// stops the loop.
pub async fn serve(server: &IpcServer, handler: Arc<RequestHandler>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler.handle_connection(stream).await;
                    });
                }
                Err(e) => {
                    warn!("{e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    info!("control socket closed");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocker::MockProcessControl;
    use crate::config::AppConfig;
    use crate::notification::MockNotifier;
    use crate::storage::MemoryStore;
    use crate::types::{Phase, RunState, TimerConfig};

    // ------------------------------------------------------------------------
    // Helper functions
    // ------------------------------------------------------------------------

    fn create_temp_socket_path() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        (dir, path)
    }

    fn create_daemon() -> Arc<Daemon> {
        let config = AppConfig {
            block_enabled: false,
            ..AppConfig::default()
        };
        Daemon::builder(&config)
            .timer_config(TimerConfig::from_minutes(25, 5, 15, 4))
            .store(Arc::new(MemoryStore::new()))
            .notifier(Arc::new(MockNotifier::new()))
            .process_control(Arc::new(MockProcessControl::new()))
            .build()
    }

    async fn roundtrip(path: &Path, request: &[u8]) -> String {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = String::new();
        BufReader::new(stream).read_line(&mut response).await.unwrap();
        response
    }

    // ------------------------------------------------------------------------
    // IpcServer Tests
    // ------------------------------------------------------------------------

    mod ipc_server_tests {
        use super::*;

        #[tokio::test]
        async fn test_server_creation() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path);

            assert!(server.is_ok());
            assert!(socket_path.exists());
        }

        #[tokio::test]
        async fn test_server_removes_stale_socket() {
            let (_dir, socket_path) = create_temp_socket_path();
            std::fs::write(&socket_path, "dummy").unwrap();

            let server = IpcServer::new(&socket_path);

            assert!(server.is_ok());
        }

        #[tokio::test]
        async fn test_second_server_fails_fast() {
            let (_dir, socket_path) = create_temp_socket_path();
            let _first = IpcServer::new(&socket_path).unwrap();

            let second = IpcServer::new(&socket_path);

            assert!(matches!(second, Err(IpcError::AlreadyRunning(_))));
            assert!(socket_path.exists());
        }

        #[tokio::test]
        async fn test_server_creates_parent_directory() {
            let dir = tempfile::tempdir().unwrap();
            let socket_path = dir.path().join("subdir").join("test.sock");

            let server = IpcServer::new(&socket_path);

            assert!(server.is_ok());
            assert!(socket_path.parent().unwrap().exists());
        }

        #[tokio::test]
        async fn test_receive_request_line() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();

            let client_path = socket_path.clone();
            let client = tokio::spawn(async move {
                let mut stream = UnixStream::connect(&client_path).await.unwrap();
                stream.write_all(b"{\"action\":\"status\"}\n").await.unwrap();
                stream
            });

            let mut stream = server.accept().await.unwrap();
            let request = IpcServer::receive_request(&mut stream).await.unwrap();

            assert_eq!(request, br#"{"action":"status"}"#);
            drop(client.await.unwrap());
        }

        #[tokio::test]
        async fn test_receive_request_without_newline_at_eof() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();

            let client_path = socket_path.clone();
            tokio::spawn(async move {
                let mut stream = UnixStream::connect(&client_path).await.unwrap();
                stream.write_all(br#"{"action":"skip"}"#).await.unwrap();
                stream.shutdown().await.unwrap();
            });

            let mut stream = server.accept().await.unwrap();
            let request = IpcServer::receive_request(&mut stream).await.unwrap();

            assert_eq!(request, br#"{"action":"skip"}"#);
        }

        #[tokio::test]
        async fn test_receive_request_too_large() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();

            let client_path = socket_path.clone();
            let client = tokio::spawn(async move {
                let mut stream = UnixStream::connect(&client_path).await.unwrap();
                let _ = stream.write_all(&vec![b'x'; MAX_REQUEST_SIZE * 2]).await;
                stream
            });

            let mut stream = server.accept().await.unwrap();
            let result = IpcServer::receive_request(&mut stream).await;

            assert!(matches!(result, Err(IpcError::RequestTooLarge)));
            drop(stream);
            drop(client.await.unwrap());
        }

        #[tokio::test]
        async fn test_connection_closed() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();

            let client_path = socket_path.clone();
            tokio::spawn(async move {
                let stream = UnixStream::connect(&client_path).await.unwrap();
                drop(stream);
            });

            let mut stream = server.accept().await.unwrap();
            let result = IpcServer::receive_request(&mut stream).await;

            assert!(matches!(result, Err(IpcError::ConnectionClosed)));
        }

        #[tokio::test]
        async fn test_server_drop_cleanup() {
            let (_dir, socket_path) = create_temp_socket_path();

            {
                let server = IpcServer::new(&socket_path).unwrap();
                assert_eq!(server.socket_path(), socket_path);
            }

            assert!(!socket_path.exists());
        }

        #[test]
        fn test_ipc_error_display() {
            let err = IpcError::BindError("test error".to_string());
            assert_eq!(err.to_string(), "Failed to bind socket: test error");

            let err = IpcError::Timeout;
            assert_eq!(err.to_string(), "Operation timed out");

            let err = IpcError::RequestTooLarge;
            assert!(err.to_string().contains("4096"));
        }
    }

    // ------------------------------------------------------------------------
    // RequestHandler Tests
    // ------------------------------------------------------------------------

    mod request_handler_tests {
        use super::*;

        #[tokio::test]
        async fn test_handle_status() {
            let handler = RequestHandler::new(create_daemon());

            let response = handler.handle(br#"{"action":"status"}"#).await;

            assert!(response.success);
            let data = response.data.unwrap();
            assert_eq!(data.run_state, RunState::Idle);
            assert_eq!(data.phase, Phase::Work);
            assert_eq!(data.remaining, "25:00");
            assert_eq!(data.remaining_seconds, 1500);
            assert_eq!(data.week_values.len(), 7);
        }

        #[tokio::test]
        async fn test_handle_start() {
            let handler = RequestHandler::new(create_daemon());

            let response = handler.handle(br#"{"action":"start"}"#).await;

            assert!(response.success);
            assert_eq!(response.data.unwrap().run_state, RunState::Running);
        }

        #[tokio::test]
        async fn test_handle_alias() {
            let handler = RequestHandler::new(create_daemon());

            let response = handler.handle(br#"{"action":"toggle_always"}"#).await;

            assert!(response.data.unwrap().always_block);
        }

        #[tokio::test]
        async fn test_handle_unknown_action() {
            let handler = RequestHandler::new(create_daemon());

            let response = handler.handle(br#"{"action":"launch"}"#).await;

            assert!(!response.success);
            assert_eq!(response.error.as_deref(), Some("unknown action: launch"));
            assert!(response.data.is_none());
        }

        #[tokio::test]
        async fn test_handle_malformed_request() {
            let handler = RequestHandler::new(create_daemon());

            for raw in [&b"not valid json"[..], br#"{"command":"status"}"#, b"\xff\xfe"] {
                let response = handler.handle(raw).await;
                assert!(!response.success);
                assert!(response.error.unwrap().starts_with("invalid request"));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Serve Loop Tests
    // ------------------------------------------------------------------------

    mod serve_tests {
        use super::*;

        #[tokio::test]
        async fn test_full_ipc_flow() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();
            let handler = Arc::new(RequestHandler::new(create_daemon()));
            let shutdown = CancellationToken::new();

            let serve_shutdown = shutdown.clone();
            let serve_task = tokio::spawn(async move {
                serve(&server, handler, serve_shutdown).await;
            });

            let started = roundtrip(&socket_path, b"{\"action\":\"start\"}\n").await;
            let status = roundtrip(&socket_path, b"{\"action\":\"status\"}\n").await;
            let unknown = roundtrip(&socket_path, b"{\"action\":\"fly\"}\n").await;
            let garbage = roundtrip(&socket_path, b"]]\n").await;

            let started: IpcResponse = serde_json::from_str(&started).unwrap();
            let status: IpcResponse = serde_json::from_str(&status).unwrap();
            let unknown: IpcResponse = serde_json::from_str(&unknown).unwrap();
            let garbage: IpcResponse = serde_json::from_str(&garbage).unwrap();

            assert!(started.success);
            assert_eq!(status.data.unwrap().run_state, RunState::Running);
            assert_eq!(unknown.error.as_deref(), Some("unknown action: fly"));
            assert!(!garbage.success);

            shutdown.cancel();
            serve_task.await.unwrap();
            assert!(!socket_path.exists());
        }

        #[tokio::test]
        async fn test_silent_client_does_not_block_others() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();
            let handler = Arc::new(RequestHandler::new(create_daemon()));
            let shutdown = CancellationToken::new();

            let serve_shutdown = shutdown.clone();
            tokio::spawn(async move {
                serve(&server, handler, serve_shutdown).await;
            });

            let _silent = UnixStream::connect(&socket_path).await.unwrap();
            let response = tokio::time::timeout(
                Duration::from_secs(1),
                roundtrip(&socket_path, b"{\"action\":\"status\"}\n"),
            )
            .await
            .unwrap();

            assert!(response.ends_with('\n'));
            shutdown.cancel();
        }
    }
}
