//! IPC Client for communicating with the Tomato daemon.
//!
//! This module provides:
//! - Unix Domain Socket client, one request per connection
//! - Newline-delimited JSON request/response handling
//! - Connection retry logic
//! - Timeout handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::config::default_socket_path;
use crate::types::{Action, IpcRequest, IpcResponse, StatusPayload};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 2;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum response size in bytes (64KB)
const MAX_RESPONSE_SIZE: u64 = 65536;

/// Default connection attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 200;

/// Returned when nothing answers on the control socket.
#[derive(Debug, thiserror::Error)]
#[error("daemon not running")]
pub struct DaemonNotRunning;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
    /// Connection attempts before giving up
    retries: u32,
}

impl IpcClient {
    /// Creates a new IPC client with the default socket path.
    pub fn new() -> Self {
        Self::with_socket_path(default_socket_path())
    }

    /// Creates a new IPC client with a custom socket path.
    pub fn with_socket_path(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            retries: MAX_RETRIES,
        }
    }

    /// Sets the number of connection attempts (at least one).
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends `action` and returns the resulting status.
    ///
    /// Error responses from the daemon become errors carrying the daemon's
    /// message.
    pub async fn send(&self, action: Action) -> Result<StatusPayload> {
        let response = self.request(&IpcRequest::new(action)).await?;
        if !response.success {
            anyhow::bail!(
                "{}",
                response.error.unwrap_or_else(|| "request failed".to_string())
            );
        }
        response
            .data
            .context("daemon response is missing the status payload")
    }

    /// Sends a raw request and returns the daemon's response as-is.
    pub async fn request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut stream = self.connect_with_retry().await?;

        let mut line =
            serde_json::to_vec(request).context("failed to serialize request")?;
        line.push(b'\n');

        timeout(Duration::from_secs(IO_TIMEOUT_SECS), stream.write_all(&line))
            .await
            .context("write timed out")?
            .context("failed to send request")?;

        let mut reader = BufReader::new(stream).take(MAX_RESPONSE_SIZE);
        let mut buffer = Vec::new();
        let n = timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            reader.read_until(b'\n', &mut buffer),
        )
        .await
        .context("read timed out")?
        .context("failed to receive response")?;

        if n == 0 {
            anyhow::bail!("daemon closed the connection without answering");
        }

        serde_json::from_slice(&buffer).context("failed to parse response")
    }

    /// Connects, retrying with a growing delay.
    async fn connect_with_retry(&self) -> Result<UnixStream> {
        for attempt in 1..=self.retries {
            match timeout(self.timeout, UnixStream::connect(&self.socket_path)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    tracing::debug!("connect failed (attempt {}/{}): {}", attempt, self.retries, e)
                }
                Err(_) => {
                    tracing::debug!("connect timed out (attempt {}/{})", attempt, self.retries)
                }
            }

            if attempt < self.retries {
                let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                tokio::time::sleep(delay).await;
            }
        }

        Err(DaemonNotRunning.into())
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
