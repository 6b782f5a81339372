//! IPC client for communicating with the daemon
//!
//! Used by every CLI subcommand except `serve`. One request, one
//! response, one connection.

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::get_socket_path;
use super::messages::{DaemonRequest, DaemonResponse};

/// Default timeout for IPC operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum request size on the wire
const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Maximum response size; listings of a day's roster fit well under this
const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

/// Client for communicating with the daemon via IPC
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonClient {
    /// Create a new client with the default socket path
    pub fn new() -> Self {
        Self {
            socket_path: get_socket_path(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a client with a custom socket path (for testing)
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the daemon socket exists
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Check if the daemon is alive and get its version
    pub async fn ping(&self) -> Result<String> {
        debug!("DaemonClient: pinging daemon");
        let response = self.request(DaemonRequest::Ping).await?;
        match response {
            DaemonResponse::Pong { version } => Ok(version),
            DaemonResponse::Error { message } => Err(eyre::eyre!("Daemon error: {}", message)),
            _ => Err(eyre::eyre!("Unexpected response")),
        }
    }

    /// Request daemon to shutdown gracefully
    pub async fn shutdown(&self) -> Result<()> {
        debug!("DaemonClient: requesting daemon shutdown");
        let response = self.request(DaemonRequest::Shutdown).await?;
        match response {
            DaemonResponse::Ok => Ok(()),
            DaemonResponse::Error { message } => Err(eyre::eyre!("Daemon error: {}", message)),
            _ => Err(eyre::eyre!("Unexpected response")),
        }
    }

    /// Send a request to the daemon and wait for the response
    pub async fn request(&self, request: DaemonRequest) -> Result<DaemonResponse> {
        debug!(?self.socket_path, ?request, "DaemonClient: sending request");

        let stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to daemon socket - is the daemon running?")?;

        self.request_on_stream(stream, request).await
    }

    /// Send a request on an existing stream (extracted for testing)
    async fn request_on_stream(&self, mut stream: UnixStream, request: DaemonRequest) -> Result<DaemonResponse> {
        let request_json = serde_json::to_string(&request).context("Failed to serialize request")?;

        if request_json.len() > MAX_REQUEST_SIZE {
            return Err(eyre::eyre!("Request too large: {} bytes", request_json.len()));
        }

        tokio::time::timeout(self.timeout, async {
            stream
                .write_all(request_json.as_bytes())
                .await
                .context("Failed to write request")?;
            stream.write_all(b"\n").await.context("Failed to write newline")?;
            stream.flush().await.context("Failed to flush stream")?;
            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Write timeout")??;

        let mut reader = BufReader::new(&mut stream);
        let mut response_line = String::new();

        tokio::time::timeout(self.timeout, async {
            let bytes_read = reader
                .read_line(&mut response_line)
                .await
                .context("Failed to read response")?;

            if bytes_read > MAX_RESPONSE_SIZE {
                return Err(eyre::eyre!("Response too large: {} bytes", bytes_read));
            }

            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Read timeout")??;

        let response: DaemonResponse =
            serde_json::from_str(response_line.trim()).context("Failed to parse daemon response")?;

        debug!(?response, "DaemonClient: received response");
        Ok(response)
    }
}
