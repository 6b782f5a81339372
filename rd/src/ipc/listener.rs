//! IPC listener for the daemon side
//!
//! Helpers for creating and managing the Unix domain socket listener.
//! The accept loop itself lives in the daemon, which dispatches each
//! request against the registry and engine.

use std::path::PathBuf;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::get_socket_path;
use super::messages::{DaemonRequest, DaemonResponse};

/// Maximum request size; anything bigger is garbage or abuse
const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Create and bind a Unix domain socket listener for the daemon
///
/// Handles cleanup of stale socket files from previous runs.
pub fn create_listener() -> Result<(UnixListener, PathBuf)> {
    let socket_path = get_socket_path();
    create_listener_at(&socket_path)
}

/// Create a listener at a specific path (for testing)
pub fn create_listener_at(socket_path: &PathBuf) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener: creating IPC socket");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    // Clean up stale socket if exists
    if socket_path.exists() {
        debug!(?socket_path, "create_listener: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind IPC socket")?;
    debug!(?socket_path, "create_listener: socket bound successfully");

    Ok((listener, socket_path.clone()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &PathBuf) {
    if socket_path.exists() {
        debug!(?socket_path, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}

/// Read one request line from a connection
pub async fn read_request(stream: &mut UnixStream) -> Result<DaemonRequest> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    let bytes_read = reader
        .read_line(&mut line)
        .await
        .context("Failed to read IPC request")?;

    if bytes_read > MAX_REQUEST_SIZE {
        return Err(eyre::eyre!("Request too large: {} bytes", bytes_read));
    }

    if line.is_empty() {
        return Err(eyre::eyre!("Empty request received"));
    }

    let request: DaemonRequest = serde_json::from_str(line.trim()).context("Failed to parse IPC request")?;
    debug!(?request, "read_request: parsed request");

    Ok(request)
}

/// Send a response on the stream
pub async fn send_response(stream: &mut UnixStream, response: DaemonResponse) -> Result<()> {
    let response_json = serde_json::to_string(&response).context("Failed to serialize response")?;
    stream
        .write_all(response_json.as_bytes())
        .await
        .context("Failed to write response")?;
    stream.write_all(b"\n").await.context("Failed to write newline")?;
    stream.flush().await.context("Failed to flush response")?;
    debug!(?response, "send_response: sent response");
    Ok(())
}
