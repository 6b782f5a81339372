//! Inter-process communication between the CLI and the daemon
//!
//! JSON-over-newline protocol on a Unix domain socket. The daemon is the
//! only process that touches the store; every CLI subcommand besides
//! `serve` turns into one request over this socket and one response back.

use std::path::PathBuf;

pub mod client;
pub mod listener;
pub mod messages;

pub use client::DaemonClient;
pub use messages::{DaemonRequest, DaemonResponse};

/// Get the socket path for daemon IPC
pub fn get_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rosterd")
        .join("rosterd.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_ends_with_rosterd_sock() {
        let path = get_socket_path();
        assert!(path.ends_with("rosterd/rosterd.sock"));
    }
}
