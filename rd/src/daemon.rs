//! Daemon process lifecycle and the request-serving run loop
//!
//! The daemon is the only process that opens the roster store. It holds an
//! exclusive lock on the store directory, registers its PID for the CLI,
//! and serves typed requests over the IPC socket until SIGINT/SIGTERM or
//! an IPC shutdown request arrives.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use fs2::FileExt;
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::convo::{ConvoEngine, ConvoError, PromptCatalog, spawn_sweeper};
use crate::domain::{Resources, Session, SessionDetail, TimeWindow};
use crate::events::create_event_bus;
use crate::gateway::{ConsoleGateway, NotificationGateway, WhatsAppGateway};
use crate::ipc::{DaemonRequest, DaemonResponse, listener};
use crate::registry::SessionRegistry;

/// Daemon version, reported in the IPC pong
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Manages the daemon process through its PID file
pub struct DaemonManager {
    pid_path: PathBuf,
}

/// Snapshot of daemon liveness
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    pub fn new() -> Self {
        Self {
            pid_path: default_pid_path(),
        }
    }

    /// Use a specific PID file (tests)
    pub fn with_pid_path(pid_path: PathBuf) -> Self {
        Self { pid_path }
    }

    /// PID recorded in the PID file, if that process is still alive
    pub fn running_pid(&self) -> Option<u32> {
        let contents = fs::read_to_string(&self.pid_path).ok()?;
        let pid: u32 = contents.trim().parse().ok()?;
        if process_exists(pid) {
            debug!(pid, "running_pid: process alive");
            Some(pid)
        } else {
            debug!(pid, "running_pid: stale PID file");
            None
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_path.clone(),
        }
    }

    /// Spawn the daemon as a detached background process
    ///
    /// Re-executes the current binary with the hidden `run-daemon`
    /// subcommand; the child registers its own PID once it is up.
    pub fn start(&self) -> Result<u32> {
        debug!("DaemonManager::start: called");
        let exe = std::env::current_exe().context("Failed to locate current executable")?;
        let child = std::process::Command::new(exe)
            .arg("run-daemon")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .context("Failed to spawn daemon process")?;
        let pid = child.id();
        debug!(pid, "DaemonManager::start: daemon spawned");
        Ok(pid)
    }

    /// Send SIGTERM to the running daemon
    pub fn stop(&self) -> Result<()> {
        debug!("DaemonManager::stop: called");
        let pid = self
            .running_pid()
            .ok_or_else(|| eyre::eyre!("Daemon is not running"))?;
        let status = std::process::Command::new("kill")
            .arg(pid.to_string())
            .status()
            .context("Failed to run kill")?;
        if !status.success() {
            return Err(eyre::eyre!("kill exited with {} for PID {}", status, pid));
        }
        debug!(pid, "DaemonManager::stop: SIGTERM sent");
        Ok(())
    }

    /// Record the current process in the PID file
    pub fn register_self(&self) -> Result<()> {
        debug!(pid_path = ?self.pid_path, "DaemonManager::register_self: called");
        if let Some(parent) = self.pid_path.parent() {
            fs::create_dir_all(parent).context("Failed to create PID directory")?;
        }
        fs::write(&self.pid_path, std::process::id().to_string()).context("Failed to write PID file")?;
        Ok(())
    }

    /// Remove the PID file
    pub fn unregister(&self) {
        debug!(pid_path = ?self.pid_path, "DaemonManager::unregister: called");
        if let Err(e) = fs::remove_file(&self.pid_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(error = %e, "Failed to remove PID file");
        }
    }
}

fn default_pid_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rosterd")
        .join("rosterd.pid")
}

fn process_exists(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{}", pid)).exists()
}

/// Exclusive lock guaranteeing one daemon per store
///
/// Backed by an advisory file lock, so a crashed daemon releases it
/// automatically. Held for the whole daemon lifetime.
#[derive(Debug)]
pub struct InstanceLock {
    file: fs::File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        debug!(?path, "InstanceLock::acquire: called");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .context("Failed to open lock file")?;
        file.try_lock_exclusive()
            .map_err(|_| eyre::eyre!("Another rosterd instance holds the lock at {}", path.display()))?;
        debug!(?path, "InstanceLock::acquire: lock held");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        debug!(path = ?self.path, "InstanceLock::drop: releasing");
        let _ = FileExt::unlock(&self.file);
    }
}

/// Run the daemon: wire the components and serve until shutdown
pub async fn run(config: &Config) -> Result<()> {
    debug!("run: called");
    info!("Daemon starting...");

    // Early validation - fail fast with clear error messages
    config.validate()?;
    debug!("run: config validated");

    let data_dir = PathBuf::from(&config.store.data_dir);
    if !data_dir.exists() {
        debug!(?data_dir, "run: creating store directory");
        fs::create_dir_all(&data_dir).context("Failed to create store directory")?;
    }

    // One daemon per store
    let _lock = InstanceLock::acquire(&config.store.lock_path())?;
    info!("Instance lock acquired");

    let bus = create_event_bus();

    let registry = SessionRegistry::spawn(config.store.db_path(), &config.registry, bus.clone())?;
    info!("Session registry initialized");

    let gateway: Arc<dyn NotificationGateway> = match config.channel.provider.as_str() {
        "whatsapp" => Arc::new(WhatsAppGateway::from_config(&config.channel)?),
        _ => Arc::new(ConsoleGateway::new()),
    };
    info!("Notification gateway initialized ({})", config.channel.provider);

    let catalog = Arc::new(PromptCatalog::from_config(&config.prompts));

    let engine = ConvoEngine::spawn(registry.clone(), gateway, catalog, &config.conversation, bus.clone());

    let sweeper = spawn_sweeper(engine.clone(), &config.conversation);
    info!(
        "Expiry sweeper started (every {}s)",
        config.conversation.sweep_interval_secs
    );

    // Mirror domain events into the daemon log
    let mut events = bus.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    info!(
                        event = event.event_type(),
                        session = event.session_id(),
                        "roster event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event log fell behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (ipc_listener, socket_path) = listener::create_listener()?;
    info!(?socket_path, "IPC socket listening");

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let serve_handle = tokio::spawn(serve(
        ipc_listener,
        registry.clone(),
        engine.clone(),
        shutdown_tx.clone(),
    ));

    info!("Daemon running. Press Ctrl+C to stop.");

    // Signal handling
    debug!("run: setting up signal handlers");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    debug!("run: SIGHUP received");
                    // Prompt overrides are re-read on every render, so there
                    // is nothing to hot-swap; config changes need a restart
                    info!("SIGHUP received - prompt overrides apply per message, config changes need a restart");
                }
                _ = sigint.recv() => {
                    debug!("run: SIGINT received, initiating shutdown");
                    warn!("SIGINT received");
                    break;
                }
                _ = sigterm.recv() => {
                    debug!("run: SIGTERM received, initiating shutdown");
                    warn!("SIGTERM received");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    debug!("run: shutdown requested over IPC");
                    info!("Shutdown requested over IPC");
                    break;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("run: ctrl_c received, initiating shutdown");
            }
            _ = shutdown_rx.recv() => {
                debug!("run: shutdown requested over IPC");
            }
        }
    }

    info!("Daemon shutting down...");

    // Stop accepting requests, then drain the engine before the registry
    // it depends on
    serve_handle.abort();
    sweeper.abort();

    if let Err(e) = engine.shutdown().await {
        warn!(error = %e, "Engine shutdown error");
    }
    if let Err(e) = registry.shutdown().await {
        warn!(error = %e, "Registry shutdown error");
    }

    event_log.abort();
    listener::cleanup_socket(&socket_path);

    debug!("run: shutdown complete");
    Ok(())
}

/// Accept loop: one request/response per connection, served in order
async fn serve(
    ipc_listener: UnixListener,
    registry: SessionRegistry,
    engine: ConvoEngine,
    shutdown_tx: mpsc::Sender<()>,
) {
    debug!("serve: called");
    loop {
        match ipc_listener.accept().await {
            Ok((mut stream, _addr)) => {
                let request = match listener::read_request(&mut stream).await {
                    Ok(request) => request,
                    Err(e) => {
                        debug!(error = %e, "serve: unreadable request");
                        let response = DaemonResponse::Error { message: e.to_string() };
                        let _ = listener::send_response(&mut stream, response).await;
                        continue;
                    }
                };

                let is_shutdown = matches!(request, DaemonRequest::Shutdown);
                let response = handle_request(request, &registry, &engine).await;
                if let Err(e) = listener::send_response(&mut stream, response).await {
                    debug!(error = %e, "serve: failed to send response");
                }

                if is_shutdown {
                    debug!("serve: shutdown request handled, stopping accept loop");
                    let _ = shutdown_tx.send(()).await;
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "serve: accept failed");
                continue;
            }
        }
    }
}

/// Translate one IPC request into registry/engine calls
///
/// Domain failures come back as `Error` responses; only transport
/// problems surface as connection errors.
pub async fn handle_request(
    request: DaemonRequest,
    registry: &SessionRegistry,
    engine: &ConvoEngine,
) -> DaemonResponse {
    debug!(?request, "handle_request: called");
    match request {
        DaemonRequest::CreateSession {
            title,
            kind,
            fields,
            date,
            start,
            count,
            room,
            staff,
            created_by,
        } => {
            let detail = SessionDetail::from_kind_fields(kind, &fields);
            let window = TimeWindow::new(date, start, count);
            let session = Session::new(title, detail, window, Resources::new(room, staff), created_by);
            match registry.create_session(session).await {
                Ok(session) => DaemonResponse::Session { session },
                Err(e) => error_response(e),
            }
        }

        DaemonRequest::GetSession { id } => match registry.get_session(&id).await {
            Ok(session) => DaemonResponse::Session { session },
            Err(e) => error_response(e),
        },

        DaemonRequest::ListSessions {
            date,
            kind,
            state,
            resource,
        } => match registry.list_sessions(date, kind, state, resource).await {
            Ok(sessions) => DaemonResponse::Sessions { sessions },
            Err(e) => error_response(e),
        },

        DaemonRequest::ResetSession { id } => match registry.reset_confirmation(&id).await {
            Ok(session) => DaemonResponse::Session { session },
            Err(e) => error_response(e),
        },

        DaemonRequest::ProposeReschedule {
            session_id,
            date,
            start,
            count,
            room,
            staff,
            proposed_by,
        } => {
            // Omitted room and staff inherit the session's current
            // assignment, so a pure time move does not clear resources
            let resources = if room.is_none() && staff.is_empty() {
                match registry.get_session(&session_id).await {
                    Ok(session) => session.resources,
                    Err(e) => return error_response(e),
                }
            } else {
                Resources::new(room, staff)
            };
            let window = TimeWindow::new(date, start, count);
            match registry
                .propose_reschedule(&session_id, window, resources, &proposed_by)
                .await
            {
                Ok(proposal) => DaemonResponse::Proposal { proposal },
                Err(e) => error_response(e),
            }
        }

        DaemonRequest::ListProposals { session_id, status } => {
            match registry.list_proposals(session_id, status).await {
                Ok(proposals) => DaemonResponse::Proposals { proposals },
                Err(e) => error_response(e),
            }
        }

        DaemonRequest::ApproveReschedule { proposal_id } => match registry.approve_reschedule(&proposal_id).await {
            Ok(session) => DaemonResponse::Session { session },
            Err(e) => error_response(e),
        },

        DaemonRequest::RejectReschedule { proposal_id } => match registry.reject_reschedule(&proposal_id).await {
            Ok(session) => DaemonResponse::Session { session },
            Err(e) => error_response(e),
        },

        DaemonRequest::StartConversation {
            session_id,
            staff_id,
            staff_name,
            phone,
        } => match engine.start_conversation(&session_id, &staff_id, &staff_name, &phone).await {
            Ok(conversation) => DaemonResponse::Conversation { conversation },
            Err(e) => convo_error_response(e),
        },

        DaemonRequest::InboundReply { phone, text } => match engine.on_reply(&phone, &text).await {
            Ok(conversation) => DaemonResponse::Conversation { conversation },
            Err(e) => convo_error_response(e),
        },

        DaemonRequest::Redeliver { conversation_id } => match engine.redeliver(&conversation_id).await {
            Ok(conversation) => DaemonResponse::Conversation { conversation },
            Err(e) => convo_error_response(e),
        },

        DaemonRequest::ListConversations {
            phone,
            staff_id,
            session_id,
            active,
        } => match registry.list_conversations(phone, staff_id, session_id, active).await {
            Ok(conversations) => DaemonResponse::Conversations { conversations },
            Err(e) => error_response(e),
        },

        DaemonRequest::SweepNow => match engine.sweep_expired().await {
            Ok(cancelled) => DaemonResponse::Swept { cancelled },
            Err(e) => convo_error_response(e),
        },

        DaemonRequest::Ping => DaemonResponse::Pong {
            version: VERSION.to_string(),
        },

        // The accept loop triggers the actual shutdown after responding
        DaemonRequest::Shutdown => DaemonResponse::Ok,
    }
}

fn error_response(e: crate::registry::RegistryError) -> DaemonResponse {
    debug!(error = %e, "error_response: registry error");
    DaemonResponse::Error { message: e.to_string() }
}

fn convo_error_response(e: ConvoError) -> DaemonResponse {
    debug!(error = %e, "convo_error_response: conversation error");
    DaemonResponse::Error { message: e.to_string() }
}
