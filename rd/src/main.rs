//! Rosterd - conflict-checked session roster with staff confirmations
//!
//! CLI entry point for managing the daemon, sessions, reschedule
//! proposals, and confirmation conversations.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use rosterd::cli::{
    Cli, Command, ConvoCommand, DaemonCommand, OutputFormat, RescheduleCommand, SessionCommand, generate_after_help,
    get_log_path,
};
use rosterd::config::Config;
use rosterd::daemon::{self, DaemonManager};
use rosterd::domain::{ConfirmState, Conversation, ProposalStatus, RescheduleProposal, Session};
use rosterd::ipc::{DaemonClient, DaemonRequest, DaemonResponse};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rosterd")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = if let Some(s) = level_str {
        match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        }
    } else {
        tracing::Level::INFO
    };

    // Appended, not truncated: the daemon and short-lived CLI invocations
    // share this file
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("rosterd.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Build command with dynamic after_help that shows daemon status
    let cmd = Cli::command().after_help(generate_after_help());

    // Parse CLI arguments using the modified command
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Dispatch command
    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Daemon { command } => match command {
            DaemonCommand::Start { foreground } => cmd_start(&config, foreground).await,
            DaemonCommand::Stop => cmd_stop().await,
            DaemonCommand::Status { format } => cmd_status(format).await,
            DaemonCommand::Ping => cmd_ping().await,
        },
        Command::RunDaemon => cmd_run_daemon(&config).await,
        Command::Session { command } => cmd_session(command).await,
        Command::Reschedule { command } => cmd_reschedule(command).await,
        Command::Convo { command } => cmd_convo(command).await,
        Command::Logs { follow, lines } => cmd_logs(follow, lines).await,
    }
}

/// Start the daemon
async fn cmd_start(config: &Config, foreground: bool) -> Result<()> {
    debug!(foreground, "cmd_start: called");
    let manager = DaemonManager::new();

    if manager.is_running() {
        if let Some(pid) = manager.running_pid() {
            println!("rosterd is already running (PID: {})", pid);
        } else {
            println!("rosterd is already running");
        }
        return Ok(());
    }

    if foreground {
        debug!("cmd_start: starting in foreground mode");
        println!("Starting rosterd in foreground mode...");
        manager.register_self()?;
        let result = daemon::run(config).await;
        manager.unregister();
        result
    } else {
        debug!("cmd_start: starting in background mode");
        let pid = manager.start()?;
        println!("rosterd started (PID: {})", pid);
        Ok(())
    }
}

/// Run as the daemon process (internal command)
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    debug!("cmd_run_daemon: called");
    let manager = DaemonManager::new();
    manager.register_self()?;

    let result = daemon::run(config).await;
    manager.unregister();
    result
}

/// Stop the daemon
///
/// Tries IPC shutdown first for a graceful stop, falls back to SIGTERM
/// if IPC fails.
async fn cmd_stop() -> Result<()> {
    debug!("cmd_stop: called");
    let manager = DaemonManager::new();

    if !manager.is_running() {
        println!("rosterd is not running");
        return Ok(());
    }

    let pid = manager.running_pid();

    let client = DaemonClient::new();
    if client.socket_exists() {
        debug!("cmd_stop: trying IPC shutdown");
        match client.shutdown().await {
            Ok(()) => {
                // Wait for the process to exit
                let mut attempts = 0;
                while manager.is_running() && attempts < 50 {
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    attempts += 1;
                }
                if !manager.is_running() {
                    if let Some(pid) = pid {
                        println!("rosterd stopped gracefully via IPC (was PID: {})", pid);
                    } else {
                        println!("rosterd stopped gracefully via IPC");
                    }
                    return Ok(());
                }
                debug!("cmd_stop: IPC shutdown timed out, falling back to SIGTERM");
            }
            Err(e) => {
                debug!(error = %e, "cmd_stop: IPC shutdown failed, falling back to SIGTERM");
            }
        }
    }

    debug!("cmd_stop: using SIGTERM");
    manager.stop()?;
    if let Some(pid) = pid {
        println!("rosterd stopped (was PID: {})", pid);
    } else {
        println!("rosterd stopped");
    }
    Ok(())
}

/// Ping the daemon via IPC to check if it's alive and responsive
async fn cmd_ping() -> Result<()> {
    debug!("cmd_ping: called");
    let manager = DaemonManager::new();
    if !manager.is_running() {
        println!("rosterd is not running");
        return Ok(());
    }

    let client = DaemonClient::new();
    if !client.socket_exists() {
        println!("Daemon PID file exists but IPC socket not found");
        println!("The daemon may be starting up or in an inconsistent state");
        return Ok(());
    }

    match client.ping().await {
        Ok(version) => {
            println!("Daemon is alive and responsive");
            println!("Version: {}", version);
        }
        Err(e) => {
            println!("Daemon PID file exists but not responding to IPC");
            println!("Error: {}", e);
            println!("The daemon may be hung or the IPC socket may be stale");
        }
    }

    Ok(())
}

/// Show daemon status
async fn cmd_status(format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let manager = DaemonManager::new();
    let status = manager.status();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "pid_file": status.pid_file.to_string_lossy()
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!("rosterd Status");
            println!("--------------");
            if status.running {
                println!("Status: {}", "running".green());
                if let Some(pid) = status.pid {
                    println!("PID: {}", pid);
                }
            } else {
                println!("Status: {}", "stopped".red());
            }
            println!("PID file: {}", status.pid_file.display());
        }
    }

    Ok(())
}

/// Handle session management commands
async fn cmd_session(command: SessionCommand) -> Result<()> {
    debug!(?command, "cmd_session: called");
    let client = DaemonClient::new();

    match command {
        SessionCommand::Create {
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
            let request = DaemonRequest::CreateSession {
                title,
                kind,
                fields: fields.into_iter().collect(),
                date,
                start,
                count,
                room,
                staff,
                created_by,
            };
            match client.request(request).await? {
                DaemonResponse::Session { session } => {
                    println!("{} session {}", "Created".green(), session.id);
                    print_session(&session);
                    Ok(())
                }
                other => fail(other),
            }
        }
        SessionCommand::Get { id } => match client.request(DaemonRequest::GetSession { id }).await? {
            DaemonResponse::Session { session } => {
                print_session(&session);
                Ok(())
            }
            other => fail(other),
        },
        SessionCommand::List {
            date,
            kind,
            state,
            resource,
            format,
        } => {
            let state = state.as_deref().map(parse_confirm_state).transpose()?;
            let request = DaemonRequest::ListSessions {
                date,
                kind,
                state,
                resource,
            };
            match client.request(request).await? {
                DaemonResponse::Sessions { sessions } => print_sessions(&sessions, format),
                other => fail(other),
            }
        }
        SessionCommand::Reset { id } => match client.request(DaemonRequest::ResetSession { id }).await? {
            DaemonResponse::Session { session } => {
                println!("Confirmation cycle restarted for {}", session.id);
                print_session(&session);
                Ok(())
            }
            other => fail(other),
        },
    }
}

/// Handle reschedule proposal commands
async fn cmd_reschedule(command: RescheduleCommand) -> Result<()> {
    debug!(?command, "cmd_reschedule: called");
    let client = DaemonClient::new();

    match command {
        RescheduleCommand::Propose {
            session_id,
            date,
            start,
            count,
            room,
            staff,
            proposed_by,
        } => {
            let request = DaemonRequest::ProposeReschedule {
                session_id,
                date,
                start,
                count,
                room,
                staff,
                proposed_by,
            };
            match client.request(request).await? {
                DaemonResponse::Proposal { proposal } => {
                    println!("{} proposal {}", "Filed".green(), proposal.id);
                    print_proposal(&proposal);
                    Ok(())
                }
                other => fail(other),
            }
        }
        RescheduleCommand::Approve { proposal_id } => {
            match client.request(DaemonRequest::ApproveReschedule { proposal_id }).await? {
                DaemonResponse::Session { session } => {
                    println!("{} - session moved to {}", "Approved".green(), session.window);
                    print_session(&session);
                    Ok(())
                }
                other => fail(other),
            }
        }
        RescheduleCommand::Reject { proposal_id } => {
            match client.request(DaemonRequest::RejectReschedule { proposal_id }).await? {
                DaemonResponse::Session { session } => {
                    println!(
                        "{} - session stays at {}, confirmation reopened",
                        "Rejected".yellow(),
                        session.window
                    );
                    Ok(())
                }
                other => fail(other),
            }
        }
        RescheduleCommand::List { session, status, format } => {
            let status = status.as_deref().map(parse_proposal_status).transpose()?;
            let request = DaemonRequest::ListProposals {
                session_id: session,
                status,
            };
            match client.request(request).await? {
                DaemonResponse::Proposals { proposals } => print_proposals(&proposals, format),
                other => fail(other),
            }
        }
    }
}

/// Handle conversation commands
async fn cmd_convo(command: ConvoCommand) -> Result<()> {
    debug!(?command, "cmd_convo: called");
    let client = DaemonClient::new();

    match command {
        ConvoCommand::Start {
            session_id,
            staff_id,
            staff_name,
            phone,
        } => {
            let request = DaemonRequest::StartConversation {
                session_id,
                staff_id,
                staff_name,
                phone,
            };
            match client.request(request).await? {
                DaemonResponse::Conversation { conversation } => {
                    println!("{} conversation {}", "Started".green(), conversation.id);
                    print_conversation(&conversation);
                    Ok(())
                }
                other => fail(other),
            }
        }
        ConvoCommand::Reply { phone, text } => {
            match client.request(DaemonRequest::InboundReply { phone, text }).await? {
                DaemonResponse::Conversation { conversation } => {
                    println!("Reply accepted; conversation now {}", conversation.state);
                    Ok(())
                }
                other => fail(other),
            }
        }
        ConvoCommand::Redeliver { conversation_id } => {
            match client.request(DaemonRequest::Redeliver { conversation_id }).await? {
                DaemonResponse::Conversation { conversation } => {
                    println!("{} last prompt for {}", "Re-sent".green(), conversation.id);
                    Ok(())
                }
                other => fail(other),
            }
        }
        ConvoCommand::List {
            phone,
            staff,
            session,
            active,
            format,
        } => {
            let request = DaemonRequest::ListConversations {
                phone,
                staff_id: staff,
                session_id: session,
                active,
            };
            match client.request(request).await? {
                DaemonResponse::Conversations { conversations } => print_conversations(&conversations, format),
                other => fail(other),
            }
        }
        ConvoCommand::Sweep => match client.request(DaemonRequest::SweepNow).await? {
            DaemonResponse::Swept { cancelled } => {
                println!("Swept {} expired conversation(s)", cancelled);
                Ok(())
            }
            other => fail(other),
        },
    }
}

/// Show logs
async fn cmd_logs(follow: bool, lines: usize) -> Result<()> {
    debug!(follow, lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        println!("The daemon may not have been started yet.");
        return Ok(());
    }

    if follow {
        println!("Following log file: {} (Ctrl+C to stop)", log_path.display());
        println!();

        // Use tail -f for following
        let mut child = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&log_path)
            .spawn()
            .context("Failed to run tail -f")?;

        child.wait()?;
    } else {
        // Read last N lines
        let file = fs::File::open(&log_path).context("Failed to open log file")?;
        let reader = BufReader::new(file);
        let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

        let start = if all_lines.len() > lines { all_lines.len() - lines } else { 0 };

        for line in &all_lines[start..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Print a daemon error and exit nonzero; bail on a protocol mismatch
fn fail(response: DaemonResponse) -> Result<()> {
    match response {
        DaemonResponse::Error { message } => {
            eprintln!("{} {}", "Error:".red(), message);
            std::process::exit(1);
        }
        other => Err(eyre::eyre!("Unexpected daemon response: {other:?}")),
    }
}

fn parse_confirm_state(s: &str) -> Result<ConfirmState> {
    match s.to_lowercase().as_str() {
        "not_confirmed" => Ok(ConfirmState::NotConfirmed),
        "confirmed" => Ok(ConfirmState::Confirmed),
        "declined" => Ok(ConfirmState::Declined),
        "waiting_reschedule" => Ok(ConfirmState::WaitingReschedule),
        _ => Err(eyre::eyre!(
            "Invalid state '{}'. Valid: not_confirmed, confirmed, declined, waiting_reschedule",
            s
        )),
    }
}

fn parse_proposal_status(s: &str) -> Result<ProposalStatus> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(ProposalStatus::Pending),
        "approved" => Ok(ProposalStatus::Approved),
        "rejected" => Ok(ProposalStatus::Rejected),
        _ => Err(eyre::eyre!("Invalid status '{}'. Valid: pending, approved, rejected", s)),
    }
}

fn colored_state(state: &ConfirmState) -> colored::ColoredString {
    match state {
        ConfirmState::Confirmed => state.to_string().green(),
        ConfirmState::Declined => state.to_string().red(),
        ConfirmState::WaitingReschedule => state.to_string().yellow(),
        ConfirmState::NotConfirmed => state.to_string().normal(),
    }
}

fn print_session(session: &Session) {
    println!("ID:      {}", session.id);
    println!("Title:   {}", session.title);
    println!("Kind:    {}", session.kind());
    println!("When:    {}", session.window);
    println!("Room:    {}", session.resources.room.as_deref().unwrap_or("-"));
    println!("Staff:   {}", session.resources.staff.join(", "));
    println!("State:   {}", colored_state(&session.confirm_state));
    if let Some(reschedule) = &session.reschedule_state {
        println!("Resched: {}", reschedule);
    }
    if let Some(reason) = &session.reason {
        println!("Reason:  {}", reason);
    }
}

fn print_sessions(sessions: &[Session], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(sessions)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            if sessions.is_empty() {
                println!("No sessions found");
                return Ok(());
            }
            println!("{:<36} {:<16} {:<22} {:<20} TITLE", "ID", "KIND", "WHEN", "STATE");
            println!("{}", "-".repeat(110));
            for session in sessions {
                println!(
                    "{:<36} {:<16} {:<22} {:<20} {}",
                    session.id,
                    session.kind().to_string(),
                    session.window.to_string(),
                    session.confirm_state.to_string(),
                    session.title
                );
            }
        }
    }
    Ok(())
}

fn print_proposal(proposal: &RescheduleProposal) {
    println!("ID:       {}", proposal.id);
    println!("Session:  {}", proposal.session_id);
    println!("When:     {}", proposal.window);
    println!("Room:     {}", proposal.resources.room.as_deref().unwrap_or("-"));
    println!("Staff:    {}", proposal.resources.staff.join(", "));
    println!("Status:   {}", proposal.status);
    println!("By:       {}", proposal.proposed_by);
}

fn print_proposals(proposals: &[RescheduleProposal], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(proposals)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            if proposals.is_empty() {
                println!("No proposals found");
                return Ok(());
            }
            println!("{:<40} {:<36} {:<22} STATUS", "ID", "SESSION", "WHEN");
            println!("{}", "-".repeat(110));
            for proposal in proposals {
                println!(
                    "{:<40} {:<36} {:<22} {}",
                    proposal.id,
                    proposal.session_id,
                    proposal.window.to_string(),
                    proposal.status
                );
            }
        }
    }
    Ok(())
}

fn print_conversation(conversation: &Conversation) {
    println!("ID:       {}", conversation.id);
    println!("Staff:    {}", conversation.staff_id);
    println!("Session:  {}", conversation.session_id);
    println!("Phone:    {}", conversation.phone);
    println!("State:    {}", conversation.state);
    if let Some(prompt) = &conversation.last_prompt {
        println!("Prompt:   {}", prompt.template_id);
    }
}

fn print_conversations(conversations: &[Conversation], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(conversations)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            if conversations.is_empty() {
                println!("No conversations found");
                return Ok(());
            }
            println!("{:<42} {:<16} {:<16} STATE", "ID", "STAFF", "PHONE");
            println!("{}", "-".repeat(100));
            for conversation in conversations {
                println!(
                    "{:<42} {:<16} {:<16} {}",
                    conversation.id,
                    conversation.staff_id,
                    conversation.phone,
                    conversation.state
                );
            }
        }
    }
    Ok(())
}
