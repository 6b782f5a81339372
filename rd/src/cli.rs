//! CLI command definitions and subcommands

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::SessionKind;

/// Rosterd - academic session confirmation daemon
#[derive(Parser)]
#[command(
    name = "rd",
    about = "Conflict-checked session roster with staff confirmations over WhatsApp",
    version,
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the rosterd daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Internal: Run as daemon process (used by `daemon start`)
    #[command(hide = true)]
    RunDaemon,

    /// Manage roster sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Manage reschedule proposals
    Reschedule {
        #[command(subcommand)]
        command: RescheduleCommand,
    },

    /// Manage confirmation conversations
    Convo {
        #[command(subcommand)]
        command: ConvoCommand,
    },

    /// Show daemon logs
    Logs {
        /// Follow log output (like tail -f)
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

/// Daemon management subcommands
#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon
    Start {
        /// Don't fork to background (run in foreground)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the daemon
    Stop,

    /// Check daemon status
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Ping the daemon to check if it's alive and responsive
    Ping,
}

/// Session management subcommands
#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Create a session (rejected if the schedule clashes)
    Create {
        /// Session title
        #[arg(long)]
        title: String,

        /// Session kind (pbl, csr, large_lecture, practicum, journal_reading, other_non_block)
        #[arg(long)]
        kind: SessionKind,

        /// Kind-specific field, repeatable (block=12, group=A, course=..., lab=..., activity=...)
        #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        fields: Vec<(String, String)>,

        /// Session date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Start time (HH:MM)
        #[arg(long, value_parser = parse_clock)]
        start: NaiveTime,

        /// Number of consecutive teaching units
        #[arg(long, default_value = "1")]
        count: u32,

        /// Room id
        #[arg(long)]
        room: Option<String>,

        /// Staff id, repeatable
        #[arg(long = "staff", value_name = "ID")]
        staff: Vec<String>,

        /// Admin recording the session
        #[arg(long = "by", default_value = "admin")]
        created_by: String,
    },

    /// Show one session
    Get {
        /// Session ID
        id: String,
    },

    /// List sessions
    List {
        /// Filter by date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Filter by kind
        #[arg(long)]
        kind: Option<SessionKind>,

        /// Filter by confirmation state (not_confirmed, confirmed, declined, waiting_reschedule)
        #[arg(long)]
        state: Option<String>,

        /// Filter by a room or staff id
        #[arg(long)]
        resource: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Restart the confirmation cycle for a session
    Reset {
        /// Session ID
        id: String,
    },
}

/// Reschedule proposal subcommands
#[derive(Debug, Subcommand)]
pub enum RescheduleCommand {
    /// File a reschedule proposal for a session
    Propose {
        /// Session ID
        session_id: String,

        /// Proposed date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Proposed start time (HH:MM)
        #[arg(long, value_parser = parse_clock)]
        start: NaiveTime,

        /// Number of consecutive teaching units
        #[arg(long, default_value = "1")]
        count: u32,

        /// Room id (omit with --staff to keep the session's assignment)
        #[arg(long)]
        room: Option<String>,

        /// Staff id, repeatable
        #[arg(long = "staff", value_name = "ID")]
        staff: Vec<String>,

        /// Admin filing the proposal
        #[arg(long = "by", default_value = "admin")]
        proposed_by: String,
    },

    /// Approve a pending proposal and move the session
    Approve {
        /// Proposal ID
        proposal_id: String,
    },

    /// Reject a pending proposal
    Reject {
        /// Proposal ID
        proposal_id: String,
    },

    /// List proposals
    List {
        /// Filter by session ID
        #[arg(long)]
        session: Option<String>,

        /// Filter by status (pending, approved, rejected)
        #[arg(long)]
        status: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Confirmation conversation subcommands
#[derive(Debug, Subcommand)]
pub enum ConvoCommand {
    /// Open a confirmation dialogue with a staff member
    Start {
        /// Session ID
        session_id: String,

        /// Staff id of the addressee
        #[arg(long)]
        staff_id: String,

        /// Staff display name (used in the prompt text)
        #[arg(long)]
        staff_name: String,

        /// Phone number in international digits
        #[arg(long)]
        phone: String,
    },

    /// Feed an inbound reply to the engine (webhook stand-in)
    Reply {
        /// Sender phone number
        #[arg(long)]
        phone: String,

        /// Message text
        text: String,
    },

    /// Re-send the stored prompt of a conversation
    Redeliver {
        /// Conversation ID
        conversation_id: String,
    },

    /// List conversations
    List {
        /// Filter by phone number
        #[arg(long)]
        phone: Option<String>,

        /// Filter by staff id
        #[arg(long)]
        staff: Option<String>,

        /// Filter by session ID
        #[arg(long)]
        session: Option<String>,

        /// Only active (true) or only closed (false) conversations
        #[arg(long)]
        active: Option<bool>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Cancel expired conversations now instead of waiting for the sweeper
    Sweep,
}

/// Parse a KEY=VALUE argument
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    debug!(%s, "parse_key_val: called");
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid KEY=VALUE pair: '{}'", s)),
    }
}

/// Parse a clock time, seconds optional
fn parse_clock(s: &str) -> Result<NaiveTime, String> {
    debug!(%s, "parse_clock: called");
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| format!("invalid time '{}', expected HH:MM", s))
}

/// Check if the daemon is running (lightweight check for help display)
pub fn is_daemon_running() -> bool {
    debug!("is_daemon_running: called");
    // Same path logic as daemon.rs:default_pid_path()
    let pid_file = dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rosterd")
        .join("rosterd.pid");

    if !pid_file.exists() {
        debug!(?pid_file, "is_daemon_running: pid file does not exist");
        return false;
    }

    if let Ok(contents) = std::fs::read_to_string(&pid_file)
        && let Ok(pid) = contents.trim().parse::<u32>()
    {
        let exists = PathBuf::from(format!("/proc/{}", pid)).exists();
        debug!(pid, exists, "is_daemon_running: checked process existence");
        return exists;
    }

    debug!("is_daemon_running: could not read or parse pid file");
    false
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rosterd")
        .join("logs")
        .join("rosterd.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with daemon status
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let daemon_running = is_daemon_running();
    let log_path = get_log_path();

    let mut help = String::new();

    help.push_str("Daemon:\n");
    let daemon_icon = if daemon_running { "\u{2705}" } else { "\u{274C}" };
    let daemon_status = if daemon_running { "running" } else { "stopped" };
    help.push_str(&format!("  {} {}\n", daemon_icon, daemon_status));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", log_path.display()));

    debug!("generate_after_help: returning help text");
    help
}

/// Output format for status/list commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {}. Use: text, json, or table", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_declaration() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("block=12").unwrap(),
            ("block".to_string(), "12".to_string())
        );
        assert_eq!(parse_key_val("group=A=B").unwrap(), ("group".to_string(), "A=B".to_string()));
        assert!(parse_key_val("no-equals").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(
            parse_clock("07:20").unwrap(),
            NaiveTime::from_hms_opt(7, 20, 0).unwrap()
        );
        assert_eq!(
            parse_clock("13:40:00").unwrap(),
            NaiveTime::from_hms_opt(13, 40, 0).unwrap()
        );
        assert!(parse_clock("7am").is_err());
    }

    #[test]
    fn test_parse_session_create() {
        let cli = Cli::parse_from([
            "rd", "session", "create", "--title", "PBL Blok 12 Grup A", "--kind", "pbl", "--field", "block=12",
            "--field", "group=A", "--date", "2024-01-15", "--start", "07:20", "--count", "2", "--room", "R-101",
            "--staff", "stf-ana",
        ]);

        match cli.command {
            Command::Session {
                command:
                    SessionCommand::Create {
                        title,
                        kind,
                        fields,
                        count,
                        staff,
                        ..
                    },
            } => {
                assert_eq!(title, "PBL Blok 12 Grup A");
                assert_eq!(kind, SessionKind::Pbl);
                assert_eq!(fields.len(), 2);
                assert_eq!(count, 2);
                assert_eq!(staff, vec!["stf-ana".to_string()]);
            }
            other => panic!("wrong command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_convo_reply() {
        let cli = Cli::parse_from(["rd", "convo", "reply", "--phone", "6281234567890", "tidak bisa"]);

        match cli.command {
            Command::Convo {
                command: ConvoCommand::Reply { phone, text },
            } => {
                assert_eq!(phone, "6281234567890");
                assert_eq!(text, "tidak bisa");
            }
            other => panic!("wrong command: {other:?}"),
        }
    }
}
