//! Integration tests for rosterd
//!
//! These tests verify end-to-end behavior across the registry, the
//! conversation engine, and the IPC surface, using only the public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use tempfile::TempDir;

use rosterd::config::{ConversationConfig, RegistryConfig};
use rosterd::domain::{
    ConfirmState, ConvoState, OutboundPrompt, Resources, RescheduleState, Session, SessionDetail, TimeWindow,
};
use rosterd::events::create_event_bus;
use rosterd::gateway::{GatewayError, MessageId, NotificationGateway};
use rosterd::ipc::{DaemonClient, DaemonRequest, DaemonResponse};
use rosterd::registry::{RegistryError, SessionRegistry};
use rosterd::{ConfirmEvent, ConvoEngine, PromptCatalog};

/// Gateway that records sends instead of hitting a channel
#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<(String, OutboundPrompt)>>,
}

impl RecordingGateway {
    fn sent(&self) -> Vec<(String, OutboundPrompt)> {
        self.sent.lock().expect("gateway lock").clone()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send(&self, phone: &str, prompt: &OutboundPrompt) -> Result<MessageId, GatewayError> {
        let mut sent = self.sent.lock().expect("gateway lock");
        sent.push((phone.to_string(), prompt.clone()));
        Ok(format!("msg-{}", sent.len()))
    }
}

struct World {
    registry: SessionRegistry,
    engine: ConvoEngine,
    gateway: Arc<RecordingGateway>,
    _temp: TempDir,
}

fn world() -> World {
    world_with_expiry(24)
}

fn world_with_expiry(expiry_hours: i64) -> World {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let bus = create_event_bus();
    let registry = SessionRegistry::spawn(temp.path().join("roster.db"), &RegistryConfig::default(), bus.clone())
        .expect("Failed to spawn registry");
    let gateway = Arc::new(RecordingGateway::default());
    let catalog = Arc::new(PromptCatalog::builtin_only());
    let config = ConversationConfig {
        expiry_hours,
        ..Default::default()
    };
    let engine = ConvoEngine::spawn(registry.clone(), gateway.clone(), catalog, &config, bus);
    World {
        registry,
        engine,
        gateway,
        _temp: temp,
    }
}

fn pbl_session(title: &str, hour: u32, minute: u32, count: u32, room: &str, staff: &[&str]) -> Session {
    Session::new(
        title,
        SessionDetail::Pbl {
            block: "12".to_string(),
            group: "A".to_string(),
        },
        TimeWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date"),
            NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time"),
            count,
        ),
        Resources::new(Some(room.to_string()), staff.iter().map(|s| s.to_string()).collect()),
        "admin-tu",
    )
}

// =============================================================================
// Registry Tests
// =============================================================================

#[tokio::test]
async fn test_conflicting_sessions_rejected_end_to_end() {
    let w = world();

    let kept = w
        .registry
        .create_session(pbl_session("PBL Blok 12 Grup A", 7, 20, 2, "R-101", &["stf-ana"]))
        .await
        .expect("first session should land");

    // Same room, overlapping window
    let err = w
        .registry
        .create_session(pbl_session("PBL Blok 12 Grup B", 8, 0, 2, "R-101", &["stf-budi"]))
        .await
        .expect_err("overlap should be rejected");
    match err {
        RegistryError::Conflict { other_id } => assert_eq!(other_id, kept.id),
        other => panic!("unexpected error: {other:?}"),
    }

    // Back-to-back in the same room is fine
    w.registry
        .create_session(pbl_session("PBL Blok 12 Grup C", 9, 0, 1, "R-101", &["stf-budi"]))
        .await
        .expect("back-to-back session should land");
}

#[tokio::test]
async fn test_reschedule_approval_moves_the_session() {
    let w = world();

    let session = w
        .registry
        .create_session(pbl_session("PBL Blok 12 Grup A", 7, 20, 2, "R-101", &["stf-ana"]))
        .await
        .expect("create");

    w.registry
        .apply_transition(
            &session.id,
            &ConfirmEvent::RequestReschedule {
                reason: "sakit".to_string(),
            },
        )
        .await
        .expect("request reschedule");

    let new_window = TimeWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 17).expect("valid date"),
        NaiveTime::from_hms_opt(13, 0, 0).expect("valid time"),
        2,
    );
    let proposal = w
        .registry
        .propose_reschedule(&session.id, new_window, session.resources.clone(), "admin-tu")
        .await
        .expect("propose");

    let moved = w.registry.approve_reschedule(&proposal.id).await.expect("approve");

    assert_eq!(moved.window, new_window);
    assert_eq!(moved.confirm_state, ConfirmState::Confirmed);
    assert_eq!(moved.reschedule_state, Some(RescheduleState::Approved));
    // The request reason survives the move for audit
    assert_eq!(moved.original_reason.as_deref(), Some("sakit"));
}

// =============================================================================
// Conversation Flow Tests
// =============================================================================

#[tokio::test]
async fn test_full_confirmation_dialogue() {
    let w = world();

    let session = w
        .registry
        .create_session(pbl_session("PBL Blok 12 Grup A", 7, 20, 2, "R-101", &["stf-ana"]))
        .await
        .expect("create");

    let conversation = w
        .engine
        .start_conversation(&session.id, "stf-ana", "dr. Ana", "6281234567890")
        .await
        .expect("start conversation");
    assert_eq!(conversation.state, ConvoState::WaitingButtonChoice);

    let done = w.engine.on_reply("6281234567890", "bisa").await.expect("reply");
    assert_eq!(done.state, ConvoState::Completed);

    let confirmed = w.registry.get_session(&session.id).await.expect("get");
    assert_eq!(confirmed.confirm_state, ConfirmState::Confirmed);

    // Initial prompt plus closing message
    let sent = w.gateway.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].1.text.contains("dr. Ana"));
    assert_eq!(sent[1].1.template_id, "closing-confirmed");
}

#[tokio::test]
async fn test_decline_dialogue_collects_reason() {
    let w = world();

    let session = w
        .registry
        .create_session(pbl_session("PBL Blok 12 Grup A", 7, 20, 2, "R-101", &["stf-ana"]))
        .await
        .expect("create");

    w.engine
        .start_conversation(&session.id, "stf-ana", "dr. Ana", "6281234567890")
        .await
        .expect("start");

    let menu = w.engine.on_reply("6281234567890", "tidak").await.expect("no");
    assert_eq!(menu.state, ConvoState::WaitingDecisionChoice);

    let reason_prompt = w.engine.on_reply("6281234567890", "1").await.expect("decline branch");
    assert_eq!(reason_prompt.state, ConvoState::WaitingDeclineReason);

    let done = w.engine.on_reply("6281234567890", "Ada rapat fakultas").await.expect("reason");
    assert_eq!(done.state, ConvoState::Completed);

    let declined = w.registry.get_session(&session.id).await.expect("get");
    assert_eq!(declined.confirm_state, ConfirmState::Declined);
    assert_eq!(declined.reason.as_deref(), Some("Ada rapat fakultas"));
}

#[tokio::test]
async fn test_reschedule_dialogue_then_admin_approval() {
    let w = world();

    let session = w
        .registry
        .create_session(pbl_session("PBL Blok 12 Grup A", 7, 20, 2, "R-101", &["stf-ana"]))
        .await
        .expect("create");

    w.engine
        .start_conversation(&session.id, "stf-ana", "dr. Ana", "6281234567890")
        .await
        .expect("start");
    w.engine.on_reply("6281234567890", "tidak bisa").await.expect("no");
    w.engine.on_reply("6281234567890", "ganti jadwal").await.expect("reschedule branch");
    let done = w.engine.on_reply("6281234567890", "sakit").await.expect("reason");
    assert_eq!(done.state, ConvoState::Completed);

    let waiting = w.registry.get_session(&session.id).await.expect("get");
    assert_eq!(waiting.confirm_state, ConfirmState::WaitingReschedule);
    assert_eq!(waiting.reschedule_state, Some(RescheduleState::Waiting));

    // Admin moves the session to a free slot
    let new_window = TimeWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 18).expect("valid date"),
        NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
        2,
    );
    let proposal = w
        .registry
        .propose_reschedule(&session.id, new_window, waiting.resources.clone(), "admin-tu")
        .await
        .expect("propose");
    let moved = w.registry.approve_reschedule(&proposal.id).await.expect("approve");

    assert_eq!(moved.confirm_state, ConfirmState::Confirmed);
    assert_eq!(moved.window, new_window);
}

#[tokio::test]
async fn test_expired_conversation_swept_without_touching_session() {
    // Zero expiry: every conversation is expired as soon as it exists
    let w = world_with_expiry(0);

    let session = w
        .registry
        .create_session(pbl_session("PBL Blok 12 Grup A", 7, 20, 2, "R-101", &["stf-ana"]))
        .await
        .expect("create");

    w.engine
        .start_conversation(&session.id, "stf-ana", "dr. Ana", "6281234567890")
        .await
        .expect("start");

    let cancelled = w.engine.sweep_expired().await.expect("sweep");
    assert_eq!(cancelled, 1);

    let conversations = w
        .registry
        .list_conversations(Some("6281234567890".to_string()), None, None, None)
        .await
        .expect("list");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].state, ConvoState::Cancelled);

    // An expired dialogue leaves the confirmation question open
    let untouched = w.registry.get_session(&session.id).await.expect("get");
    assert_eq!(untouched.confirm_state, ConfirmState::NotConfirmed);
}

// =============================================================================
// IPC Tests
// =============================================================================

/// Serve requests from a test socket until the task is dropped
fn spawn_ipc_server(socket_path: std::path::PathBuf, registry: SessionRegistry, engine: ConvoEngine) {
    // Bind before spawning so the client never races the listener
    let (listener, _path) =
        rosterd::ipc::listener::create_listener_at(&socket_path).expect("Failed to bind test socket");
    tokio::spawn(async move {
        loop {
            let (mut stream, _addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let request = match rosterd::ipc::listener::read_request(&mut stream).await {
                Ok(request) => request,
                Err(_) => continue,
            };
            let response = rosterd::daemon::handle_request(request, &registry, &engine).await;
            let _ = rosterd::ipc::listener::send_response(&mut stream, response).await;
        }
    });
}

#[tokio::test]
async fn test_ipc_round_trip() {
    let w = world();
    let socket_path = w._temp.path().join("rosterd.sock");
    spawn_ipc_server(socket_path.clone(), w.registry.clone(), w.engine.clone());

    let client = DaemonClient::with_socket_path(socket_path).with_timeout(Duration::from_secs(5));

    // Ping reports the daemon version
    let version = client.ping().await.expect("ping");
    assert_eq!(version, env!("CARGO_PKG_VERSION"));

    // Create a session over the wire
    let response = client
        .request(DaemonRequest::CreateSession {
            title: "PBL Blok 12 Grup A".to_string(),
            kind: rosterd::SessionKind::Pbl,
            fields: [("block".to_string(), "12".to_string()), ("group".to_string(), "A".to_string())]
                .into_iter()
                .collect(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date"),
            start: NaiveTime::from_hms_opt(7, 20, 0).expect("valid time"),
            count: 2,
            room: Some("R-101".to_string()),
            staff: vec!["stf-ana".to_string()],
            created_by: "admin-tu".to_string(),
        })
        .await
        .expect("create request");
    let created = match response {
        DaemonResponse::Session { session } => session,
        other => panic!("unexpected response: {other:?}"),
    };

    // And read it back
    let response = client
        .request(DaemonRequest::GetSession { id: created.id.clone() })
        .await
        .expect("get request");
    match response {
        DaemonResponse::Session { session } => assert_eq!(session.id, created.id),
        other => panic!("unexpected response: {other:?}"),
    }

    // Unknown ids come back as error payloads, not transport failures
    let response = client
        .request(DaemonRequest::GetSession {
            id: "missing".to_string(),
        })
        .await
        .expect("request should still succeed");
    assert!(matches!(response, DaemonResponse::Error { .. }));
}

#[tokio::test]
async fn test_ipc_conversation_commands() {
    let w = world();
    let socket_path = w._temp.path().join("rosterd.sock");
    spawn_ipc_server(socket_path.clone(), w.registry.clone(), w.engine.clone());

    let client = DaemonClient::with_socket_path(socket_path).with_timeout(Duration::from_secs(5));

    let session = w
        .registry
        .create_session(pbl_session("PBL Blok 12 Grup A", 7, 20, 2, "R-101", &["stf-ana"]))
        .await
        .expect("create");

    let response = client
        .request(DaemonRequest::StartConversation {
            session_id: session.id.clone(),
            staff_id: "stf-ana".to_string(),
            staff_name: "dr. Ana".to_string(),
            phone: "6281234567890".to_string(),
        })
        .await
        .expect("start request");
    assert!(matches!(response, DaemonResponse::Conversation { .. }));

    let response = client
        .request(DaemonRequest::InboundReply {
            phone: "6281234567890".to_string(),
            text: "bisa".to_string(),
        })
        .await
        .expect("reply request");
    match response {
        DaemonResponse::Conversation { conversation } => {
            assert_eq!(conversation.state, ConvoState::Completed);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let confirmed = w.registry.get_session(&session.id).await.expect("get");
    assert_eq!(confirmed.confirm_state, ConfirmState::Confirmed);
}

// =============================================================================
// CLI Tests
// =============================================================================

/// Binary invocation isolated from the developer's real config and daemon
fn rd_command(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("rd").expect("rd binary");
    cmd.env("HOME", home.path())
        .env_remove("XDG_RUNTIME_DIR")
        .env_remove("XDG_DATA_HOME")
        .env_remove("XDG_CONFIG_HOME");
    cmd
}

#[test]
fn test_cli_help_lists_subcommands() {
    let home = TempDir::new().expect("Failed to create temp dir");
    rd_command(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("session"))
        .stdout(predicates::str::contains("daemon"));
}

#[test]
fn test_cli_roster_commands_need_the_daemon() {
    let home = TempDir::new().expect("Failed to create temp dir");
    rd_command(&home)
        .args(["session", "list"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("is the daemon running?"));
}

#[test]
fn test_cli_daemon_status_reports_stopped() {
    let home = TempDir::new().expect("Failed to create temp dir");
    rd_command(&home)
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicates::str::contains("stopped"));
}

#[test]
fn test_cli_create_requires_arguments() {
    let home = TempDir::new().expect("Failed to create temp dir");
    rd_command(&home)
        .args(["session", "create"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("required"));
}
