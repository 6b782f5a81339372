//! IPC message types for daemon communication
//!
//! Simple JSON-over-newline protocol. Each message is a single line of
//! JSON followed by `\n`. Requests and responses are typed end to end;
//! the CLI parses user input into these shapes before anything crosses
//! the socket.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::{ConfirmState, Conversation, ProposalStatus, RescheduleProposal, Session, SessionKind};

/// Requests from CLI to daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonRequest {
    /// Create a session; rejected if the schedule clashes
    CreateSession {
        title: String,
        kind: SessionKind,
        /// Kind-specific payload (block, group, course, ...)
        #[serde(default)]
        fields: HashMap<String, String>,
        date: NaiveDate,
        start: NaiveTime,
        count: u32,
        room: Option<String>,
        staff: Vec<String>,
        created_by: String,
    },

    /// Fetch one session by id
    GetSession { id: String },

    /// List sessions with optional filters
    ListSessions {
        date: Option<NaiveDate>,
        kind: Option<SessionKind>,
        state: Option<ConfirmState>,
        resource: Option<String>,
    },

    /// Restart the confirmation cycle for a session
    ResetSession { id: String },

    /// File a reschedule proposal for a session
    ProposeReschedule {
        session_id: String,
        date: NaiveDate,
        start: NaiveTime,
        count: u32,
        room: Option<String>,
        staff: Vec<String>,
        proposed_by: String,
    },

    /// List proposals with optional filters
    ListProposals {
        session_id: Option<String>,
        status: Option<ProposalStatus>,
    },

    /// Approve a pending proposal
    ApproveReschedule { proposal_id: String },

    /// Reject a pending proposal
    RejectReschedule { proposal_id: String },

    /// Open a confirmation dialogue with a staff member
    StartConversation {
        session_id: String,
        staff_id: String,
        staff_name: String,
        phone: String,
    },

    /// Feed an inbound channel reply to the engine
    InboundReply { phone: String, text: String },

    /// Re-send the stored prompt of a conversation
    Redeliver { conversation_id: String },

    /// List conversations with optional filters
    ListConversations {
        phone: Option<String>,
        staff_id: Option<String>,
        session_id: Option<String>,
        active: Option<bool>,
    },

    /// Run the expiry sweep immediately
    SweepNow,

    /// Check if the daemon is alive
    Ping,

    /// Request graceful daemon shutdown
    Shutdown,
}

/// Responses from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    /// Acknowledgment with no payload
    Ok,

    /// One session
    Session { session: Session },

    /// List of sessions
    Sessions { sessions: Vec<Session> },

    /// One reschedule proposal
    Proposal { proposal: RescheduleProposal },

    /// List of proposals
    Proposals { proposals: Vec<RescheduleProposal> },

    /// One conversation
    Conversation { conversation: Conversation },

    /// List of conversations
    Conversations { conversations: Vec<Conversation> },

    /// Sweep result
    Swept { cancelled: usize },

    /// Pong response to ping
    Pong { version: String },

    /// Error response
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_session_serialize() {
        let req = DaemonRequest::GetSession {
            id: "9f3c2a-sess-pbl".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"GetSession","id":"9f3c2a-sess-pbl"}"#);
    }

    #[test]
    fn test_ping_serialize() {
        let json = serde_json::to_string(&DaemonRequest::Ping).unwrap();
        assert_eq!(json, r#"{"type":"Ping"}"#);
    }

    #[test]
    fn test_create_session_deserialize() {
        let json = r#"{
            "type": "CreateSession",
            "title": "PBL Blok 12 Grup A",
            "kind": "pbl",
            "fields": {"block": "12", "group": "A"},
            "date": "2024-01-15",
            "start": "07:20:00",
            "count": 2,
            "room": "R-101",
            "staff": ["stf-ana"],
            "created_by": "admin-tu"
        }"#;
        let req: DaemonRequest = serde_json::from_str(json).unwrap();
        match req {
            DaemonRequest::CreateSession {
                title, kind, date, count, ..
            } => {
                assert_eq!(title, "PBL Blok 12 Grup A");
                assert_eq!(kind, SessionKind::Pbl);
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
                assert_eq!(count, 2);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_inbound_reply_serialize() {
        let req = DaemonRequest::InboundReply {
            phone: "6281234567890".to_string(),
            text: "bisa".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"InboundReply","phone":"6281234567890","text":"bisa"}"#);
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = DaemonResponse::Error {
            message: "schedule conflicts with session 'x'".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            json,
            r#"{"type":"Error","message":"schedule conflicts with session 'x'"}"#
        );
    }

    #[test]
    fn test_requests_roundtrip() {
        let requests = vec![
            DaemonRequest::ListSessions {
                date: NaiveDate::from_ymd_opt(2024, 1, 15),
                kind: Some(SessionKind::Pbl),
                state: Some(ConfirmState::NotConfirmed),
                resource: None,
            },
            DaemonRequest::ResetSession { id: "s".to_string() },
            DaemonRequest::ApproveReschedule {
                proposal_id: "p".to_string(),
            },
            DaemonRequest::StartConversation {
                session_id: "s".to_string(),
                staff_id: "stf".to_string(),
                staff_name: "dr. Ana".to_string(),
                phone: "62811".to_string(),
            },
            DaemonRequest::SweepNow,
            DaemonRequest::Shutdown,
        ];

        for req in requests {
            let json = serde_json::to_string(&req).unwrap();
            let parsed: DaemonRequest = serde_json::from_str(&json).unwrap();
            assert_eq!(req, parsed);
        }
    }
}
