//! Conversation domain type
//!
//! One record per in-flight confirmation dialogue with a staff member over
//! the messaging channel. At most one active conversation exists per
//! (staff, session) pair; the engine enforces that on start.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use rosterstore::{IndexValue, Record, now_ms};
use tracing::debug;

use super::id::generate_id;
use super::session::SessionKind;

/// Dialogue state of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConvoState {
    /// Initial prompt sent, waiting for the accept/decline button
    #[default]
    WaitingButtonChoice,
    /// Staff said no; waiting for decline-vs-reschedule choice
    WaitingDecisionChoice,
    /// Waiting for the decline reason text
    WaitingDeclineReason,
    /// Waiting for the reschedule reason text
    WaitingRescheduleReason,
    /// Decision collected and forwarded
    Completed,
    /// Expired or administratively dropped
    Cancelled,
}

impl std::fmt::Display for ConvoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        debug!(?self, "ConvoState::fmt: called");
        match self {
            Self::WaitingButtonChoice => write!(f, "waiting_button_choice"),
            Self::WaitingDecisionChoice => write!(f, "waiting_decision_choice"),
            Self::WaitingDeclineReason => write!(f, "waiting_decline_reason"),
            Self::WaitingRescheduleReason => write!(f, "waiting_reschedule_reason"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl ConvoState {
    /// True for states that end the dialogue
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// A rendered outbound message, kept verbatim for idempotent re-delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPrompt {
    /// Template the text was rendered from
    pub template_id: String,

    /// Variables fed to the template
    pub variables: HashMap<String, String>,

    /// Final rendered text; re-delivery sends these bytes again instead of
    /// re-rendering
    pub text: String,
}

/// One confirmation dialogue with a staff member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier
    pub id: String,

    /// Staff member being asked
    pub staff_id: String,

    /// Session the dialogue is about
    pub session_id: String,

    /// Kind of that session (denormalized for prompt wording)
    pub session_kind: SessionKind,

    /// Channel address (phone number)
    pub phone: String,

    /// Dialogue state
    pub state: ConvoState,

    /// Last prompt sent over the channel
    pub last_prompt: Option<OutboundPrompt>,

    /// Free-form in-progress answers (partially typed reason, chosen branch)
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Expiry timestamp (Unix milliseconds); refreshed on accepted replies
    pub expires_at: i64,

    /// Optimistic-concurrency version, managed by the store
    #[serde(default)]
    pub version: u64,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Conversation {
    /// Create a new dialogue in `WaitingButtonChoice`
    pub fn new(
        staff_id: impl Into<String>,
        session_id: impl Into<String>,
        session_kind: SessionKind,
        phone: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        let staff_id = staff_id.into();
        let session_id = session_id.into();
        let phone = phone.into();
        debug!(%staff_id, %session_id, %session_kind, %phone, expires_at, "Conversation::new: called");
        let now = now_ms();
        Conversation {
            id: generate_id("conv", &format!("{}-{}", staff_id, session_id)),
            staff_id,
            session_id,
            session_kind,
            phone,
            state: ConvoState::WaitingButtonChoice,
            last_prompt: None,
            metadata: HashMap::new(),
            expires_at,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// True while the dialogue still accepts replies
    pub fn is_active(&self) -> bool {
        debug!(%self.id, ?self.state, "Conversation::is_active: called");
        !self.state.is_terminal()
    }

    /// True when the expiry deadline has passed
    pub fn is_expired(&self, now: i64) -> bool {
        debug!(%self.id, self.expires_at, now, "Conversation::is_expired: called");
        self.expires_at <= now
    }

    /// Advance the dialogue state; bumps `updated_at`
    pub fn set_state(&mut self, state: ConvoState) {
        debug!(%self.id, ?state, "Conversation::set_state: called");
        self.state = state;
        self.updated_at = now_ms();
    }

    /// Record the prompt that was just sent; bumps `updated_at`
    pub fn set_last_prompt(&mut self, prompt: OutboundPrompt) {
        debug!(%self.id, template_id = %prompt.template_id, "Conversation::set_last_prompt: called");
        self.last_prompt = Some(prompt);
        self.updated_at = now_ms();
    }

    /// Stash an in-progress answer; bumps `updated_at`
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        debug!(%self.id, %key, %value, "Conversation::insert_metadata: called");
        self.metadata.insert(key, value);
        self.updated_at = now_ms();
    }

    /// Push the expiry deadline forward; bumps `updated_at`
    pub fn refresh_expiry(&mut self, expires_at: i64) {
        debug!(%self.id, expires_at, "Conversation::refresh_expiry: called");
        self.expires_at = expires_at;
        self.updated_at = now_ms();
    }
}

impl Record for Conversation {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "conversations"
    }

    fn indexed_fields(&self) -> Vec<(String, IndexValue)> {
        debug!(%self.id, "Conversation::indexed_fields: called");
        vec![
            ("phone".to_string(), IndexValue::String(self.phone.clone())),
            ("staff_id".to_string(), IndexValue::String(self.staff_id.clone())),
            (
                "session_id".to_string(),
                IndexValue::String(self.session_id.clone()),
            ),
            ("state".to_string(), IndexValue::String(self.state.to_string())),
            (
                "active".to_string(),
                IndexValue::String(self.is_active().to_string()),
            ),
        ]
    }
}
