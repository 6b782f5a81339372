//! Session domain type
//!
//! One record per scheduled teaching slot, across all six session kinds.
//! Confirmation/reschedule fields live here in one shape instead of being
//! duplicated per kind; the transition table in `crate::confirm` is the only
//! code that decides how they move.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use rosterstore::{IndexValue, Record, now_ms};
use tracing::debug;

use super::id::generate_id;
use super::window::TimeWindow;

/// Session kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Problem-based learning tutorial
    Pbl,
    /// Clinical skills rotation
    Csr,
    /// Large lecture
    LargeLecture,
    /// Laboratory practicum
    Practicum,
    /// Journal reading
    JournalReading,
    /// Non-block activity (defenses, guest sessions)
    OtherNonBlock,
}

impl SessionKind {
    /// Human-readable label for channel messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pbl => "PBL",
            Self::Csr => "CSR",
            Self::LargeLecture => "Kuliah Besar",
            Self::Practicum => "Praktikum",
            Self::JournalReading => "Journal Reading",
            Self::OtherNonBlock => "Kegiatan Non-Blok",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pbl => write!(f, "pbl"),
            Self::Csr => write!(f, "csr"),
            Self::LargeLecture => write!(f, "large_lecture"),
            Self::Practicum => write!(f, "practicum"),
            Self::JournalReading => write!(f, "journal_reading"),
            Self::OtherNonBlock => write!(f, "other_non_block"),
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pbl" => Ok(Self::Pbl),
            "csr" => Ok(Self::Csr),
            "large_lecture" => Ok(Self::LargeLecture),
            "practicum" => Ok(Self::Practicum),
            "journal_reading" => Ok(Self::JournalReading),
            "other_non_block" => Ok(Self::OtherNonBlock),
            other => Err(format!("unknown session kind: {}", other)),
        }
    }
}

/// Kind-specific payload, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionDetail {
    Pbl { block: String, group: String },
    Csr { department: String, group: String },
    LargeLecture { course: String, class_name: String },
    Practicum { lab: String, course: String },
    JournalReading { department: String, group: String },
    OtherNonBlock { activity: String },
}

impl SessionDetail {
    /// Kind discriminant for this payload
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Pbl { .. } => SessionKind::Pbl,
            Self::Csr { .. } => SessionKind::Csr,
            Self::LargeLecture { .. } => SessionKind::LargeLecture,
            Self::Practicum { .. } => SessionKind::Practicum,
            Self::JournalReading { .. } => SessionKind::JournalReading,
            Self::OtherNonBlock { .. } => SessionKind::OtherNonBlock,
        }
    }

    /// Build a payload for `kind` from loose key/value input (CLI, IPC).
    /// Missing keys become empty strings; unknown keys are ignored.
    pub fn from_kind_fields(kind: SessionKind, fields: &HashMap<String, String>) -> Self {
        debug!(%kind, ?fields, "SessionDetail::from_kind_fields: called");
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
        match kind {
            SessionKind::Pbl => Self::Pbl {
                block: get("block"),
                group: get("group"),
            },
            SessionKind::Csr => Self::Csr {
                department: get("department"),
                group: get("group"),
            },
            SessionKind::LargeLecture => Self::LargeLecture {
                course: get("course"),
                class_name: get("class_name"),
            },
            SessionKind::Practicum => Self::Practicum {
                lab: get("lab"),
                course: get("course"),
            },
            SessionKind::JournalReading => Self::JournalReading {
                department: get("department"),
                group: get("group"),
            },
            SessionKind::OtherNonBlock => Self::OtherNonBlock {
                activity: get("activity"),
            },
        }
    }
}

/// Staff confirmation state for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmState {
    /// Awaiting the staff decision
    #[default]
    NotConfirmed,
    /// Staff accepted
    Confirmed,
    /// Staff declined with a reason
    Declined,
    /// Staff asked for a reschedule; admin decision pending
    WaitingReschedule,
}

impl std::fmt::Display for ConfirmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        debug!(?self, "ConfirmState::fmt: called");
        match self {
            Self::NotConfirmed => write!(f, "not_confirmed"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Declined => write!(f, "declined"),
            Self::WaitingReschedule => write!(f, "waiting_reschedule"),
        }
    }
}

impl ConfirmState {
    /// True for states that close the current confirmation cycle
    pub fn is_terminal_for_cycle(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Declined)
    }
}

/// Approval status of a reschedule request, layered under the confirmation
/// state while it is `WaitingReschedule`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleState {
    Waiting,
    Approved,
    Rejected,
}

impl std::fmt::Display for RescheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Room and staff assignments for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resources {
    /// Room id; optional for kinds held off-site (CSR rotations)
    pub room: Option<String>,

    /// Assigned staff ids; at least one
    pub staff: Vec<String>,
}

impl Resources {
    pub fn new(room: Option<String>, staff: Vec<String>) -> Self {
        debug!(?room, ?staff, "Resources::new: called");
        Resources { room, staff }
    }

    /// Every id that participates in exclusivity checks: the room (if any)
    /// plus each staff member
    pub fn resource_ids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.staff.len() + 1);
        if let Some(ref room) = self.room {
            ids.push(room.clone());
        }
        ids.extend(self.staff.iter().cloned());
        ids
    }

    /// True when the two assignments share a room or a staff member
    pub fn shares_any(&self, other: &Resources) -> bool {
        if let (Some(a), Some(b)) = (&self.room, &other.room)
            && a == b
        {
            return true;
        }
        self.staff.iter().any(|s| other.staff.contains(s))
    }
}

/// One scheduled teaching slot of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: String,

    /// Human label shown in prompts ("PBL Blok 12 Grup A")
    pub title: String,

    /// Kind-specific payload; the kind discriminant lives in its tag
    pub detail: SessionDetail,

    /// Scheduled time window
    pub window: TimeWindow,

    /// Room/staff assignments
    pub resources: Resources,

    /// Current confirmation state
    pub confirm_state: ConfirmState,

    /// Reschedule sub-state, only set while `confirm_state` is
    /// `WaitingReschedule`
    pub reschedule_state: Option<RescheduleState>,

    /// Latest decline/reschedule reason
    pub reason: Option<String>,

    /// Reason captured when a reschedule was first requested; survives later
    /// edits so the audit trail keeps the staff's own words
    pub original_reason: Option<String>,

    /// Staff/admin id that scheduled the session
    pub created_by: String,

    /// Optimistic-concurrency version, managed by the store
    #[serde(default)]
    pub version: u64,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Session {
    /// Create a new session awaiting confirmation
    pub fn new(
        title: impl Into<String>,
        detail: SessionDetail,
        window: TimeWindow,
        resources: Resources,
        created_by: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let created_by = created_by.into();
        debug!(%title, kind = %detail.kind(), %window, %created_by, "Session::new: called");
        let now = now_ms();
        Session {
            id: generate_id("sess", &format!("{}-{}", detail.kind(), title)),
            title,
            detail,
            window,
            resources,
            confirm_state: ConfirmState::NotConfirmed,
            reschedule_state: None,
            reason: None,
            original_reason: None,
            created_by,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with a specific ID (for testing or recovery)
    pub fn with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        detail: SessionDetail,
        window: TimeWindow,
        resources: Resources,
        created_by: impl Into<String>,
    ) -> Self {
        let id = id.into();
        debug!(%id, "Session::with_id: called");
        let mut session = Session::new(title, detail, window, resources, created_by);
        session.id = id;
        session
    }

    /// Kind discriminant
    pub fn kind(&self) -> SessionKind {
        self.detail.kind()
    }

    /// True while the staff decision is still open
    pub fn is_unconfirmed(&self) -> bool {
        debug!(%self.id, ?self.confirm_state, "Session::is_unconfirmed: called");
        matches!(self.confirm_state, ConfirmState::NotConfirmed)
    }

    /// True once the staff accepted (directly or via approved reschedule)
    pub fn is_confirmed(&self) -> bool {
        debug!(%self.id, ?self.confirm_state, "Session::is_confirmed: called");
        matches!(self.confirm_state, ConfirmState::Confirmed)
    }

    /// True while a reschedule request waits on the admin
    pub fn is_waiting_reschedule(&self) -> bool {
        debug!(%self.id, ?self.confirm_state, "Session::is_waiting_reschedule: called");
        matches!(self.confirm_state, ConfirmState::WaitingReschedule)
    }

    /// Replace the schedule (approved reschedule); bumps `updated_at`
    pub fn set_schedule(&mut self, window: TimeWindow, resources: Resources) {
        debug!(%self.id, %window, "Session::set_schedule: called");
        self.window = window;
        self.resources = resources;
        self.updated_at = now_ms();
    }

    /// Set confirmation state and sub-state together; bumps `updated_at`.
    /// Only `crate::confirm` outcomes should feed this.
    pub fn set_confirmation(&mut self, state: ConfirmState, sub: Option<RescheduleState>) {
        debug!(%self.id, ?state, ?sub, "Session::set_confirmation: called");
        self.confirm_state = state;
        self.reschedule_state = sub;
        self.updated_at = now_ms();
    }

    /// Store a decline/reschedule reason; bumps `updated_at`
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(%self.id, %reason, "Session::set_reason: called");
        self.reason = Some(reason);
        self.updated_at = now_ms();
    }

    /// Capture a reason as both the working reason and the original-reason
    /// snapshot (a new reschedule request starts a fresh audit trail)
    pub fn capture_reason(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(%self.id, %reason, "Session::capture_reason: called");
        self.reason = Some(reason.clone());
        self.original_reason = Some(reason);
        self.updated_at = now_ms();
    }

    /// Clear the working reason (new cycle); the original-reason snapshot is
    /// left alone
    pub fn clear_reason(&mut self) {
        debug!(%self.id, "Session::clear_reason: called");
        self.reason = None;
        self.updated_at = now_ms();
    }
}

impl Record for Session {
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
        "sessions"
    }

    fn indexed_fields(&self) -> Vec<(String, IndexValue)> {
        debug!(%self.id, "Session::indexed_fields: called");
        let mut fields = vec![
            ("kind".to_string(), IndexValue::String(self.kind().to_string())),
            (
                "state".to_string(),
                IndexValue::String(self.confirm_state.to_string()),
            ),
            (
                "date".to_string(),
                IndexValue::String(self.window.date.format("%Y-%m-%d").to_string()),
            ),
        ];
        for resource in self.resources.resource_ids() {
            fields.push(("resource".to_string(), IndexValue::String(resource)));
        }
        fields
    }
}
