//! Reschedule proposal domain type
//!
//! A proposal is the admin-side record of a requested schedule change. The
//! session itself is untouched until a proposal is approved; the proposal
//! record keeps the resolved status afterwards for audit.

use serde::{Deserialize, Serialize};
use rosterstore::{IndexValue, Record, now_ms};
use tracing::debug;

use super::id::generate_id;
use super::session::Resources;
use super::window::TimeWindow;

/// Resolution status of a reschedule proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Admitted, awaiting the admin decision
    #[default]
    Pending,
    /// Applied to the session
    Approved,
    /// Turned down; the session went back to `NotConfirmed`
    Rejected,
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        debug!(?self, "ProposalStatus::fmt: called");
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A proposed schedule change for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleProposal {
    /// Unique identifier
    pub id: String,

    /// Session this proposal would move
    pub session_id: String,

    /// Proposed new time window
    pub window: TimeWindow,

    /// Proposed new room/staff assignments
    pub resources: Resources,

    /// Resolution status
    pub status: ProposalStatus,

    /// Staff/admin id that drafted the proposal
    pub proposed_by: String,

    /// Optimistic-concurrency version, managed by the store
    #[serde(default)]
    pub version: u64,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl RescheduleProposal {
    /// Create a pending proposal for a session
    pub fn new(
        session_id: impl Into<String>,
        window: TimeWindow,
        resources: Resources,
        proposed_by: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        let proposed_by = proposed_by.into();
        debug!(%session_id, %window, %proposed_by, "RescheduleProposal::new: called");
        let now = now_ms();
        RescheduleProposal {
            id: generate_id("prop", &session_id),
            session_id,
            window,
            resources,
            status: ProposalStatus::Pending,
            proposed_by,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// True while the admin decision is outstanding
    pub fn is_pending(&self) -> bool {
        debug!(%self.id, ?self.status, "RescheduleProposal::is_pending: called");
        matches!(self.status, ProposalStatus::Pending)
    }

    /// Update the resolution status; bumps `updated_at`
    pub fn set_status(&mut self, status: ProposalStatus) {
        debug!(%self.id, ?status, "RescheduleProposal::set_status: called");
        self.status = status;
        self.updated_at = now_ms();
    }
}

impl Record for RescheduleProposal {
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
        "reschedule_proposals"
    }

    fn indexed_fields(&self) -> Vec<(String, IndexValue)> {
        debug!(%self.id, "RescheduleProposal::indexed_fields: called");
        vec![
            (
                "session_id".to_string(),
                IndexValue::String(self.session_id.clone()),
            ),
            ("status".to_string(), IndexValue::String(self.status.to_string())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn test_proposal() -> RescheduleProposal {
        RescheduleProposal::new(
            "sess-1",
            TimeWindow::new(
                NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                2,
            ),
            Resources::new(Some("r-302".to_string()), vec!["stf-ana".to_string()]),
            "admin-1",
        )
    }

    #[test]
    fn test_new_proposal_is_pending() {
        let proposal = test_proposal();
        assert!(proposal.id.contains("-prop-"));
        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert!(proposal.is_pending());
    }

    #[test]
    fn test_status_change() {
        let mut proposal = test_proposal();
        proposal.set_status(ProposalStatus::Approved);
        assert!(!proposal.is_pending());
        assert_eq!(proposal.status.to_string(), "approved");
    }

    #[test]
    fn test_indexed_fields() {
        let proposal = test_proposal();
        let fields = proposal.indexed_fields();
        assert!(
            fields
                .iter()
                .any(|(f, v)| f == "session_id" && *v == IndexValue::String("sess-1".to_string()))
        );
        assert!(
            fields
                .iter()
                .any(|(f, v)| f == "status" && *v == IndexValue::String("pending".to_string()))
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let proposal = test_proposal();
        let json = serde_json::to_string(&proposal).unwrap();
        let back: RescheduleProposal = serde_json::from_str(&json).unwrap();
        assert_eq!(proposal, back);
    }
}
