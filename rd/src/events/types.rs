//! Event types for roster activity streaming
//!
//! The vocabulary of observable activity:
//! - session lifecycle (created, confirmed, declined, reset)
//! - reschedule negotiation (requested, approved, rejected)
//! - conversation lifecycle (started, completed, cancelled)
//! - channel delivery (prompt sent, prompt failed)

use serde::{Deserialize, Serialize};

/// Core event enum - the vocabulary of roster activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RosterEvent {
    // === Session lifecycle ===
    /// A session passed the conflict check and was persisted
    SessionCreated {
        session_id: String,
        kind: String,
        window: String,
    },
    /// Staff accepted, or an approved reschedule landed
    SessionConfirmed { session_id: String },
    /// Staff declined
    SessionDeclined { session_id: String, reason: String },
    /// Admin restarted the confirmation cycle
    ConfirmationReset { session_id: String },

    // === Reschedule negotiation ===
    /// Staff asked to move the session
    RescheduleRequested { session_id: String, reason: String },
    /// Admin approved a proposal; the session carries the new schedule
    RescheduleApproved {
        session_id: String,
        proposal_id: String,
    },
    /// Admin rejected a proposal; the session is back to not-confirmed
    RescheduleRejected {
        session_id: String,
        proposal_id: String,
    },

    // === Conversation lifecycle ===
    /// A confirmation dialogue was opened with a staff member
    ConversationStarted {
        session_id: String,
        conversation_id: String,
        staff_id: String,
    },
    /// The dialogue collected a decision
    ConversationCompleted {
        session_id: String,
        conversation_id: String,
        decision: String,
    },
    /// The dialogue expired or was dropped without a decision
    ConversationCancelled {
        session_id: String,
        conversation_id: String,
    },

    // === Channel delivery ===
    /// A prompt went out over the messaging channel
    PromptSent {
        session_id: String,
        conversation_id: String,
        template_id: String,
    },
    /// Delivery failed after retries; the stored prompt awaits re-delivery
    PromptFailed {
        session_id: String,
        conversation_id: String,
        error: String,
    },
}

impl RosterEvent {
    /// Short name for logging and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session_created",
            Self::SessionConfirmed { .. } => "session_confirmed",
            Self::SessionDeclined { .. } => "session_declined",
            Self::ConfirmationReset { .. } => "confirmation_reset",
            Self::RescheduleRequested { .. } => "reschedule_requested",
            Self::RescheduleApproved { .. } => "reschedule_approved",
            Self::RescheduleRejected { .. } => "reschedule_rejected",
            Self::ConversationStarted { .. } => "conversation_started",
            Self::ConversationCompleted { .. } => "conversation_completed",
            Self::ConversationCancelled { .. } => "conversation_cancelled",
            Self::PromptSent { .. } => "prompt_sent",
            Self::PromptFailed { .. } => "prompt_failed",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionCreated { session_id, .. }
            | Self::SessionConfirmed { session_id }
            | Self::SessionDeclined { session_id, .. }
            | Self::ConfirmationReset { session_id }
            | Self::RescheduleRequested { session_id, .. }
            | Self::RescheduleApproved { session_id, .. }
            | Self::RescheduleRejected { session_id, .. }
            | Self::ConversationStarted { session_id, .. }
            | Self::ConversationCompleted { session_id, .. }
            | Self::ConversationCancelled { session_id, .. }
            | Self::PromptSent { session_id, .. }
            | Self::PromptFailed { session_id, .. } => session_id,
        }
    }
}
