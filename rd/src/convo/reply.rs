//! Inbound reply classification
//!
//! Maps raw message text to an action based on the dialogue state. Token
//! matching is case-insensitive; free-text reasons keep their original
//! casing. Unknown input classifies as `Unrecognized`, which re-prompts
//! rather than advancing the dialogue.

use tracing::debug;

use crate::domain::ConvoState;

/// What an inbound reply means in the current dialogue state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAction {
    /// Staff accepted the session ("bisa")
    Accept,
    /// Staff cannot attend; present the decline/reschedule menu
    OpenDecisionMenu,
    /// Staff picked decline from the menu
    ChooseDecline,
    /// Staff picked reschedule from the menu
    ChooseReschedule,
    /// Free-text reason (decline or reschedule, depending on state)
    Reason(String),
    /// Input did not match anything expected in this state
    Unrecognized,
}

/// Classify raw reply text against the dialogue state
pub fn classify(state: &ConvoState, raw: &str) -> ReplyAction {
    debug!(?state, raw, "classify: called");
    let trimmed = raw.trim();
    let normalized = trimmed.to_lowercase();

    match state {
        ConvoState::WaitingButtonChoice => match normalized.as_str() {
            "bisa" => ReplyAction::Accept,
            "tidak" | "tidak bisa" => ReplyAction::OpenDecisionMenu,
            _ => ReplyAction::Unrecognized,
        },

        ConvoState::WaitingDecisionChoice => match normalized.as_str() {
            "1" | "tolak" => ReplyAction::ChooseDecline,
            "2" | "ganti" | "ganti jadwal" => ReplyAction::ChooseReschedule,
            _ => ReplyAction::Unrecognized,
        },

        ConvoState::WaitingDeclineReason | ConvoState::WaitingRescheduleReason => {
            if trimmed.is_empty() {
                ReplyAction::Unrecognized
            } else {
                ReplyAction::Reason(trimmed.to_string())
            }
        }

        // terminal states accept nothing
        ConvoState::Completed | ConvoState::Cancelled => ReplyAction::Unrecognized,
    }
}
