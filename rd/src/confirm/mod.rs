//! Confirmation state machine
//!
//! Pure transition logic for the session confirmation lifecycle. No I/O
//! here: callers read a session, run `apply`, then persist the outcome.
//! Every (state, event) pair outside the table is a hard error, so an
//! invalid state combination can never be produced, only rejected.
//!
//! ```text
//! NotConfirmed --Accept--------------------> Confirmed
//! NotConfirmed --Decline(reason)-----------> Declined
//! NotConfirmed --RequestReschedule(reason)-> WaitingReschedule
//! WaitingReschedule --AdminApprove(sched)--> Confirmed
//! WaitingReschedule --AdminReject----------> NotConfirmed
//! Confirmed | Declined --AdminReset--------> NotConfirmed
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{ConfirmState, RescheduleState, Resources, Session, TimeWindow};

/// Input to the confirmation state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfirmEvent {
    /// Staff accepted the session
    Accept,
    /// Staff declined, with their reason
    Decline { reason: String },
    /// Staff asked to move the session, with their reason
    RequestReschedule { reason: String },
    /// Admin approved a reschedule; the new schedule rides along
    AdminApprove {
        window: TimeWindow,
        resources: Resources,
    },
    /// Admin turned the reschedule down
    AdminReject,
    /// Admin restarted the cycle (after editing the session)
    AdminReset,
}

impl ConfirmEvent {
    /// Event name for errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline { .. } => "decline",
            Self::RequestReschedule { .. } => "request_reschedule",
            Self::AdminApprove { .. } => "admin_approve",
            Self::AdminReject => "admin_reject",
            Self::AdminReset => "admin_reset",
        }
    }
}

impl std::fmt::Display for ConfirmEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The one hard failure of the state machine: the event is not defined for
/// the current state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid transition: event '{event}' not allowed in state '{from}'")]
pub struct InvalidTransition {
    pub from: ConfirmState,
    pub event: &'static str,
}

/// Field changes that accompany a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Clear the working reason
    ClearReason,
    /// Store the reason
    StoreReason(String),
    /// Store the reason and snapshot it as the original
    CaptureReason(String),
    /// Swap in the approved schedule
    ApplySchedule {
        window: TimeWindow,
        resources: Resources,
    },
    /// Leave the reason fields alone
    KeepReason,
}

/// Result of a valid transition
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub state: ConfirmState,
    pub reschedule: Option<RescheduleState>,
    pub effect: Effect,
}

/// Run one event through the transition table.
///
/// `reschedule` is validated as part of the current state: `AdminApprove`
/// and `AdminReject` require the `Waiting` sub-state, so a corrupted
/// combination is rejected instead of silently repaired.
pub fn apply(
    state: ConfirmState,
    reschedule: Option<RescheduleState>,
    event: &ConfirmEvent,
) -> Result<Outcome, InvalidTransition> {
    debug!(%state, ?reschedule, event = event.name(), "confirm::apply: called");
    let outcome = match (state, reschedule, event) {
        (ConfirmState::NotConfirmed, None, ConfirmEvent::Accept) => Outcome {
            state: ConfirmState::Confirmed,
            reschedule: None,
            effect: Effect::ClearReason,
        },
        (ConfirmState::NotConfirmed, None, ConfirmEvent::Decline { reason }) => Outcome {
            state: ConfirmState::Declined,
            reschedule: None,
            effect: Effect::StoreReason(reason.clone()),
        },
        (ConfirmState::NotConfirmed, None, ConfirmEvent::RequestReschedule { reason }) => Outcome {
            state: ConfirmState::WaitingReschedule,
            reschedule: Some(RescheduleState::Waiting),
            effect: Effect::CaptureReason(reason.clone()),
        },
        (
            ConfirmState::WaitingReschedule,
            Some(RescheduleState::Waiting),
            ConfirmEvent::AdminApprove { window, resources },
        ) => Outcome {
            state: ConfirmState::Confirmed,
            reschedule: None,
            effect: Effect::ApplySchedule {
                window: *window,
                resources: resources.clone(),
            },
        },
        (
            ConfirmState::WaitingReschedule,
            Some(RescheduleState::Waiting),
            ConfirmEvent::AdminReject,
        ) => Outcome {
            state: ConfirmState::NotConfirmed,
            reschedule: None,
            effect: Effect::KeepReason,
        },
        (ConfirmState::Confirmed | ConfirmState::Declined, None, ConfirmEvent::AdminReset) => {
            Outcome {
                state: ConfirmState::NotConfirmed,
                reschedule: None,
                effect: Effect::ClearReason,
            }
        }
        (from, _, event) => {
            return Err(InvalidTransition {
                from,
                event: event.name(),
            });
        }
    };
    debug!(next = %outcome.state, "confirm::apply: transition accepted");
    Ok(outcome)
}

/// Apply one event directly to a session record
pub fn apply_to_session(session: &mut Session, event: &ConfirmEvent) -> Result<(), InvalidTransition> {
    debug!(id = %session.id, event = event.name(), "confirm::apply_to_session: called");
    let outcome = apply(session.confirm_state, session.reschedule_state, event)?;
    match outcome.effect {
        Effect::ClearReason => session.clear_reason(),
        Effect::StoreReason(reason) => session.set_reason(reason),
        Effect::CaptureReason(reason) => session.capture_reason(reason),
        Effect::ApplySchedule { window, resources } => session.set_schedule(window, resources),
        Effect::KeepReason => {}
    }
    session.set_confirmation(outcome.state, outcome.reschedule);
    Ok(())
}
