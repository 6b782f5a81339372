//! Registry messages
//!
//! Commands and responses for the actor pattern.

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::oneshot;

use rosterstore::StoreError;

use crate::confirm::InvalidTransition;
use crate::domain::{ConfirmState, Conversation, ProposalStatus, RescheduleProposal, Session, SessionKind};

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The window/resources clash with an already-persisted session
    #[error("schedule conflicts with session '{other_id}'")]
    Conflict { other_id: String },

    /// The confirmation state machine rejected the event
    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("proposal '{0}' is not pending")]
    ProposalNotPending(String),

    /// A version-guarded write kept losing after internal retries
    #[error("concurrent modification on '{0}'")]
    ConcurrentModification(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("channel error")]
    ChannelError,
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            // NotFound is part of the call taxonomy, not a storage fault
            StoreError::NotFound { collection, id } => RegistryError::NotFound(format!("{collection} {id}")),
            other => RegistryError::Store(other),
        }
    }
}

/// Response from registry operations
pub type RegistryResponse<T> = Result<T, RegistryError>;

/// Commands sent to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    // Session operations
    CreateSession {
        session: Session,
        reply: oneshot::Sender<RegistryResponse<Session>>,
    },
    GetSession {
        id: String,
        reply: oneshot::Sender<RegistryResponse<Session>>,
    },
    UpdateSession {
        session: Session,
        reply: oneshot::Sender<RegistryResponse<Session>>,
    },
    ListSessions {
        date_filter: Option<NaiveDate>,
        kind_filter: Option<SessionKind>,
        state_filter: Option<ConfirmState>,
        resource_filter: Option<String>,
        reply: oneshot::Sender<RegistryResponse<Vec<Session>>>,
    },

    // Reschedule proposal operations
    CreateProposal {
        proposal: RescheduleProposal,
        reply: oneshot::Sender<RegistryResponse<RescheduleProposal>>,
    },
    GetProposal {
        id: String,
        reply: oneshot::Sender<RegistryResponse<RescheduleProposal>>,
    },
    ListProposals {
        session_filter: Option<String>,
        status_filter: Option<ProposalStatus>,
        reply: oneshot::Sender<RegistryResponse<Vec<RescheduleProposal>>>,
    },
    ApproveProposal {
        id: String,
        reply: oneshot::Sender<RegistryResponse<Session>>,
    },
    RejectProposal {
        id: String,
        reply: oneshot::Sender<RegistryResponse<Session>>,
    },

    // Conversation operations
    CreateConversation {
        conversation: Conversation,
        reply: oneshot::Sender<RegistryResponse<Conversation>>,
    },
    GetConversation {
        id: String,
        reply: oneshot::Sender<RegistryResponse<Conversation>>,
    },
    UpdateConversation {
        conversation: Conversation,
        reply: oneshot::Sender<RegistryResponse<Conversation>>,
    },
    ListConversations {
        phone_filter: Option<String>,
        staff_filter: Option<String>,
        session_filter: Option<String>,
        active_filter: Option<bool>,
        reply: oneshot::Sender<RegistryResponse<Vec<Conversation>>>,
    },

    // Shutdown
    Shutdown,
}
