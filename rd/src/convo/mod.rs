//! Conversation engine - confirmation dialogues over the messaging channel
//!
//! One dialogue walks a staff member from the initial "can you attend?"
//! prompt to a final decision (accept, decline with reason, or reschedule
//! with reason), then feeds that decision into the session state machine.
//!
//! An actor routes work so each conversation has exactly one writer:
//! starts, sweeps, and phone resolution run in the actor turn, while reply
//! processing and re-delivery run on a per-conversation worker task that
//! handles jobs strictly in arrival order.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::registry::RegistryError;

mod engine;
pub mod prompts;
pub mod reply;
mod sweeper;

pub use engine::ConvoEngine;
pub use prompts::PromptCatalog;
pub use reply::{ReplyAction, classify};
pub use sweeper::spawn_sweeper;

/// Errors from conversation operations
#[derive(Debug, Error)]
pub enum ConvoError {
    #[error("an active conversation for staff '{staff_id}' on session '{session_id}' already exists")]
    ConversationExists { staff_id: String, session_id: String },

    #[error("no active conversation for phone '{0}'")]
    NoActiveConversation(String),

    #[error("conversation '{0}' is closed")]
    Closed(String),

    #[error("conversation '{0}' has no prompt recorded yet")]
    NoPromptRecorded(String),

    #[error("template error: {0}")]
    Template(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("channel error")]
    ChannelError,
}
