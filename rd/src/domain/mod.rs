//! Domain types for the roster daemon
//!
//! Core domain types: Session, RescheduleProposal, Conversation.
//! All implement the Record trait for RosterStore persistence.
//!
//! A Session is one scheduled teaching slot of any kind (PBL tutorial, CSR
//! rotation, large lecture, practicum, journal reading, other). Its
//! confirmation state is only ever mutated through the transition table in
//! `crate::confirm`.

mod conversation;
mod id;
mod proposal;
mod session;
mod window;

pub use conversation::{Conversation, ConvoState, OutboundPrompt};
pub use id::generate_id;
pub use proposal::{ProposalStatus, RescheduleProposal};
pub use session::{ConfirmState, RescheduleState, Resources, Session, SessionDetail, SessionKind};
pub use window::{TimeWindow, UNIT_MINUTES};

// Re-export rosterstore types for convenience
pub use rosterstore::{Filter, FilterOp, IndexValue, Record, Store};
