//! Rosterd - conflict-checked session roster with staff confirmations
//!
//! Rosterd keeps an academic teaching roster consistent: every session
//! lands in a registry that rejects room and staff double-bookings at
//! write time, and each scheduled staff member confirms or declines over
//! a WhatsApp-style channel through a guided conversation. Declined slots
//! can route through admin-approved reschedule proposals.
//!
//! # Core Concepts
//!
//! - **Single Writer**: one registry actor owns the store; every check
//!   and its paired write happen in the same actor turn
//! - **Guided Conversations**: staff answer fixed menus, so replies stay
//!   machine-readable without any language processing
//! - **Re-deliverable Prompts**: the last prompt of every conversation is
//!   stored verbatim and can be re-sent after channel failures
//! - **Derived Schedules**: session end times are computed from a unit
//!   count, never stored, so they cannot drift
//!
//! # Modules
//!
//! - [`registry`] - Session registry actor and its calling handle
//! - [`conflict`] - Schedule overlap detection
//! - [`confirm`] - Confirmation state machine
//! - [`convo`] - Conversation engine, prompt catalog, expiry sweeper
//! - [`gateway`] - Outbound notification channel
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod confirm;
pub mod conflict;
pub mod convo;
pub mod daemon;
pub mod domain;
pub mod events;
pub mod gateway;
pub mod ipc;
pub mod registry;

// Re-export commonly used types
pub use config::{ChannelConfig, Config, ConversationConfig, LoggingConfig, PromptsConfig, RegistryConfig, StoreConfig};
pub use confirm::{ConfirmEvent, InvalidTransition};
pub use conflict::{find_conflict, has_conflict};
pub use convo::{ConvoEngine, ConvoError, PromptCatalog, ReplyAction, classify, spawn_sweeper};
pub use daemon::{DaemonManager, DaemonStatus, InstanceLock};
pub use domain::{
    ConfirmState, Conversation, ConvoState, Filter, FilterOp, IndexValue, OutboundPrompt, ProposalStatus, Record,
    RescheduleProposal, RescheduleState, Resources, Session, SessionDetail, SessionKind, Store, TimeWindow,
    UNIT_MINUTES, generate_id,
};
pub use gateway::{ConsoleGateway, GatewayError, MessageId, NotificationGateway, WhatsAppGateway};
pub use ipc::{DaemonClient, DaemonRequest, DaemonResponse};
pub use registry::{RegistryCommand, RegistryError, RegistryResponse, SessionRegistry};

// Events module re-exports
pub use events::{EventBus, EventEmitter, RosterEvent, create_event_bus};
