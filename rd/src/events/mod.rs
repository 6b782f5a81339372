//! Event system for roster activity
//!
//! Components emit events describing every confirmation-lifecycle change;
//! consumers (the daemon log task, tests) subscribe through the bus. Events
//! are observational only: no component drives its behavior off the bus.

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use types::RosterEvent;
