//! Session registry with actor pattern
//!
//! The registry actor owns the roster store and processes commands via
//! channels. Conflict checks and the paired insert/update run inside a
//! single actor turn, so two racing creations can never both pass the
//! check and then both commit overlapping sessions.

mod manager;
mod messages;

pub use manager::SessionRegistry;
pub use messages::{RegistryCommand, RegistryError, RegistryResponse};
