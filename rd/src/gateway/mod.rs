//! Notification gateway - outbound messaging channel
//!
//! The conversation engine talks to staff through this interface. The
//! daemon wires in the WhatsApp-style HTTP client or the console fallback;
//! tests use the recording mock. The engine never sees transport details,
//! only a `MessageId` or a typed error with a retryability verdict.

use async_trait::async_trait;

mod console;
mod error;
mod whatsapp;

pub use console::ConsoleGateway;
pub use error::GatewayError;
pub use whatsapp::WhatsAppGateway;

use crate::domain::OutboundPrompt;

/// Channel-assigned id of a delivered message
pub type MessageId = String;

/// Outbound side of the messaging channel
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver one rendered prompt to a phone number.
    ///
    /// Implementations retry transient failures internally with backoff;
    /// an error that still comes back tells the caller via
    /// [`GatewayError::is_retryable`] whether a later re-delivery of the
    /// same prompt can succeed.
    async fn send(&self, phone: &str, prompt: &OutboundPrompt) -> Result<MessageId, GatewayError>;
}
