//! Console delivery fallback
//!
//! Logs outbound prompts instead of sending them. Default provider for
//! local runs where no WhatsApp bridge is configured.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{GatewayError, MessageId, NotificationGateway};
use crate::domain::OutboundPrompt;

/// Gateway that writes prompts to the log
#[derive(Debug, Default)]
pub struct ConsoleGateway;

impl ConsoleGateway {
    pub fn new() -> Self {
        debug!("ConsoleGateway::new: called");
        Self
    }
}

#[async_trait]
impl NotificationGateway for ConsoleGateway {
    async fn send(&self, phone: &str, prompt: &OutboundPrompt) -> Result<MessageId, GatewayError> {
        debug!(%phone, template_id = %prompt.template_id, "send: called");
        info!(%phone, template_id = %prompt.template_id, text = %prompt.text, "console delivery");

        Ok(format!("console-{}", uuid::Uuid::now_v7().simple()))
    }
}
