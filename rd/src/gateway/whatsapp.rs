//! WhatsApp bridge client
//!
//! Implements the NotificationGateway trait against an HTTP bridge that
//! relays messages to WhatsApp. Transient failures are retried with
//! exponential backoff before the error is surfaced to the caller.

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{GatewayError, MessageId, NotificationGateway};
use crate::config::ChannelConfig;
use crate::domain::OutboundPrompt;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// WhatsApp bridge client
#[derive(Debug)]
pub struct WhatsAppGateway {
    endpoint: String,
    token: String,
    http: Client,
    #[allow(dead_code)]
    timeout: Duration,
}

impl WhatsAppGateway {
    /// Create a new client from configuration
    ///
    /// Reads the bridge token from the environment variable named in config.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, GatewayError> {
        debug!(?config, "from_config: called");
        let token = config
            .get_token()
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let timeout = Duration::from_millis(config.timeout_ms);

        let http = Client::builder().timeout(timeout).build().map_err(GatewayError::Network)?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            token,
            http,
            timeout,
        })
    }

    /// Build the request body for the bridge API
    fn build_payload(&self, phone: &str, prompt: &OutboundPrompt) -> serde_json::Value {
        debug!(%phone, template_id = %prompt.template_id, "build_payload: called");
        serde_json::json!({
            "to": phone,
            "message": prompt.text,
        })
    }
}

#[async_trait]
impl NotificationGateway for WhatsAppGateway {
    async fn send(&self, phone: &str, prompt: &OutboundPrompt) -> Result<MessageId, GatewayError> {
        debug!(%phone, template_id = %prompt.template_id, "send: called");
        let url = format!("{}/v1/messages", self.endpoint);
        let body = self.build_payload(phone, prompt);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                let backoff = base + rand::rng().random_range(0..=base / 4);
                warn!(
                    attempt,
                    backoff_ms = backoff,
                    "send: retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .header("authorization", format!("Bearer {}", self.token))
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "send: network error");
                    last_error = Some(GatewayError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                debug!("send: rate limited (429)");
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);

                return Err(GatewayError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "send: retryable error");
                last_error = Some(GatewayError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "send: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(GatewayError::ApiError { status, message: text });
            }

            debug!("send: success");
            let api_response: SendResponse = response.json().await?;
            return Ok(api_response.message_id);
        }

        Err(last_error.unwrap_or_else(|| GatewayError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

// Bridge API response types

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}
