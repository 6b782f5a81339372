//! Gateway error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the messaging channel
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Channel API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid channel response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Check if a later re-delivery of the same prompt can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::RateLimited { .. } => true,
            GatewayError::ApiError { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            GatewayError::Network(_) => true,
            GatewayError::InvalidResponse(_) => false,
        }
    }

    /// Get the retry duration if the channel told us to back off
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
