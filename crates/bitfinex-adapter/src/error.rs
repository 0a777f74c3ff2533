/*
[INPUT]:  Error sources (HTTP, API, serialization, WebSocket, subscriptions)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

use crate::ws::SubscriptionKey;

/// Main error type for the Bitfinex adapter
#[derive(Error, Debug)]
pub enum BitfinexError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Operation requires an established WebSocket connection
    #[error("WebSocket not connected")]
    NotConnected,

    /// A live subscription for the key already exists
    #[error("Already subscribed: {key}")]
    DuplicateSubscription { key: SubscriptionKey },

    /// No active subscription for the key
    #[error("Not subscribed: {key}")]
    NotSubscribed { key: SubscriptionKey },

    /// The exchange rejected the subscription, or it was torn down before activating
    #[error("Subscription failed: {key}")]
    SubscriptionFailed { key: SubscriptionKey },

    /// Candle period outside the supported set (60, 300, 900, 3600 seconds)
    #[error("Unsupported timeframe: {period_secs}s")]
    UnsupportedTimeframe { period_secs: u32 },

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BitfinexError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            BitfinexError::Http(_)
            | BitfinexError::WebSocket(_)
            | BitfinexError::NotConnected
            | BitfinexError::InvalidResponse(_) => true,
            BitfinexError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if the error reflects a caller-side subscription mistake
    pub fn is_subscription_error(&self) -> bool {
        matches!(
            self,
            BitfinexError::DuplicateSubscription { .. }
                | BitfinexError::NotSubscribed { .. }
                | BitfinexError::SubscriptionFailed { .. }
                | BitfinexError::UnsupportedTimeframe { .. }
        )
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        BitfinexError::Api {
            status: status.as_u16(),
            message: message.into(),
        }
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, BitfinexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let server_err = BitfinexError::api_error(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(server_err.is_retryable());

        let client_err = BitfinexError::api_error(StatusCode::BAD_REQUEST, "bad symbol");
        assert!(!client_err.is_retryable());

        assert!(BitfinexError::NotConnected.is_retryable());
        assert!(!BitfinexError::UnsupportedTimeframe { period_secs: 120 }.is_retryable());
    }

    #[test]
    fn test_error_is_subscription_error() {
        let dup = BitfinexError::DuplicateSubscription {
            key: SubscriptionKey::trades("BTCUSD"),
        };
        assert!(dup.is_subscription_error());
        assert!(!BitfinexError::NotConnected.is_subscription_error());
    }

    #[test]
    fn test_api_error_creation() {
        let err = BitfinexError::api_error(StatusCode::BAD_REQUEST, "Invalid symbol");
        match err {
            BitfinexError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid symbol");
            }
            _ => panic!("Expected Api error variant"),
        }
    }
}
