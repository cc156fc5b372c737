//! Error types for the Blockchain.com Exchange client

use crate::messages::OrderValidationError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum BcxError {
    // === Connection Errors ===
    /// Failed to establish the WebSocket connection
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Connection attempt timed out
    #[error("Connection timeout after {timeout:?} to {url}")]
    ConnectionTimeout { url: String, timeout: Duration },

    /// No live connection to send on
    #[error("Not connected")]
    NotConnected,

    /// Writing a frame to the socket failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    // === Protocol Errors ===
    /// Failed to decode an inbound frame
    #[error("Invalid message: {message}")]
    InvalidMessage { message: String, raw: Option<String> },

    /// Book sequence numbers are not contiguous
    #[error("Sequence gap for {symbol}: expected {expected}, received {received}")]
    SequenceGap {
        symbol: String,
        expected: u64,
        received: u64,
    },

    // === Subscription Errors ===
    /// Subscription was rejected by the server
    #[error("Subscription rejected for {channel}: {reason}")]
    SubscriptionRejected { channel: String, reason: String },

    /// Channel needs a symbol, or must not have one
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    // === Authentication Errors ===
    /// Private channel requested without credentials
    #[error("Channel {channel} requires authentication")]
    AuthRequired { channel: String },

    /// Authentication was rejected
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    // === Trading Errors ===
    /// Order failed client-side validation
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] OrderValidationError),

    // === Internal Errors ===
    /// Internal channel was closed unexpectedly
    #[error("Internal channel closed unexpectedly")]
    ChannelClosed,

    /// Client is shutting down
    #[error("Shutdown in progress")]
    ShuttingDown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BcxError {
    /// Create a sequence gap error
    pub fn sequence_gap(symbol: impl Into<String>, expected: u64, received: u64) -> Self {
        Self::SequenceGap {
            symbol: symbol.into(),
            expected,
            received,
        }
    }

    /// Create a subscription rejected error
    pub fn subscription_rejected(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionRejected {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for client operations
pub type BcxResult<T> = Result<T, BcxError>;
