//! Gateway error types.

use thiserror::Error;

/// Gateway errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("websocket error: {reason}")]
    WebSocket { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Runtime(#[from] skiff_core::Error),
}

impl GatewayError {
    /// Create an invalid-configuration error.
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a protocol-violation error.
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
