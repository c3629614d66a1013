//! Cluster transport error types.

use thiserror::Error;

/// Cluster transport errors.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    #[error("codec error: {reason}")]
    Codec { reason: String },

    #[error("node unknown: {node_id}")]
    NodeUnknown { node_id: String },

    #[error("connect to {node_id} failed: {reason}")]
    ConnectFailed { node_id: String, reason: String },

    #[error("connection to {node_id} closed")]
    ConnectionClosed { node_id: String },

    #[error("invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("registry error: {0}")]
    Registry(#[from] skiff_registry::RegistryError),
}

impl ClusterError {
    /// Create a protocol-violation error.
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Create a codec error.
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }
}

impl From<ClusterError> for skiff_core::Error {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::Io(io) => skiff_core::Error::Io(io),
            other => skiff_core::Error::transport(other.to_string()),
        }
    }
}

/// Result type for cluster transport operations.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts_to_core_io() {
        let err = ClusterError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(matches!(
            skiff_core::Error::from(err),
            skiff_core::Error::Io(_)
        ));
    }
}
