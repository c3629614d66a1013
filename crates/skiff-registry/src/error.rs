//! Registry error types.

use thiserror::Error;

/// Registry-specific errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("invalid node ID: {id}, reason: {reason}")]
    InvalidNodeId { id: String, reason: String },

    #[error("name {name:?} already claimed by node {owner_node}")]
    NameAlreadyClaimed { name: String, owner_node: String },

    #[error("name {name:?} is declared for a different location")]
    NameMismatch { name: String },

    #[error("invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("backend error: {reason}")]
    Backend { reason: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RegistryError {
    /// Create a node-not-found error.
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<RegistryError> for skiff_core::Error {
    fn from(e: RegistryError) -> Self {
        skiff_core::Error::registry(e.to_string())
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
