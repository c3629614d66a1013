//! Node identity and descriptors.

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Maximum length of a node ID in bytes.
pub const NODE_ID_LENGTH_BYTES_MAX: usize = 128;

/// Identifier of a cluster node. Stable across restarts of the same
/// physical node.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id with validation.
    pub fn new(id: impl Into<String>) -> RegistryResult<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(RegistryError::InvalidNodeId {
                id,
                reason: "node ID cannot be empty".into(),
            });
        }
        if id.len() > NODE_ID_LENGTH_BYTES_MAX {
            return Err(RegistryError::InvalidNodeId {
                reason: format!(
                    "node ID length {} exceeds limit {}",
                    id.len(),
                    NODE_ID_LENGTH_BYTES_MAX
                ),
                id,
            });
        }
        let valid = id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(RegistryError::InvalidNodeId {
                id,
                reason: "node ID contains invalid characters".into(),
            });
        }

        Ok(Self(id))
    }

    /// The node id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node's identity plus the endpoint its cluster transport listens on.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub endpoint: SocketAddr,
}

impl NodeDescriptor {
    /// Create a descriptor.
    pub fn new(id: NodeId, endpoint: SocketAddr) -> Self {
        Self { id, endpoint }
    }
}
