//! Actor system configuration.

use serde::{Deserialize, Serialize};
use skiff_core::constants::HANDLE_OFFSET_DEFAULT;
use skiff_core::error::{Error, Result};

/// Configuration for an actor system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSystemConfig {
    /// Identifier of this process in the cluster.
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Offset for auto-allocated handles; partitions the handle space
    /// across nodes so handles can double as cluster addresses.
    #[serde(default)]
    pub handle_offset: u64,

    /// Bounded mailbox capacity. `None` keeps the default unbounded
    /// mailboxes; `Some(n)` makes enqueue wait for capacity.
    #[serde(default)]
    pub bounded_mailbox: Option<usize>,
}

fn default_node_id() -> String {
    "local".to_string()
}

impl Default for ActorSystemConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            handle_offset: HANDLE_OFFSET_DEFAULT,
            bounded_mailbox: None,
        }
    }
}

impl ActorSystemConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(Error::invalid_configuration(
                "node_id",
                "must not be empty",
            ));
        }
        if self.bounded_mailbox == Some(0) {
            return Err(Error::invalid_configuration(
                "bounded_mailbox",
                "capacity must be positive",
            ));
        }
        Ok(())
    }
}

/// Configuration for the in-process transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InProcessTransportConfig {
    /// When true (the default), local delivery bypasses the dispatch queue
    /// and writes straight into the target mailbox.
    #[serde(default = "default_short_circuit")]
    pub short_circuit_local_delivery: bool,
}

fn default_short_circuit() -> bool {
    true
}

impl Default for InProcessTransportConfig {
    fn default() -> Self {
        Self {
            short_circuit_local_delivery: default_short_circuit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ActorSystemConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ActorSystemConfig {
            bounded_mailbox: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
