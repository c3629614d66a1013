//! Cluster transport configuration.

use crate::error::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use skiff_core::constants::{
    CLUSTER_HEARTBEAT_INTERVAL_MS_DEFAULT, CONNECT_TIMEOUT_MS_DEFAULT, FRAME_SIZE_BYTES_MAX_DEFAULT,
};
use std::net::SocketAddr;

/// Configuration for the TCP cluster transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTransportConfig {
    /// Address the peer listener binds. Port 0 picks an ephemeral port.
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Peer connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Heartbeat cadence in milliseconds. Zero disables heartbeats.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Maximum accepted frame payload in bytes.
    #[serde(default = "default_max_frame")]
    pub max_frame_bytes: usize,
}

fn default_bind_address() -> SocketAddr {
    "0.0.0.0:0".parse().expect("static address")
}

fn default_connect_timeout() -> u64 {
    CONNECT_TIMEOUT_MS_DEFAULT
}

fn default_heartbeat_interval() -> u64 {
    CLUSTER_HEARTBEAT_INTERVAL_MS_DEFAULT
}

fn default_max_frame() -> usize {
    FRAME_SIZE_BYTES_MAX_DEFAULT
}

impl Default for ClusterTransportConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            connect_timeout_ms: default_connect_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            max_frame_bytes: default_max_frame(),
        }
    }
}

impl ClusterTransportConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.max_frame_bytes == 0 || self.max_frame_bytes > i32::MAX as usize {
            return Err(ClusterError::InvalidConfiguration {
                field: "max_frame_bytes".into(),
                reason: format!("{} outside (0, {}]", self.max_frame_bytes, i32::MAX),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ClusterError::InvalidConfiguration {
                field: "connect_timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
