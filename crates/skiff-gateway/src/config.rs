//! Gateway configuration.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use skiff_core::constants::{
    GATEWAY_MESSAGE_SIZE_BYTES_MAX_DEFAULT, GATEWAY_RECEIVE_BUFFER_BYTES_MIN,
    IDLE_TIMEOUT_MS_DEFAULT,
};

/// Configuration for the client gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Enable the length-framed TCP listener.
    #[serde(default = "default_true")]
    pub tcp_enable: bool,

    /// TCP listener bind address.
    #[serde(default = "default_any_host")]
    pub tcp_address: String,

    /// TCP listener port. Zero picks an ephemeral port.
    #[serde(default)]
    pub tcp_port: u16,

    /// TCP accept backlog.
    #[serde(default = "default_backlog")]
    pub tcp_backlog: u32,

    /// Enable the WebSocket listener.
    #[serde(default)]
    pub ws_enable: bool,

    /// WebSocket listener bind host.
    #[serde(default = "default_any_host")]
    pub ws_host: String,

    /// Host advertised to clients. Defaults to `ws_host` when empty.
    #[serde(default)]
    pub ws_public_host: String,

    /// WebSocket listener port. Zero picks an ephemeral port.
    #[serde(default)]
    pub ws_port: u16,

    /// WebSocket upgrade path; normalized to end with `/`.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum client message size in bytes, both directions.
    #[serde(default = "default_max_message")]
    pub max_message_bytes: usize,

    /// Socket receive buffer size in bytes.
    #[serde(default = "default_receive_buffer")]
    pub receive_buffer_bytes: usize,

    /// Session idle timeout in milliseconds. The idle monitor wakes once
    /// per interval, so detection can lag up to twice this value.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_any_host() -> String {
    "0.0.0.0".to_string()
}

fn default_backlog() -> u32 {
    1024
}

fn default_ws_path() -> String {
    "/ws/".to_string()
}

fn default_max_message() -> usize {
    GATEWAY_MESSAGE_SIZE_BYTES_MAX_DEFAULT
}

fn default_receive_buffer() -> usize {
    64 * 1024
}

fn default_idle_timeout() -> u64 {
    IDLE_TIMEOUT_MS_DEFAULT
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tcp_enable: true,
            tcp_address: default_any_host(),
            tcp_port: 0,
            tcp_backlog: default_backlog(),
            ws_enable: false,
            ws_host: default_any_host(),
            ws_public_host: String::new(),
            ws_port: 0,
            ws_path: default_ws_path(),
            max_message_bytes: default_max_message(),
            receive_buffer_bytes: default_receive_buffer(),
            idle_timeout_ms: default_idle_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> GatewayResult<()> {
        if !self.tcp_enable && !self.ws_enable {
            return Err(GatewayError::invalid_configuration(
                "tcp_enable/ws_enable",
                "at least one listener must be enabled",
            ));
        }
        if self.max_message_bytes == 0 || self.max_message_bytes > i32::MAX as usize {
            return Err(GatewayError::invalid_configuration(
                "max_message_bytes",
                format!("{} outside (0, {}]", self.max_message_bytes, i32::MAX),
            ));
        }
        if self.receive_buffer_bytes < GATEWAY_RECEIVE_BUFFER_BYTES_MIN {
            return Err(GatewayError::invalid_configuration(
                "receive_buffer_bytes",
                format!(
                    "{} below minimum {}",
                    self.receive_buffer_bytes, GATEWAY_RECEIVE_BUFFER_BYTES_MIN
                ),
            ));
        }
        if self.idle_timeout_ms == 0 {
            return Err(GatewayError::invalid_configuration(
                "idle_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// The upgrade path with the trailing slash guaranteed.
    pub fn normalized_ws_path(&self) -> String {
        if self.ws_path.ends_with('/') {
            self.ws_path.clone()
        } else {
            format!("{}/", self.ws_path)
        }
    }

    /// Host clients should be told to connect to.
    pub fn public_ws_host(&self) -> &str {
        if self.ws_public_host.is_empty() {
            &self.ws_host
        } else {
            &self.ws_public_host
        }
    }
}
