//! Runtime limits and protocol constants.
//!
//! All limits are explicit and carry their unit in the name.

// =============================================================================
// Protocol
// =============================================================================

/// Current envelope protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Reserved handle value meaning "no actor".
pub const HANDLE_NONE_VALUE: u64 = 0;

/// Default per-node offset for auto-allocated handles.
pub const HANDLE_OFFSET_DEFAULT: u64 = 0;

/// First message id allocated by a fresh actor system.
pub const MESSAGE_ID_FIRST: u64 = 1;

// =============================================================================
// Naming
// =============================================================================

/// Maximum length of a registered actor name in bytes.
pub const ACTOR_NAME_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of a payload type tag in bytes.
pub const PAYLOAD_TYPE_TAG_LENGTH_BYTES_MAX: usize = 1024;

// =============================================================================
// Timeouts
// =============================================================================

/// Default request/response call timeout in milliseconds (30 sec).
pub const CALL_TIMEOUT_MS_DEFAULT: u64 = 30 * 1000;

/// Default peer connect timeout in milliseconds (5 sec).
pub const CONNECT_TIMEOUT_MS_DEFAULT: u64 = 5 * 1000;

/// Default cluster heartbeat interval in milliseconds (10 sec).
pub const CLUSTER_HEARTBEAT_INTERVAL_MS_DEFAULT: u64 = 10 * 1000;

/// Default gateway idle timeout in milliseconds (1 min).
pub const IDLE_TIMEOUT_MS_DEFAULT: u64 = 60 * 1000;

// =============================================================================
// Message sizes
// =============================================================================

/// Default maximum cluster frame payload in bytes (16 MB).
pub const FRAME_SIZE_BYTES_MAX_DEFAULT: usize = 16 * 1024 * 1024;

/// Default maximum gateway client message in bytes (1 MB).
pub const GATEWAY_MESSAGE_SIZE_BYTES_MAX_DEFAULT: usize = 1024 * 1024;

/// Minimum gateway receive buffer in bytes.
pub const GATEWAY_RECEIVE_BUFFER_BYTES_MIN: usize = 1024;

// =============================================================================
// Dynamic registry
// =============================================================================

/// Default registration TTL in milliseconds (30 sec).
pub const REGISTRATION_TTL_MS_DEFAULT: u64 = 30 * 1000;

/// Default registration refresh interval in milliseconds (10 sec).
pub const REGISTRY_HEARTBEAT_INTERVAL_MS_DEFAULT: u64 = 10 * 1000;

/// Default registry lookup cache TTL in milliseconds (5 sec).
pub const REGISTRY_CACHE_TTL_MS_DEFAULT: u64 = 5 * 1000;
