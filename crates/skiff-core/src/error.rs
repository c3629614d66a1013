//! Error types shared across the runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime error types.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Actor lookup / registration
    // =========================================================================
    #[error("actor not found: handle {handle}")]
    ActorNotFound { handle: u64 },

    #[error("actor not found: name {name:?}")]
    NameNotFound { name: String },

    #[error("name already registered: {name:?}")]
    NameAlreadyRegistered { name: String },

    #[error("handle already in use: {handle}")]
    HandleAlreadyInUse { handle: u64 },

    #[error("invalid handle: {value}")]
    InvalidHandle { value: u64 },

    #[error("invalid actor name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    // =========================================================================
    // Lifecycle
    // =========================================================================
    #[error("actor start failed: handle {handle}, reason: {reason}")]
    ActorStartFailed { handle: u64, reason: String },

    #[error("mailbox closed: handle {handle}")]
    MailboxClosed { handle: u64 },

    // =========================================================================
    // Calls
    // =========================================================================
    #[error("call timed out after {timeout_ms}ms: handle {handle}")]
    CallTimeout { handle: u64, timeout_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("remote dispatch failed ({error_type}): {message}")]
    RemoteDispatch { error_type: String, message: String },

    #[error("payload type mismatch: expected {expected:?}, got {actual:?}")]
    PayloadType { expected: String, actual: String },

    // =========================================================================
    // Configuration / infrastructure
    // =========================================================================
    #[error("invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("registry error: {reason}")]
    Registry { reason: String },

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an actor-not-found error from a raw handle value.
    pub fn actor_not_found(handle: u64) -> Self {
        Self::ActorNotFound { handle }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a registry error.
    pub fn registry(reason: impl Into<String>) -> Self {
        Self::Registry {
            reason: reason.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// True for cancellation-shaped outcomes (caller cancel or timeout).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::CallTimeout { .. })
    }

    /// Short type tag used when shipping this error across the wire.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::ActorNotFound { .. } | Self::NameNotFound { .. } => "not-found",
            Self::Cancelled | Self::CallTimeout { .. } => "cancelled",
            Self::MailboxClosed { .. } => "mailbox-closed",
            Self::PayloadType { .. } => "payload-type",
            Self::Io(_) => "io",
            Self::Transport { .. } => "transport",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::actor_not_found(42);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_is_cancellation() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::CallTimeout {
            handle: 1,
            timeout_ms: 100
        }
        .is_cancellation());
        assert!(!Error::actor_not_found(1).is_cancellation());
    }
}
