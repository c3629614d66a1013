//! Remote call faults.
//!
//! When a remotely dispatched Call ends in an error or cancellation, the
//! serving node replies with a fault payload instead of a result. The
//! calling node translates it back into a cancellation or a
//! remote-dispatch error.

use serde::{Deserialize, Serialize};
use skiff_core::envelope::Payload;
use skiff_core::error::Error;

/// Reserved payload type tag for faults on the return path.
pub const REMOTE_FAULT_TYPE_TAG: &str = "remote-call-fault";

/// Fault shipped back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCallFault {
    /// True when the remote outcome was a cancellation rather than an
    /// error.
    pub cancelled: bool,
    /// Short tag identifying the error kind.
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
}

impl RemoteCallFault {
    /// Build a fault from a local error outcome.
    pub fn from_error(error: &Error) -> Self {
        Self {
            cancelled: error.is_cancellation(),
            error_type: error.type_tag().to_string(),
            message: error.to_string(),
        }
    }

    /// Encode as a payload with the reserved type tag.
    pub fn to_payload(&self) -> Payload {
        Payload::json(REMOTE_FAULT_TYPE_TAG, self)
            .unwrap_or_else(|_| Payload::new(REMOTE_FAULT_TYPE_TAG, bytes::Bytes::new()))
    }

    /// Decode from a payload, if it carries the reserved tag.
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        if payload.type_tag != REMOTE_FAULT_TYPE_TAG {
            return None;
        }
        payload.decode_json().ok()
    }

    /// Translate into the error the caller observes.
    pub fn into_error(self) -> Error {
        if self.cancelled {
            Error::Cancelled
        } else {
            Error::RemoteDispatch {
                error_type: self.error_type,
                message: self.message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_payload_round_trip() {
        let fault = RemoteCallFault {
            cancelled: false,
            error_type: "not-found".into(),
            message: "actor not found: handle 9".into(),
        };
        let payload = fault.to_payload();
        let back = RemoteCallFault::from_payload(&payload).unwrap();
        assert_eq!(back.error_type, "not-found");
        assert!(!back.cancelled);
    }

    #[test]
    fn test_ordinary_payload_is_not_a_fault() {
        let payload = Payload::new("game.state", bytes::Bytes::from_static(b"{}"));
        assert!(RemoteCallFault::from_payload(&payload).is_none());
    }

    #[test]
    fn test_cancellation_translates_to_cancelled() {
        let fault = RemoteCallFault::from_error(&Error::Cancelled);
        assert!(fault.cancelled);
        assert!(matches!(fault.into_error(), Error::Cancelled));
    }

    #[test]
    fn test_error_translates_to_remote_dispatch() {
        let fault = RemoteCallFault::from_error(&Error::actor_not_found(5));
        let err = fault.into_error();
        assert!(matches!(err, Error::RemoteDispatch { .. }));
        assert!(err.to_string().contains("handle 5"));
    }
}
