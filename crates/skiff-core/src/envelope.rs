//! Message envelopes and payloads.

use crate::error::{Error, Result};
use crate::handle::ActorHandle;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Delivery mode of an envelope.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum CallType {
    /// Fire-and-forget delivery.
    Send,
    /// Request/response invocation with a completion promise.
    Call,
}

impl CallType {
    /// Wire representation.
    pub fn as_u8(self) -> u8 {
        match self {
            CallType::Send => 0,
            CallType::Call => 1,
        }
    }

    /// Decode the wire representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CallType::Send),
            1 => Ok(CallType::Call),
            other => Err(Error::serialization(format!(
                "invalid call type byte: {other}"
            ))),
        }
    }
}

/// Opaque message payload: a type tag plus raw bytes.
///
/// The tag is a string sufficient to locate the decoder at the peer; the
/// core never inspects the bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Payload {
    /// Decoder tag, e.g. `"echo.request"`.
    pub type_tag: String,
    /// Encoded payload bytes.
    pub data: Bytes,
}

impl Payload {
    /// Create a payload from a tag and raw bytes.
    pub fn new(type_tag: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            type_tag: type_tag.into(),
            data: data.into(),
        }
    }

    /// The empty payload used for void replies.
    pub fn empty() -> Self {
        Self {
            type_tag: String::new(),
            data: Bytes::new(),
        }
    }

    /// True when both tag and bytes are empty.
    pub fn is_empty(&self) -> bool {
        self.type_tag.is_empty() && self.data.is_empty()
    }

    /// Encode a serde value as a JSON payload under the given tag.
    pub fn json<T: Serialize>(type_tag: impl Into<String>, value: &T) -> Result<Self> {
        let data = serde_json::to_vec(value).map_err(|e| Error::serialization(e.to_string()))?;
        Ok(Self::new(type_tag, data))
    }

    /// Decode the payload bytes as JSON, checking the type tag first.
    pub fn decode_json_as<T: DeserializeOwned>(&self, expected_tag: &str) -> Result<T> {
        if self.type_tag != expected_tag {
            return Err(Error::PayloadType {
                expected: expected_tag.to_string(),
                actual: self.type_tag.clone(),
            });
        }
        self.decode_json()
    }

    /// Decode the payload bytes as JSON without a tag check.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.data).map_err(|e| Error::serialization(e.to_string()))
    }
}

/// Metadata record wrapping a payload in transit.
///
/// Envelopes are constructed by the actor system so message-id allocation
/// and trace propagation stay consistent; transports only decode them.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Monotonic per-process message id.
    pub message_id: u64,
    /// Sender handle, `NONE` when the message has no actor sender.
    pub from: ActorHandle,
    /// Recipient handle.
    pub to: ActorHandle,
    /// Delivery mode.
    pub call_type: CallType,
    /// Opaque payload.
    pub payload: Payload,
    /// Trace id propagated across asynchronous flow.
    pub trace_id: String,
    /// Origin wall-clock timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Optional time-to-live in milliseconds.
    pub ttl_ms: Option<u64>,
    /// Protocol version.
    pub version: u16,
}

impl Envelope {
    /// Derive the reply to this envelope: parties swapped, same message id,
    /// call type forced to `Call` so the correlation layer can match it.
    pub fn response(&self, payload: Payload) -> Envelope {
        Envelope {
            message_id: self.message_id,
            from: self.to,
            to: self.from,
            call_type: CallType::Call,
            payload,
            trace_id: self.trace_id.clone(),
            timestamp_ms: self.timestamp_ms,
            ttl_ms: self.ttl_ms,
            version: self.version,
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "msg {} {}->{} ({:?}, {})",
            self.message_id, self.from, self.to, self.call_type, self.payload.type_tag
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PROTOCOL_VERSION;

    fn envelope() -> Envelope {
        Envelope {
            message_id: 7,
            from: ActorHandle::from_raw(10),
            to: ActorHandle::from_raw(20),
            call_type: CallType::Call,
            payload: Payload::new("test.ping", Bytes::from_static(b"ping")),
            trace_id: "trace-1".into(),
            timestamp_ms: 1000,
            ttl_ms: Some(250),
            version: PROTOCOL_VERSION,
        }
    }

    #[test]
    fn test_response_swaps_parties_and_keeps_id() {
        let env = envelope();
        let resp = env.response(Payload::new("test.pong", Bytes::from_static(b"pong")));

        assert_eq!(resp.message_id, env.message_id);
        assert_eq!(resp.from, env.to);
        assert_eq!(resp.to, env.from);
        assert_eq!(resp.call_type, CallType::Call);
    }

    #[test]
    fn test_response_of_response_restores_orientation() {
        let env = envelope();
        let once = env.response(Payload::empty());
        let twice = once.response(Payload::empty());

        assert_eq!(twice.from, env.from);
        assert_eq!(twice.to, env.to);
        assert_eq!(twice.message_id, env.message_id);
    }

    #[test]
    fn test_payload_json_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Ping {
            n: u32,
        }

        let payload = Payload::json("test.ping", &Ping { n: 3 }).unwrap();
        let decoded: Ping = payload.decode_json_as("test.ping").unwrap();
        assert_eq!(decoded, Ping { n: 3 });
    }

    #[test]
    fn test_payload_tag_mismatch() {
        let payload = Payload::json("test.ping", &1u32).unwrap();
        let result = payload.decode_json_as::<u32>("test.pong");
        assert!(matches!(result, Err(Error::PayloadType { .. })));
    }

    #[test]
    fn test_call_type_round_trip() {
        assert_eq!(
            CallType::from_u8(CallType::Send.as_u8()).unwrap(),
            CallType::Send
        );
        assert_eq!(
            CallType::from_u8(CallType::Call.as_u8()).unwrap(),
            CallType::Call
        );
        assert!(CallType::from_u8(9).is_err());
    }
}
