//! Binary envelope codec.
//!
//! Big-endian layout: message id, from, to, call-type byte, trace id
//! (u16-length string), timestamp, ttl (presence byte + u64), version,
//! payload type tag (u16-length string), payload bytes (u32 length).
//! Serialize then deserialize is the identity on every field.

use crate::error::{ClusterError, ClusterResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use skiff_core::envelope::{CallType, Envelope, Payload};
use skiff_core::handle::ActorHandle;

/// Encode an envelope for the wire.
pub fn encode_envelope(envelope: &Envelope) -> ClusterResult<Bytes> {
    let mut buf = BytesMut::with_capacity(
        64 + envelope.trace_id.len()
            + envelope.payload.type_tag.len()
            + envelope.payload.data.len(),
    );

    buf.put_u64(envelope.message_id);
    buf.put_u64(envelope.from.raw());
    buf.put_u64(envelope.to.raw());
    buf.put_u8(envelope.call_type.as_u8());
    put_string(&mut buf, &envelope.trace_id)?;
    buf.put_u64(envelope.timestamp_ms);
    match envelope.ttl_ms {
        Some(ttl) => {
            buf.put_u8(1);
            buf.put_u64(ttl);
        }
        None => buf.put_u8(0),
    }
    buf.put_u16(envelope.version);
    put_string(&mut buf, &envelope.payload.type_tag)?;
    if envelope.payload.data.len() > u32::MAX as usize {
        return Err(ClusterError::codec("payload too large for wire format"));
    }
    buf.put_u32(envelope.payload.data.len() as u32);
    buf.put_slice(&envelope.payload.data);

    Ok(buf.freeze())
}

/// Decode an envelope from the wire.
pub fn decode_envelope(mut buf: Bytes) -> ClusterResult<Envelope> {
    let message_id = take_u64(&mut buf)?;
    let from = ActorHandle::from_raw(take_u64(&mut buf)?);
    let to = ActorHandle::from_raw(take_u64(&mut buf)?);
    let call_type = CallType::from_u8(take_u8(&mut buf)?)
        .map_err(|e| ClusterError::codec(e.to_string()))?;
    let trace_id = take_string(&mut buf)?;
    let timestamp_ms = take_u64(&mut buf)?;
    let ttl_ms = match take_u8(&mut buf)? {
        0 => None,
        1 => Some(take_u64(&mut buf)?),
        other => {
            return Err(ClusterError::codec(format!(
                "invalid ttl presence byte: {other}"
            )))
        }
    };
    let version = take_u16(&mut buf)?;
    let type_tag = take_string(&mut buf)?;
    let data_len = take_u32(&mut buf)? as usize;
    if buf.remaining() < data_len {
        return Err(ClusterError::codec("truncated payload"));
    }
    let data = buf.split_to(data_len);

    Ok(Envelope {
        message_id,
        from,
        to,
        call_type,
        payload: Payload { type_tag, data },
        trace_id,
        timestamp_ms,
        ttl_ms,
        version,
    })
}

/// Encode the handshake payload: this node's id.
pub fn encode_handshake(node_id: &str) -> ClusterResult<Bytes> {
    let mut buf = BytesMut::with_capacity(2 + node_id.len());
    put_string(&mut buf, node_id)?;
    Ok(buf.freeze())
}

/// Decode a handshake payload.
pub fn decode_handshake(mut buf: Bytes) -> ClusterResult<String> {
    take_string(&mut buf)
}

fn put_string(buf: &mut BytesMut, value: &str) -> ClusterResult<()> {
    if value.len() > u16::MAX as usize {
        return Err(ClusterError::codec(format!(
            "string of {} bytes too long for wire format",
            value.len()
        )));
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn take_string(buf: &mut Bytes) -> ClusterResult<String> {
    let len = take_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(ClusterError::codec("truncated string"));
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|e| ClusterError::codec(e.to_string()))
}

fn take_u8(buf: &mut Bytes) -> ClusterResult<u8> {
    if buf.remaining() < 1 {
        return Err(ClusterError::codec("truncated frame"));
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut Bytes) -> ClusterResult<u16> {
    if buf.remaining() < 2 {
        return Err(ClusterError::codec("truncated frame"));
    }
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut Bytes) -> ClusterResult<u32> {
    if buf.remaining() < 4 {
        return Err(ClusterError::codec("truncated frame"));
    }
    Ok(buf.get_u32())
}

fn take_u64(buf: &mut Bytes) -> ClusterResult<u64> {
    if buf.remaining() < 8 {
        return Err(ClusterError::codec("truncated frame"));
    }
    Ok(buf.get_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::constants::PROTOCOL_VERSION;

    fn envelope(ttl_ms: Option<u64>) -> Envelope {
        Envelope {
            message_id: 99,
            from: ActorHandle::from_raw(10),
            to: ActorHandle::from_raw(20),
            call_type: CallType::Call,
            payload: Payload::new("game.move", Bytes::from_static(b"{\"x\":1}")),
            trace_id: "trace-abc".into(),
            timestamp_ms: 1_700_000_000_000,
            ttl_ms,
            version: PROTOCOL_VERSION,
        }
    }

    #[test]
    fn test_envelope_round_trip_is_identity() {
        for ttl in [None, Some(5_000)] {
            let original = envelope(ttl);
            let decoded = decode_envelope(encode_envelope(&original).unwrap()).unwrap();

            assert_eq!(decoded.message_id, original.message_id);
            assert_eq!(decoded.from, original.from);
            assert_eq!(decoded.to, original.to);
            assert_eq!(decoded.call_type, original.call_type);
            assert_eq!(decoded.payload, original.payload);
            assert_eq!(decoded.trace_id, original.trace_id);
            assert_eq!(decoded.timestamp_ms, original.timestamp_ms);
            assert_eq!(decoded.ttl_ms, original.ttl_ms);
            assert_eq!(decoded.version, original.version);
        }
    }

    #[test]
    fn test_none_sender_round_trips() {
        let mut original = envelope(None);
        original.from = ActorHandle::NONE;
        let decoded = decode_envelope(encode_envelope(&original).unwrap()).unwrap();
        assert!(decoded.from.is_none());
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let encoded = encode_envelope(&envelope(None)).unwrap();
        let truncated = encoded.slice(0..encoded.len() - 3);
        assert!(decode_envelope(truncated).is_err());
    }

    #[test]
    fn test_handshake_round_trip() {
        let encoded = encode_handshake("game-node-7").unwrap();
        assert_eq!(decode_handshake(encoded).unwrap(), "game-node-7");
    }
}
