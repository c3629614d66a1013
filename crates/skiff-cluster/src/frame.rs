//! Wire framing between cluster nodes.
//!
//! Each frame is `[1-byte type][4-byte big-endian length][payload]`.
//! A negative length, an oversized length, or an unknown type is a
//! protocol violation and terminates the connection.

use crate::error::{ClusterError, ClusterResult};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame discriminator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FrameType {
    /// Node-id exchange before any envelope may flow.
    Handshake,
    /// A codec-encoded envelope.
    Envelope,
    /// Empty keep-alive frame.
    Heartbeat,
}

impl FrameType {
    /// Wire byte.
    pub fn as_u8(self) -> u8 {
        match self {
            FrameType::Handshake => 1,
            FrameType::Envelope => 2,
            FrameType::Heartbeat => 3,
        }
    }

    /// Decode the wire byte.
    pub fn from_u8(value: u8) -> ClusterResult<Self> {
        match value {
            1 => Ok(FrameType::Handshake),
            2 => Ok(FrameType::Envelope),
            3 => Ok(FrameType::Heartbeat),
            other => Err(ClusterError::protocol_violation(format!(
                "unknown frame type: {other}"
            ))),
        }
    }
}

/// Write one frame and flush.
pub async fn write_frame<W>(
    writer: &mut W,
    frame_type: FrameType,
    payload: &[u8],
) -> ClusterResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > i32::MAX as usize {
        return Err(ClusterError::protocol_violation(format!(
            "frame payload of {} bytes exceeds the wire format",
            payload.len()
        )));
    }

    let mut header = [0u8; 5];
    header[0] = frame_type.as_u8();
    header[1..5].copy_from_slice(&(payload.len() as i32).to_be_bytes());

    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, rejecting negative and oversized lengths.
pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> ClusterResult<(FrameType, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let frame_type = FrameType::from_u8(reader.read_u8().await?)?;

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let length = i32::from_be_bytes(len_bytes);

    if length < 0 {
        return Err(ClusterError::protocol_violation(format!(
            "negative frame length: {length}"
        )));
    }
    let length = length as usize;
    if length > max_payload {
        return Err(ClusterError::protocol_violation(format!(
            "frame length {length} exceeds maximum {max_payload}"
        )));
    }

    let mut payload = BytesMut::zeroed(length);
    reader.read_exact(&mut payload).await?;
    Ok((frame_type, payload.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let mut writer = Cursor::new(Vec::new());
        write_frame(&mut writer, FrameType::Envelope, b"payload")
            .await
            .unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let (frame_type, payload) = read_frame(&mut reader, 1024).await.unwrap();
        assert_eq!(frame_type, FrameType::Envelope);
        assert_eq!(&payload[..], b"payload");
    }

    #[tokio::test]
    async fn test_empty_heartbeat() {
        let mut writer = Cursor::new(Vec::new());
        write_frame(&mut writer, FrameType::Heartbeat, &[])
            .await
            .unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let (frame_type, payload) = read_frame(&mut reader, 1024).await.unwrap();
        assert_eq!(frame_type, FrameType::Heartbeat);
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_negative_length_rejected() {
        let mut buf = vec![FrameType::Envelope.as_u8()];
        buf.extend_from_slice(&(-1i32).to_be_bytes());

        let mut reader = Cursor::new(buf);
        let result = read_frame(&mut reader, 1024).await;
        assert!(matches!(
            result,
            Err(ClusterError::ProtocolViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let mut buf = vec![FrameType::Envelope.as_u8()];
        buf.extend_from_slice(&2048i32.to_be_bytes());
        buf.extend_from_slice(&[0u8; 2048]);

        let mut reader = Cursor::new(buf);
        let result = read_frame(&mut reader, 1024).await;
        assert!(matches!(
            result,
            Err(ClusterError::ProtocolViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let mut buf = vec![9u8];
        buf.extend_from_slice(&0i32.to_be_bytes());

        let mut reader = Cursor::new(buf);
        let result = read_frame(&mut reader, 1024).await;
        assert!(matches!(
            result,
            Err(ClusterError::ProtocolViolation { .. })
        ));
    }
}
