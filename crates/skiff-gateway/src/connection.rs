//! Client connection abstraction.
//!
//! TCP clients speak `[4-byte big-endian length][payload]`; WebSocket
//! clients speak binary or text messages. Both surface as the same
//! [`ClientConnection`] to the session layer.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::SplitSink;
use futures::SinkExt;
use skiff_core::io::TimeProvider;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Which listener a session arrived through.
#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TransportProtocol {
    Tcp,
    WebSocket,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CloseReason {
    /// The client went away.
    ClientDisconnected,
    /// The client broke the framing rules.
    ProtocolViolation,
    /// The idle monitor expired the session.
    HeartbeatTimeout,
    /// The gateway is stopping.
    ServerShutdown,
    /// An actor asked for the close.
    Requested,
    /// An internal error closed the session.
    Error,
}

/// Outbound half of a client connection plus activity bookkeeping.
#[async_trait]
pub trait ClientConnection: Send + Sync {
    /// Write one message to the client.
    async fn send(&self, data: Bytes) -> GatewayResult<()>;

    /// Close the connection. Idempotent.
    async fn close(&self);

    /// Record client or server activity for the idle monitor.
    fn mark_activity(&self);

    /// Monotonic timestamp of the last recorded activity.
    fn last_activity_ms(&self) -> u64;

    /// The client's remote endpoint.
    fn remote_addr(&self) -> SocketAddr;
}

// =============================================================================
// TCP
// =============================================================================

/// Length-framed TCP client connection.
pub struct TcpClientConnection {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    remote_addr: SocketAddr,
    max_message_bytes: usize,
    last_activity_ms: AtomicU64,
    time: Arc<dyn TimeProvider>,
}

impl TcpClientConnection {
    /// Wrap the write half of an accepted client socket.
    pub fn new(
        writer: OwnedWriteHalf,
        remote_addr: SocketAddr,
        max_message_bytes: usize,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let now = time.monotonic_ms();
        Self {
            writer: tokio::sync::Mutex::new(writer),
            remote_addr,
            max_message_bytes,
            last_activity_ms: AtomicU64::new(now),
            time,
        }
    }
}

#[async_trait]
impl ClientConnection for TcpClientConnection {
    async fn send(&self, data: Bytes) -> GatewayResult<()> {
        if data.len() > self.max_message_bytes {
            return Err(GatewayError::protocol_violation(format!(
                "outbound message of {} bytes exceeds maximum {}",
                data.len(),
                self.max_message_bytes
            )));
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn mark_activity(&self) {
        self.last_activity_ms
            .store(self.time.monotonic_ms(), Ordering::Relaxed);
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

/// Read one length-framed message. `Ok(None)` means the client closed
/// cleanly; a negative or oversized length is a protocol violation.
pub async fn read_tcp_message<R>(
    reader: &mut R,
    max_message_bytes: usize,
) -> GatewayResult<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = i32::from_be_bytes(len_bytes);
    if length < 0 {
        return Err(GatewayError::protocol_violation(format!(
            "negative message length: {length}"
        )));
    }
    let length = length as usize;
    if length > max_message_bytes {
        return Err(GatewayError::protocol_violation(format!(
            "message length {length} exceeds maximum {max_message_bytes}"
        )));
    }

    let mut payload = BytesMut::zeroed(length);
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload.freeze()))
}

// =============================================================================
// WebSocket
// =============================================================================

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// WebSocket client connection.
pub struct WsClientConnection {
    sink: tokio::sync::Mutex<WsSink>,
    remote_addr: SocketAddr,
    last_activity_ms: AtomicU64,
    time: Arc<dyn TimeProvider>,
}

impl WsClientConnection {
    /// Wrap the sink half of an upgraded WebSocket stream.
    pub fn new(sink: WsSink, remote_addr: SocketAddr, time: Arc<dyn TimeProvider>) -> Self {
        let now = time.monotonic_ms();
        Self {
            sink: tokio::sync::Mutex::new(sink),
            remote_addr,
            last_activity_ms: AtomicU64::new(now),
            time,
        }
    }
}

#[async_trait]
impl ClientConnection for WsClientConnection {
    async fn send(&self, data: Bytes) -> GatewayResult<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| GatewayError::WebSocket {
                reason: e.to_string(),
            })
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }

    fn mark_activity(&self) {
        self.last_activity_ms
            .store(self.time.monotonic_ms(), Ordering::Relaxed);
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_framed_message() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(b"hello");

        let mut reader = Cursor::new(buf);
        let message = read_tcp_message(&mut reader, 1024).await.unwrap().unwrap();
        assert_eq!(&message[..], b"hello");
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let mut reader = Cursor::new(Vec::new());
        assert!(read_tcp_message(&mut reader, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_negative_length_is_violation() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-5i32).to_be_bytes());

        let mut reader = Cursor::new(buf);
        assert!(matches!(
            read_tcp_message(&mut reader, 1024).await,
            Err(GatewayError::ProtocolViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_is_violation() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&4096u32.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4096]);

        let mut reader = Cursor::new(buf);
        assert!(matches!(
            read_tcp_message(&mut reader, 1024).await,
            Err(GatewayError::ProtocolViolation { .. })
        ));
    }
}
