//! Point-to-point TCP links between cluster nodes.
//!
//! One duplex connection per peer carries envelopes and heartbeats.
//! Requests are correlated to replies through a pending-call table keyed
//! by message id. The connection owns its socket halves, read loop, and
//! heartbeat loop; cancelling its token tears all of them down. The
//! transport owns the peer-table entry.
//!
//! Peer loss does not purge the pending-call table: each pending call is
//! resolved by its own timeout or cancellation, which leaves room for a
//! reconnecting peer to still deliver a reply.

use crate::codec;
use crate::config::ClusterTransportConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::fault::RemoteCallFault;
use crate::frame::{self, FrameType};
use async_trait::async_trait;
use skiff_core::envelope::{CallType, Envelope};
use skiff_core::error::{Error, Result};
use skiff_core::promise::{response_channel, ResponsePromise};
use skiff_registry::node::NodeId;
use skiff_registry::registry::ClusterRegistry;
use skiff_runtime::transport::{CallReply, Transport};
use skiff_runtime::system::WeakActorSystem;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct PeerConnection {
    node_id: NodeId,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    token: CancellationToken,
}

impl PeerConnection {
    /// Frames are written under the connection mutex, so per-peer wire
    /// order follows write order.
    async fn write_frame(&self, frame_type: FrameType, payload: &[u8]) -> ClusterResult<()> {
        let mut writer = self.writer.lock().await;
        frame::write_frame(&mut *writer, frame_type, payload).await
    }
}

/// TCP transport for cross-node envelopes.
pub struct ClusterTransport {
    node_id: NodeId,
    config: ClusterTransportConfig,
    registry: OnceLock<Arc<dyn ClusterRegistry>>,
    system: OnceLock<WeakActorSystem>,
    weak_self: OnceLock<Weak<ClusterTransport>>,
    peers: tokio::sync::RwLock<HashMap<NodeId, Arc<PeerConnection>>>,
    connect_locks: tokio::sync::Mutex<HashMap<NodeId, Arc<tokio::sync::Mutex<()>>>>,
    pending: Mutex<HashMap<u64, ResponsePromise>>,
    local_addr: SocketAddr,
    token: CancellationToken,
}

impl ClusterTransport {
    /// Bind the peer listener and start accepting connections. Attach the
    /// registry with [`ClusterTransport::set_registry`] once every node's
    /// endpoint is known, then hand the transport to
    /// `ActorSystemBuilder::with_transport`.
    pub async fn bind(
        node_id: NodeId,
        config: ClusterTransportConfig,
    ) -> ClusterResult<Arc<Self>> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address).await?;
        let local_addr = listener.local_addr()?;

        let transport = Arc::new(Self {
            node_id,
            config,
            registry: OnceLock::new(),
            system: OnceLock::new(),
            weak_self: OnceLock::new(),
            peers: tokio::sync::RwLock::new(HashMap::new()),
            connect_locks: tokio::sync::Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            local_addr,
            token: CancellationToken::new(),
        });
        let _ = transport.weak_self.set(Arc::downgrade(&transport));

        tokio::spawn(Arc::clone(&transport).accept_loop(listener));
        info!(node = %transport.node_id, addr = %local_addr, "cluster transport listening");
        Ok(transport)
    }

    /// The listener's bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Attach the cluster registry used for outbound routing. Called once
    /// after construction; later calls are ignored.
    pub fn set_registry(&self, registry: Arc<dyn ClusterRegistry>) {
        let _ = self.registry.set(registry);
    }

    fn registry(&self) -> ClusterResult<&Arc<dyn ClusterRegistry>> {
        self.registry.get().ok_or_else(|| {
            ClusterError::InvalidConfiguration {
                field: "registry".into(),
                reason: "no cluster registry attached".into(),
            }
        })
    }

    fn upgrade_self(&self) -> Option<Arc<Self>> {
        self.weak_self.get().and_then(Weak::upgrade)
    }

    fn system(&self) -> Option<skiff_runtime::system::ActorSystem> {
        self.system.get().and_then(WeakActorSystem::upgrade)
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let transport = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = transport.handle_inbound(stream).await {
                                debug!(peer = %addr, error = %e, "inbound connection ended");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                },
            }
        }
        debug!(node = %self.node_id, "accept loop stopped");
    }

    /// Inbound handshake: read the peer's node id first, then reply with
    /// our own. No envelopes flow before this completes.
    async fn handle_inbound(self: Arc<Self>, stream: TcpStream) -> ClusterResult<()> {
        stream.set_nodelay(true).ok();
        let (mut read_half, write_half) = stream.into_split();

        let (frame_type, payload) =
            frame::read_frame(&mut read_half, self.config.max_frame_bytes).await?;
        if frame_type != FrameType::Handshake {
            return Err(ClusterError::protocol_violation(
                "expected handshake before any other frame",
            ));
        }
        let peer_id = NodeId::new(codec::decode_handshake(payload)?)?;

        let conn = Arc::new(PeerConnection {
            node_id: peer_id.clone(),
            writer: tokio::sync::Mutex::new(write_half),
            token: self.token.child_token(),
        });
        conn.write_frame(
            FrameType::Handshake,
            &codec::encode_handshake(self.node_id.as_str())?,
        )
        .await?;

        debug!(node = %self.node_id, peer = %peer_id, "accepted peer connection");
        self.install_connection(conn.clone()).await;
        self.spawn_connection_tasks(conn, read_half);
        Ok(())
    }

    /// Outbound connection under the per-peer double-checked lock.
    async fn connect_to(&self, peer: &NodeId) -> ClusterResult<Arc<PeerConnection>> {
        if let Some(conn) = self.peers.read().await.get(peer) {
            return Ok(conn.clone());
        }

        let lock = {
            let mut locks = self.connect_locks.lock().await;
            locks
                .entry(peer.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        if let Some(conn) = self.peers.read().await.get(peer) {
            return Ok(conn.clone());
        }

        let descriptor = self
            .registry()?
            .try_get_node(peer)
            .await?
            .ok_or_else(|| ClusterError::NodeUnknown {
                node_id: peer.to_string(),
            })?;

        let connect = TcpStream::connect(descriptor.endpoint);
        let stream = match tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            connect,
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                // Leave the slot empty so a later send retries.
                return Err(ClusterError::ConnectFailed {
                    node_id: peer.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ClusterError::ConnectFailed {
                    node_id: peer.to_string(),
                    reason: format!("timed out after {}ms", self.config.connect_timeout_ms),
                });
            }
        };
        stream.set_nodelay(true).ok();
        let (mut read_half, write_half) = stream.into_split();

        let conn = Arc::new(PeerConnection {
            node_id: peer.clone(),
            writer: tokio::sync::Mutex::new(write_half),
            token: self.token.child_token(),
        });

        // Outbound side sends its handshake first and waits for the reply.
        conn.write_frame(
            FrameType::Handshake,
            &codec::encode_handshake(self.node_id.as_str())?,
        )
        .await?;
        let (frame_type, payload) =
            frame::read_frame(&mut read_half, self.config.max_frame_bytes).await?;
        if frame_type != FrameType::Handshake {
            return Err(ClusterError::protocol_violation(
                "expected handshake reply",
            ));
        }
        let replied = codec::decode_handshake(payload)?;
        if replied != peer.as_str() {
            return Err(ClusterError::protocol_violation(format!(
                "handshake node id {replied:?} does not match expected {peer}"
            )));
        }

        debug!(node = %self.node_id, peer = %peer, endpoint = %descriptor.endpoint, "connected to peer");
        self.install_connection(conn.clone()).await;
        if let Some(transport) = self.upgrade_self() {
            transport.spawn_connection_tasks(conn.clone(), read_half);
        }
        Ok(conn)
    }

    async fn install_connection(&self, conn: Arc<PeerConnection>) {
        let mut peers = self.peers.write().await;
        if let Some(previous) = peers.insert(conn.node_id.clone(), conn) {
            previous.token.cancel();
        }
    }

    fn spawn_connection_tasks(self: Arc<Self>, conn: Arc<PeerConnection>, read_half: OwnedReadHalf) {
        if self.config.heartbeat_interval_ms > 0 {
            tokio::spawn(heartbeat_loop(
                conn.clone(),
                self.config.heartbeat_interval_ms,
            ));
        }
        tokio::spawn(self.read_loop(conn, read_half));
    }

    async fn read_loop(self: Arc<Self>, conn: Arc<PeerConnection>, mut read_half: OwnedReadHalf) {
        loop {
            tokio::select! {
                _ = conn.token.cancelled() => break,
                result = frame::read_frame(&mut read_half, self.config.max_frame_bytes) => match result {
                    Ok((FrameType::Heartbeat, _)) => continue,
                    Ok((FrameType::Envelope, payload)) => match codec::decode_envelope(payload) {
                        Ok(envelope) => self.dispatch_inbound(envelope, conn.clone()),
                        Err(e) => {
                            warn!(peer = %conn.node_id, error = %e, "envelope decode failed");
                            break;
                        }
                    },
                    Ok((FrameType::Handshake, _)) => {
                        warn!(peer = %conn.node_id, "handshake after connection established");
                        break;
                    }
                    Err(e) => {
                        debug!(peer = %conn.node_id, error = %e, "connection read ended");
                        break;
                    }
                },
            }
        }
        self.remove_connection(&conn).await;
    }

    async fn remove_connection(&self, conn: &Arc<PeerConnection>) {
        conn.token.cancel();
        let mut peers = self.peers.write().await;
        if let Some(current) = peers.get(&conn.node_id) {
            if Arc::ptr_eq(current, conn) {
                peers.remove(&conn.node_id);
            }
        }
        // Pending calls keyed on this peer stay in the table; their own
        // timeouts or cancellations resolve them.
    }

    // =========================================================================
    // Inbound dispatch
    // =========================================================================

    fn dispatch_inbound(&self, envelope: Envelope, conn: Arc<PeerConnection>) {
        // A matching pending call makes this frame a reply.
        let matched = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&envelope.message_id);
        if let Some(promise) = matched {
            match RemoteCallFault::from_payload(&envelope.payload) {
                Some(fault) => promise.complete(Err(fault.into_error())),
                None => promise.complete(Ok(envelope.payload)),
            };
            return;
        }

        // A reply whose pending entry was already removed has no local
        // target; drop it rather than bouncing faults between nodes.
        if envelope.to.is_none() {
            debug!(message_id = envelope.message_id, "dropping unmatched reply");
            return;
        }

        let Some(system) = self.system() else {
            warn!("inbound envelope before system attach");
            return;
        };

        match envelope.call_type {
            CallType::Send => {
                tokio::spawn(async move {
                    if let Err(e) = system.deliver_local(envelope, None).await {
                        debug!(error = %e, "inbound send delivery failed");
                    }
                });
            }
            CallType::Call => {
                tokio::spawn(async move {
                    let (promise, receiver) = response_channel();
                    let request = envelope.clone();
                    // A failed delivery completes the promise, so the
                    // receiver below observes it either way.
                    let _ = system.deliver_local(envelope, Some(promise)).await;

                    let reply = match receiver.recv().await {
                        Ok(payload) => request.response(payload),
                        Err(e) => request.response(RemoteCallFault::from_error(&e).to_payload()),
                    };
                    match codec::encode_envelope(&reply) {
                        Ok(bytes) => {
                            if let Err(e) = conn.write_frame(FrameType::Envelope, &bytes).await {
                                debug!(peer = %conn.node_id, error = %e, "reply write failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "reply encode failed"),
                    }
                });
            }
        }
    }

    fn take_pending(&self, message_id: u64) -> Option<ResponsePromise> {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&message_id)
    }
}

async fn heartbeat_loop(conn: Arc<PeerConnection>, interval_ms: u64) {
    let interval = Duration::from_millis(interval_ms);
    loop {
        tokio::select! {
            _ = conn.token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if conn.write_frame(FrameType::Heartbeat, &[]).await.is_err() {
            conn.token.cancel();
            break;
        }
    }
}

#[async_trait]
impl Transport for ClusterTransport {
    fn bind(&self, system: WeakActorSystem) {
        let _ = self.system.set(system);
    }

    async fn send(&self, envelope: Envelope, reply: Option<CallReply>) -> Result<()> {
        // Local targets short-circuit into the actor system.
        if let Some(system) = self.system() {
            if system.is_local(envelope.to) {
                return match reply {
                    Some(CallReply { promise, cancel }) => {
                        if cancel.is_cancelled() {
                            promise.complete(Err(Error::Cancelled));
                            Ok(())
                        } else {
                            system.deliver_local(envelope, Some(promise)).await
                        }
                    }
                    None => system.deliver_local(envelope, None).await,
                };
            }
        }

        let registry = match self.registry() {
            Ok(registry) => registry.clone(),
            Err(e) => {
                if let Some(CallReply { promise, .. }) = &reply {
                    promise.complete(Err(Error::transport(e.to_string())));
                }
                return Err(e.into());
            }
        };
        let location = registry
            .try_resolve_by_handle(envelope.to)
            .await
            .map_err(|e| Error::registry(e.to_string()))?;
        let Some(location) = location else {
            let err = Error::actor_not_found(envelope.to.raw());
            if let Some(CallReply { promise, .. }) = &reply {
                promise.complete(Err(Error::actor_not_found(envelope.to.raw())));
            }
            return Err(err);
        };

        // Correlation entry plus its cancellation registration: tripping
        // the caller's token removes the entry and cancels the promise.
        let message_id = envelope.message_id;
        if let Some(CallReply { promise, cancel }) = &reply {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .insert(message_id, promise.clone());

            let weak = self.weak_self.get().cloned();
            let cancel = cancel.clone();
            let transport_token = self.token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Some(transport) = weak.and_then(|w| w.upgrade()) {
                            if let Some(promise) = transport.take_pending(message_id) {
                                promise.complete(Err(Error::Cancelled));
                            }
                        }
                    }
                    _ = transport_token.cancelled() => {}
                }
            });
        }

        let conn = match self.connect_to(&location.node_id).await {
            Ok(conn) => conn,
            Err(e) => {
                if let Some(promise) = self.take_pending(message_id) {
                    promise.complete(Err(Error::transport(e.to_string())));
                }
                return Err(e.into());
            }
        };

        let bytes = match codec::encode_envelope(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Some(promise) = self.take_pending(message_id) {
                    promise.complete(Err(Error::transport(e.to_string())));
                }
                return Err(e.into());
            }
        };
        if let Err(e) = conn.write_frame(FrameType::Envelope, &bytes).await {
            // A dead socket fails this send; the slot clears for retry.
            self.remove_connection(&conn).await;
            if let Some(promise) = self.take_pending(message_id) {
                promise.complete(Err(Error::transport(e.to_string())));
            }
            return Err(e.into());
        }

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!(node = %self.node_id, "cluster transport shutting down");
        self.token.cancel();

        let drained: Vec<ResponsePromise> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            pending.drain().map(|(_, promise)| promise).collect()
        };
        for promise in drained {
            promise.complete(Err(Error::Cancelled));
        }

        self.peers.write().await.clear();
        Ok(())
    }
}
