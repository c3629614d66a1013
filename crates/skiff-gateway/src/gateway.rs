//! Listeners, accept loops, and the session table.

use crate::config::GatewayConfig;
use crate::connection::{
    read_tcp_message, ClientConnection, CloseReason, TcpClientConnection, TransportProtocol,
    WsClientConnection,
};
use crate::error::{GatewayError, GatewayResult};
use crate::router::{RouterFactory, SessionMetadata};
use crate::session::{
    CloseCommand, SessionActor, SESSION_CLIENT_CLOSED_TAG, SESSION_IDLE_TAG, SESSION_INBOUND_TAG,
};
use bytes::Bytes;
use futures::StreamExt;
use skiff_core::envelope::Payload;
use skiff_core::handle::ActorHandle;
use skiff_core::io::{TimeProvider, WallClockTime};
use skiff_runtime::system::{ActorSystem, CreateOptions};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Addresses the gateway actually bound.
#[derive(Debug, Clone, Copy)]
pub struct GatewayAddrs {
    pub tcp: Option<SocketAddr>,
    pub ws: Option<SocketAddr>,
}

/// Operator-visible session row.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub protocol: TransportProtocol,
    pub remote_addr: SocketAddr,
    pub connected_at_ms: u64,
    pub actor_handle: ActorHandle,
}

struct GatewayInner {
    system: ActorSystem,
    config: GatewayConfig,
    router_factory: Arc<dyn RouterFactory>,
    sessions: tokio::sync::RwLock<HashMap<String, SessionInfo>>,
    token: CancellationToken,
    time: Arc<dyn TimeProvider>,
    accept_tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Accepts external TCP and WebSocket clients and binds each to a
/// session actor.
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Validate the configuration and assemble a gateway. Listeners start
    /// on [`Gateway::start`].
    pub fn new(
        system: ActorSystem,
        config: GatewayConfig,
        router_factory: Arc<dyn RouterFactory>,
    ) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(GatewayInner {
                system,
                config,
                router_factory,
                sessions: tokio::sync::RwLock::new(HashMap::new()),
                token: CancellationToken::new(),
                time: Arc::new(WallClockTime::new()),
                accept_tasks: std::sync::Mutex::new(Vec::new()),
            }),
        })
    }

    /// Bind the enabled listeners and start their accept loops.
    pub async fn start(&self) -> GatewayResult<GatewayAddrs> {
        let mut addrs = GatewayAddrs { tcp: None, ws: None };

        if self.inner.config.tcp_enable {
            let listener = self.bind_tcp_listener()?;
            addrs.tcp = Some(listener.local_addr()?);
            let inner = Arc::clone(&self.inner);
            let task = tokio::spawn(tcp_accept_loop(inner, listener));
            self.inner
                .accept_tasks
                .lock()
                .expect("accept task lock poisoned")
                .push(task);
        }

        if self.inner.config.ws_enable {
            let addr = format!(
                "{}:{}",
                self.inner.config.ws_host, self.inner.config.ws_port
            );
            let listener = TcpListener::bind(&addr).await?;
            addrs.ws = Some(listener.local_addr()?);
            let inner = Arc::clone(&self.inner);
            let task = tokio::spawn(ws_accept_loop(inner, listener));
            self.inner
                .accept_tasks
                .lock()
                .expect("accept task lock poisoned")
                .push(task);
        }

        info!(tcp = ?addrs.tcp, ws = ?addrs.ws, "gateway listening");
        Ok(addrs)
    }

    fn bind_tcp_listener(&self) -> GatewayResult<TcpListener> {
        let config = &self.inner.config;
        let addr: SocketAddr = format!("{}:{}", config.tcp_address, config.tcp_port)
            .parse()
            .map_err(|e| {
                GatewayError::invalid_configuration("tcp_address", format!("unparseable: {e}"))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        if let Err(e) = socket.set_recv_buffer_size(config.receive_buffer_bytes as u32) {
            debug!(error = %e, "could not size receive buffer");
        }
        socket.bind(addr)?;
        Ok(socket.listen(config.tcp_backlog)?)
    }

    /// Live sessions.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.inner.sessions.read().await.values().cloned().collect()
    }

    /// Stop listeners, close every live session, and clear the table.
    pub async fn stop(&self) {
        info!("gateway stopping");
        self.inner.token.cancel();

        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self
                .inner
                .accept_tasks
                .lock()
                .expect("accept task lock poisoned");
            guard.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }

        let sessions: Vec<SessionInfo> = {
            let mut table = self.inner.sessions.write().await;
            table.drain().map(|(_, info)| info).collect()
        };
        for info in sessions {
            let _ = self
                .inner
                .system
                .send(
                    info.actor_handle,
                    CloseCommand::payload(CloseReason::ServerShutdown),
                )
                .await;
        }
    }
}

// =============================================================================
// TCP listener
// =============================================================================

async fn tcp_accept_loop(inner: Arc<GatewayInner>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = inner.token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        if let Err(e) = handle_tcp_client(inner, stream, addr).await {
                            debug!(peer = %addr, error = %e, "tcp session ended");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "tcp accept failed"),
            },
        }
    }
    debug!("tcp accept loop stopped");
}

async fn handle_tcp_client(
    inner: Arc<GatewayInner>,
    stream: TcpStream,
    addr: SocketAddr,
) -> GatewayResult<()> {
    stream.set_nodelay(true).ok();
    let (mut read_half, write_half) = stream.into_split();

    let connection: Arc<dyn ClientConnection> = Arc::new(TcpClientConnection::new(
        write_half,
        addr,
        inner.config.max_message_bytes,
        inner.time.clone(),
    ));
    let metadata = SessionMetadata {
        session_id: Uuid::new_v4().to_string(),
        protocol: TransportProtocol::Tcp,
        remote_addr: addr,
        connected_at_ms: inner.time.now_ms(),
    };

    let handle = spawn_session(&inner, connection.clone(), metadata.clone()).await?;

    let max = inner.config.max_message_bytes;
    loop {
        tokio::select! {
            _ = inner.token.cancelled() => break,
            message = read_tcp_message(&mut read_half, max) => match message {
                Ok(Some(bytes)) => {
                    if inner
                        .system
                        .send(handle, Payload::new(SESSION_INBOUND_TAG, bytes))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    notify_client_closed(&inner, handle).await;
                    break;
                }
                Err(GatewayError::ProtocolViolation { reason }) => {
                    debug!(session = %metadata.session_id, %reason, "tcp framing violation");
                    let _ = inner
                        .system
                        .send(handle, CloseCommand::payload(CloseReason::ProtocolViolation))
                        .await;
                    break;
                }
                Err(_) => {
                    notify_client_closed(&inner, handle).await;
                    break;
                }
            },
        }
    }

    // On gateway stop the table is drained by `stop`, which still needs
    // the entry to enqueue the ServerShutdown close.
    if !inner.token.is_cancelled() {
        inner.sessions.write().await.remove(&metadata.session_id);
    }
    Ok(())
}

// =============================================================================
// WebSocket listener
// =============================================================================

async fn ws_accept_loop(inner: Arc<GatewayInner>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = inner.token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        if let Err(e) = handle_ws_client(inner, stream, addr).await {
                            debug!(peer = %addr, error = %e, "ws session ended");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "ws accept failed"),
            },
        }
    }
    debug!("ws accept loop stopped");
}

async fn handle_ws_client(
    inner: Arc<GatewayInner>,
    stream: TcpStream,
    addr: SocketAddr,
) -> GatewayResult<()> {
    let expected_path = inner.config.normalized_ws_path();
    let check_path = move |request: &Request, response: Response| {
        let requested = request.uri().path();
        let normalized = if requested.ends_with('/') {
            requested.to_string()
        } else {
            format!("{requested}/")
        };
        if normalized == expected_path {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("not found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(inner.config.max_message_bytes);
    ws_config.max_frame_size = Some(inner.config.max_message_bytes);
    let ws_stream = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        check_path,
        Some(ws_config),
    )
    .await
    .map_err(|e| GatewayError::WebSocket {
        reason: e.to_string(),
    })?;
    let (sink, mut source) = ws_stream.split();

    let connection: Arc<dyn ClientConnection> =
        Arc::new(WsClientConnection::new(sink, addr, inner.time.clone()));
    let metadata = SessionMetadata {
        session_id: Uuid::new_v4().to_string(),
        protocol: TransportProtocol::WebSocket,
        remote_addr: addr,
        connected_at_ms: inner.time.now_ms(),
    };

    let handle = spawn_session(&inner, connection.clone(), metadata.clone()).await?;

    loop {
        tokio::select! {
            _ = inner.token.cancelled() => break,
            message = source.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    if inner
                        .system
                        .send(handle, Payload::new(SESSION_INBOUND_TAG, Bytes::from(data)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if inner
                        .system
                        .send(
                            handle,
                            Payload::new(SESSION_INBOUND_TAG, Bytes::from(text.into_bytes())),
                        )
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    notify_client_closed(&inner, handle).await;
                    break;
                }
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    // Oversized reassembly and malformed frames land here.
                    debug!(session = %metadata.session_id, error = %e, "ws protocol error");
                    let _ = inner
                        .system
                        .send(handle, CloseCommand::payload(CloseReason::ProtocolViolation))
                        .await;
                    break;
                }
            },
        }
    }

    if !inner.token.is_cancelled() {
        inner.sessions.write().await.remove(&metadata.session_id);
    }
    Ok(())
}

// =============================================================================
// Shared session plumbing
// =============================================================================

async fn spawn_session(
    inner: &Arc<GatewayInner>,
    connection: Arc<dyn ClientConnection>,
    metadata: SessionMetadata,
) -> GatewayResult<ActorHandle> {
    let factory = inner.router_factory.clone();
    let actor_connection = connection.clone();
    let actor_metadata = metadata.clone();
    let actor_ref = inner
        .system
        .create(
            move || {
                Ok(SessionActor::new(
                    actor_connection,
                    actor_metadata,
                    factory.as_ref(),
                ))
            },
            CreateOptions::default(),
        )
        .await
        .map_err(GatewayError::Runtime)?;
    let handle = actor_ref.handle();

    inner.sessions.write().await.insert(
        metadata.session_id.clone(),
        SessionInfo {
            session_id: metadata.session_id.clone(),
            protocol: metadata.protocol,
            remote_addr: metadata.remote_addr,
            connected_at_ms: metadata.connected_at_ms,
            actor_handle: handle,
        },
    );

    tokio::spawn(idle_monitor(
        Arc::clone(inner),
        handle,
        connection,
        metadata.session_id.clone(),
    ));

    debug!(session = %metadata.session_id, handle = %handle, "session started");
    Ok(handle)
}

async fn notify_client_closed(inner: &Arc<GatewayInner>, handle: ActorHandle) {
    let _ = inner
        .system
        .send(handle, Payload::new(SESSION_CLIENT_CLOSED_TAG, Bytes::new()))
        .await;
}

/// Wakes once per idle interval, so the effective detection bound is
/// twice the configured timeout.
async fn idle_monitor(
    inner: Arc<GatewayInner>,
    handle: ActorHandle,
    connection: Arc<dyn ClientConnection>,
    session_id: String,
) {
    let idle_ms = inner.config.idle_timeout_ms;
    loop {
        tokio::select! {
            _ = inner.token.cancelled() => break,
            _ = inner.time.sleep_ms(idle_ms) => {}
        }

        let age = inner
            .time
            .monotonic_ms()
            .saturating_sub(connection.last_activity_ms());
        if age >= idle_ms {
            debug!(session = %session_id, age_ms = age, "session idle");
            let _ = inner
                .system
                .send(handle, Payload::new(SESSION_IDLE_TAG, Bytes::new()))
                .await;
            break;
        }

        // The session actor going away ends the monitor.
        if !inner.system.is_local(handle) {
            break;
        }
    }
}
