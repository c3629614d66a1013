//! The application router contract and the session context it sees.

use crate::connection::{ClientConnection, CloseReason, TransportProtocol};
use async_trait::async_trait;
use bytes::Bytes;
use skiff_core::envelope::Payload;
use skiff_core::error::Result;
use skiff_core::handle::ActorHandle;
use skiff_runtime::system::ActorSystem;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Immutable facts about a session.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    /// Opaque collision-resistant token assigned on accept.
    pub session_id: String,
    /// Which listener the client arrived through.
    pub protocol: TransportProtocol,
    /// Client endpoint.
    pub remote_addr: SocketAddr,
    /// Wall-clock accept time in milliseconds.
    pub connected_at_ms: u64,
}

/// What a router sees: session facts, a per-session state bag, and ways
/// to talk to the client and to the rest of the actor mesh.
pub struct SessionContext {
    metadata: SessionMetadata,
    system: ActorSystem,
    session_handle: ActorHandle,
    connection: std::sync::Arc<dyn ClientConnection>,
    state: Mutex<HashMap<String, serde_json::Value>>,
    bound_actor: AtomicU64,
}

impl SessionContext {
    pub(crate) fn new(
        metadata: SessionMetadata,
        system: ActorSystem,
        session_handle: ActorHandle,
        connection: std::sync::Arc<dyn ClientConnection>,
    ) -> Self {
        Self {
            metadata,
            system,
            session_handle,
            connection,
            state: Mutex::new(HashMap::new()),
            bound_actor: AtomicU64::new(0),
        }
    }

    /// Session facts.
    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    /// The session actor's own handle.
    pub fn session_handle(&self) -> ActorHandle {
        self.session_handle
    }

    /// Store a value in the per-session bag.
    pub fn set_value(&self, key: impl Into<String>, value: serde_json::Value) {
        self.state
            .lock()
            .expect("session state poisoned")
            .insert(key.into(), value);
    }

    /// Read a value from the per-session bag.
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.state
            .lock()
            .expect("session state poisoned")
            .get(key)
            .cloned()
    }

    /// Write raw bytes to the client.
    pub async fn send_bytes(&self, data: Bytes) -> Result<()> {
        self.connection.mark_activity();
        self.connection
            .send(data)
            .await
            .map_err(|e| skiff_core::Error::transport(e.to_string()))
    }

    /// Write a UTF-8 string to the client.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send_bytes(Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    /// Fire-and-forget to another actor, with the session as the sender.
    pub async fn forward(&self, target: ActorHandle, payload: Payload) -> Result<()> {
        self.system
            .send_from(Some(self.session_handle), target, payload)
            .await
    }

    /// Request/response on behalf of the session.
    pub async fn call(
        &self,
        target: ActorHandle,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Payload> {
        self.system
            .call_from(Some(self.session_handle), target, payload, timeout)
            .await
    }

    /// Record an associated actor for routing convenience.
    pub fn bind_actor(&self, handle: ActorHandle) {
        self.bound_actor.store(handle.raw(), Ordering::Relaxed);
    }

    /// The associated actor, if one was bound.
    pub fn bound_actor(&self) -> Option<ActorHandle> {
        let raw = self.bound_actor.load(Ordering::Relaxed);
        (raw != 0).then(|| ActorHandle::from_raw(raw))
    }
}

/// Application-side behavior of a session.
#[async_trait]
pub trait SessionRouter: Send + 'static {
    /// The session actor started and the client is connected.
    async fn on_started(&mut self, _ctx: &SessionContext) -> Result<()> {
        Ok(())
    }

    /// One inbound client message.
    async fn on_message(&mut self, ctx: &SessionContext, data: Bytes) -> Result<()>;

    /// The session is closing. Called exactly once.
    async fn on_closed(&mut self, _ctx: &SessionContext, _reason: CloseReason) {}
}

/// Produces a router per accepted session.
pub trait RouterFactory: Send + Sync + 'static {
    /// Build the router for a new session.
    fn create(&self) -> Box<dyn SessionRouter>;
}

impl<F> RouterFactory for F
where
    F: Fn() -> Box<dyn SessionRouter> + Send + Sync + 'static,
{
    fn create(&self) -> Box<dyn SessionRouter> {
        (self)()
    }
}
