//! The session actor: owns one client connection and mediates between it
//! and the application router.

use crate::connection::{ClientConnection, CloseReason};
use crate::router::{RouterFactory, SessionContext, SessionMetadata, SessionRouter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skiff_core::envelope::{Envelope, Payload};
use skiff_core::error::{Error, Result};
use skiff_runtime::actor::{Actor, ActorContext};
use std::sync::Arc;
use tracing::debug;

/// Inbound client bytes.
pub const SESSION_INBOUND_TAG: &str = "session.inbound";
/// Bytes for the client, sent by any actor.
pub const SESSION_OUTBOUND_TAG: &str = "session.outbound";
/// Close request with a JSON [`CloseCommand`] body.
pub const SESSION_CLOSE_TAG: &str = "session.close";
/// Idle-monitor expiry notice.
pub const SESSION_IDLE_TAG: &str = "session.idle-timeout";
/// The transport reader saw the client go away.
pub const SESSION_CLIENT_CLOSED_TAG: &str = "session.client-closed";

/// Body of a close request.
#[derive(Debug, Serialize, Deserialize)]
pub struct CloseCommand {
    pub reason: CloseReason,
}

impl CloseCommand {
    /// Encode as a session-close payload.
    pub fn payload(reason: CloseReason) -> Payload {
        Payload::json(SESSION_CLOSE_TAG, &CloseCommand { reason })
            .unwrap_or_else(|_| Payload::new(SESSION_CLOSE_TAG, bytes::Bytes::new()))
    }
}

/// Actor bound to one external client.
pub struct SessionActor {
    connection: Arc<dyn ClientConnection>,
    metadata: SessionMetadata,
    router: Box<dyn SessionRouter>,
    context: Option<Arc<SessionContext>>,
    closed: bool,
}

impl SessionActor {
    /// Build the session actor for an accepted client.
    pub fn new(
        connection: Arc<dyn ClientConnection>,
        metadata: SessionMetadata,
        router_factory: &dyn RouterFactory,
    ) -> Self {
        Self {
            connection,
            metadata,
            router: router_factory.create(),
            context: None,
            closed: false,
        }
    }

    fn context(&self) -> Result<&Arc<SessionContext>> {
        self.context
            .as_ref()
            .ok_or_else(|| Error::internal("session context missing before start"))
    }

    /// Close the connection and notify the router once, whatever path
    /// triggered the close.
    async fn close_session(&mut self, reason: CloseReason) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!(session = %self.metadata.session_id, ?reason, "session closing");
        self.connection.close().await;
        if let Some(ctx) = self.context.as_ref() {
            self.router.on_closed(ctx, reason).await;
        }
    }

    fn kill_self(ctx: &ActorContext) {
        let system = ctx.system().clone();
        let handle = ctx.handle();
        // Never await our own kill inside a handler.
        tokio::spawn(async move {
            system.kill(handle).await;
        });
    }
}

#[async_trait]
impl Actor for SessionActor {
    async fn on_start(&mut self, ctx: &ActorContext) -> Result<()> {
        let context = Arc::new(SessionContext::new(
            self.metadata.clone(),
            ctx.system().clone(),
            ctx.handle(),
            self.connection.clone(),
        ));
        self.context = Some(context);
        let context = self.context.as_ref().expect("just set").clone();
        self.router.on_started(&context).await
    }

    async fn handle(&mut self, ctx: &ActorContext, envelope: Envelope) -> Result<Option<Payload>> {
        match envelope.payload.type_tag.as_str() {
            SESSION_INBOUND_TAG => {
                self.connection.mark_activity();
                let context = self.context()?.clone();
                self.router.on_message(&context, envelope.payload.data).await?;
            }
            SESSION_OUTBOUND_TAG => {
                self.connection.mark_activity();
                self.connection
                    .send(envelope.payload.data)
                    .await
                    .map_err(|e| Error::transport(e.to_string()))?;
            }
            SESSION_CLOSE_TAG => {
                let reason = envelope
                    .payload
                    .decode_json::<CloseCommand>()
                    .map(|c| c.reason)
                    .unwrap_or(CloseReason::Requested);
                self.close_session(reason).await;
                Self::kill_self(ctx);
            }
            SESSION_IDLE_TAG => {
                self.close_session(CloseReason::HeartbeatTimeout).await;
                Self::kill_self(ctx);
            }
            SESSION_CLIENT_CLOSED_TAG => {
                self.close_session(CloseReason::ClientDisconnected).await;
                Self::kill_self(ctx);
            }
            other => {
                return Err(Error::PayloadType {
                    expected: "session.*".into(),
                    actual: other.to_string(),
                });
            }
        }
        Ok(None)
    }

    async fn on_stop(&mut self, _ctx: &ActorContext) {
        self.close_session(CloseReason::ServerShutdown).await;
    }
}
