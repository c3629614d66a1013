//! The actor contract.

use crate::system::ActorSystem;
use async_trait::async_trait;
use skiff_core::envelope::{Envelope, Payload};
use skiff_core::error::{Error, Result};
use skiff_core::handle::ActorHandle;
use std::time::Duration;

/// Context handed to every actor hook.
///
/// Gives the actor its own handle and a system handle for originating
/// messages with itself as the sender.
#[derive(Clone)]
pub struct ActorContext {
    handle: ActorHandle,
    system: ActorSystem,
}

impl ActorContext {
    pub(crate) fn new(handle: ActorHandle, system: ActorSystem) -> Self {
        Self { handle, system }
    }

    /// This actor's handle.
    pub fn handle(&self) -> ActorHandle {
        self.handle
    }

    /// The owning actor system.
    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Fire-and-forget to another actor, with this actor as the sender.
    pub async fn send(&self, to: ActorHandle, payload: Payload) -> Result<()> {
        self.system.send_from(Some(self.handle), to, payload).await
    }

    /// Request/response to another actor, with this actor as the sender.
    pub async fn call(
        &self,
        to: ActorHandle,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Payload> {
        self.system
            .call_from(Some(self.handle), to, payload, timeout)
            .await
    }
}

/// A unit of computation owning private state, served one message at a
/// time from its mailbox.
///
/// Hooks run on the actor's own pump task; no two hooks of the same actor
/// ever execute concurrently.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Called once before any message is served. An error here fails the
    /// create operation and the actor never starts.
    async fn on_start(&mut self, _ctx: &ActorContext) -> Result<()> {
        Ok(())
    }

    /// Serve one message. For a `Call`, the returned payload completes the
    /// caller's promise; `None` completes it with the empty payload.
    async fn handle(&mut self, ctx: &ActorContext, envelope: Envelope) -> Result<Option<Payload>>;

    /// Called after a handler returned an error. The pump keeps running.
    async fn on_error(&mut self, _ctx: &ActorContext, _error: &Error) {}

    /// Called exactly once when the actor stops, after the last message.
    async fn on_stop(&mut self, _ctx: &ActorContext) {}
}
