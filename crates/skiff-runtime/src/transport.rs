//! Transport seam and the in-process implementation.
//!
//! A transport accepts an envelope plus, for Calls, the response promise
//! and its cancellation token. It either delivers locally through the
//! actor system or ships the envelope to a remote peer. Whatever path it
//! takes, an accepted Call's promise eventually completes.

use crate::config::InProcessTransportConfig;
use crate::system::WeakActorSystem;
use async_trait::async_trait;
use skiff_core::envelope::Envelope;
use skiff_core::error::{Error, Result};
use skiff_core::promise::ResponsePromise;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Response plumbing attached to a Call as it enters a transport.
pub struct CallReply {
    /// Completes the caller's future. First completion wins.
    pub promise: ResponsePromise,
    /// Trips when the caller gives up (cancellation or timeout).
    pub cancel: CancellationToken,
}

/// Moves envelopes toward their target actor.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attach the owning system. Called once during system construction.
    fn bind(&self, system: WeakActorSystem);

    /// Accept an envelope and, for Calls, its response plumbing.
    async fn send(&self, envelope: Envelope, reply: Option<CallReply>) -> Result<()>;

    /// Release transport resources.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct QueuedItem {
    envelope: Envelope,
    reply: Option<CallReply>,
}

/// In-process transport.
///
/// Short-circuit mode delivers on the caller's task; queued mode hops
/// through a single-reader dispatch queue whose pump performs delivery.
pub struct InProcessTransport {
    system: OnceLock<WeakActorSystem>,
    queue: Option<mpsc::UnboundedSender<QueuedItem>>,
    pump_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<QueuedItem>>>,
}

impl InProcessTransport {
    /// Create a transport in the configured mode.
    pub fn new(config: InProcessTransportConfig) -> Self {
        if config.short_circuit_local_delivery {
            Self {
                system: OnceLock::new(),
                queue: None,
                pump_rx: std::sync::Mutex::new(None),
            }
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                system: OnceLock::new(),
                queue: Some(tx),
                pump_rx: std::sync::Mutex::new(Some(rx)),
            }
        }
    }

    fn system(&self) -> Result<crate::system::ActorSystem> {
        self.system
            .get()
            .and_then(WeakActorSystem::upgrade)
            .ok_or_else(|| Error::transport("actor system is gone"))
    }

    async fn deliver(
        system: &crate::system::ActorSystem,
        envelope: Envelope,
        reply: Option<CallReply>,
    ) -> Result<()> {
        match reply {
            Some(CallReply { promise, cancel }) => {
                if cancel.is_cancelled() {
                    promise.complete(Err(Error::Cancelled));
                    return Ok(());
                }
                system.deliver_local(envelope, Some(promise)).await
            }
            None => system.deliver_local(envelope, None).await,
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    fn bind(&self, system: WeakActorSystem) {
        if self.system.set(system).is_err() {
            debug!("in-process transport already bound");
            return;
        }

        // Queued mode: start the dispatch pump once the system is known.
        if self.queue.is_some() {
            let rx = self
                .pump_rx
                .lock()
                .expect("pump lock poisoned")
                .take();
            let weak = self.system.get().cloned();
            if let (Some(mut rx), Some(weak)) = (rx, weak) {
                tokio::spawn(async move {
                    while let Some(item) = rx.recv().await {
                        let Some(system) = weak.upgrade() else { break };
                        let _ = Self::deliver(&system, item.envelope, item.reply).await;
                    }
                });
            }
        }
    }

    async fn send(&self, envelope: Envelope, reply: Option<CallReply>) -> Result<()> {
        match &self.queue {
            None => {
                let system = match self.system() {
                    Ok(system) => system,
                    Err(e) => {
                        if let Some(CallReply { promise, .. }) = reply {
                            promise.complete(Err(Error::transport("actor system is gone")));
                        }
                        return Err(e);
                    }
                };
                Self::deliver(&system, envelope, reply).await
            }
            Some(tx) => {
                if tx
                    .send(QueuedItem { envelope, reply })
                    .is_err()
                {
                    return Err(Error::transport("dispatch queue closed"));
                }
                Ok(())
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        // Dropping the sender stops the pump after the queue drains.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorContext};
    use crate::system::{ActorSystem, CreateOptions};
    use async_trait::async_trait;
    use skiff_core::constants::PROTOCOL_VERSION;
    use skiff_core::envelope::{CallType, Payload};
    use skiff_core::handle::ActorHandle;
    use skiff_core::promise::response_channel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Probe {
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Actor for Probe {
        async fn handle(
            &mut self,
            _ctx: &ActorContext,
            _envelope: Envelope,
        ) -> Result<Option<Payload>> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Payload::empty()))
        }
    }

    fn call_envelope(to: ActorHandle) -> Envelope {
        Envelope {
            message_id: 1,
            from: ActorHandle::NONE,
            to,
            call_type: CallType::Call,
            payload: Payload::empty(),
            trace_id: "t".into(),
            timestamp_ms: 0,
            ttl_ms: None,
            version: PROTOCOL_VERSION,
        }
    }

    async fn probe_system() -> (ActorSystem, ActorHandle, Arc<AtomicUsize>) {
        let system = ActorSystem::new().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let actor_hits = hits.clone();
        let actor = system
            .create(move || Ok(Probe { hits: actor_hits }), CreateOptions::default())
            .await
            .unwrap();
        (system, actor.handle(), hits)
    }

    #[tokio::test]
    async fn test_queued_mode_cancelled_before_dispatch() {
        let (system, handle, hits) = probe_system().await;

        let transport = InProcessTransport::new(InProcessTransportConfig {
            short_circuit_local_delivery: false,
        });
        transport.bind(system.downgrade());

        let (promise, receiver) = response_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        transport
            .send(call_envelope(handle), Some(CallReply { promise, cancel }))
            .await
            .unwrap();

        assert!(matches!(receiver.recv().await, Err(Error::Cancelled)));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0, "envelope was discarded");

        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_queued_mode_delivers_in_order() {
        let (system, handle, hits) = probe_system().await;

        let transport = InProcessTransport::new(InProcessTransportConfig {
            short_circuit_local_delivery: false,
        });
        transport.bind(system.downgrade());

        let (promise, receiver) = response_channel();
        transport
            .send(
                call_envelope(handle),
                Some(CallReply {
                    promise,
                    cancel: CancellationToken::new(),
                }),
            )
            .await
            .unwrap();

        receiver.recv().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_short_circuit_delivers_inline() {
        let (system, handle, hits) = probe_system().await;

        let transport = InProcessTransport::new(InProcessTransportConfig::default());
        transport.bind(system.downgrade());

        let (promise, receiver) = response_channel();
        transport
            .send(
                call_envelope(handle),
                Some(CallReply {
                    promise,
                    cancel: CancellationToken::new(),
                }),
            )
            .await
            .unwrap();

        receiver.recv().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        system.shutdown().await;
    }
}
