//! The per-actor host: start hook, mailbox pump, orderly stop.

use crate::actor::{Actor, ActorContext};
use crate::mailbox::{Delivery, MailboxReceiver};
use skiff_core::envelope::{CallType, Payload};
use skiff_core::error::Error;
use skiff_core::handle::ActorHandle;
use skiff_core::metrics::MetricsRegistry;
use skiff_core::trace;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Startup outcome observed by everyone waiting to deliver to the actor.
#[derive(Debug, Clone, PartialEq)]
pub enum StartupState {
    Pending,
    Started,
    Failed(String),
}

pub(crate) struct ActorHost {
    handle: ActorHandle,
    actor: Box<dyn Actor>,
    ctx: ActorContext,
    receiver: MailboxReceiver,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
    startup_tx: watch::Sender<StartupState>,
    stop_tx: watch::Sender<bool>,
}

impl ActorHost {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        handle: ActorHandle,
        actor: Box<dyn Actor>,
        ctx: ActorContext,
        receiver: MailboxReceiver,
        metrics: Arc<MetricsRegistry>,
        cancel: CancellationToken,
        startup_tx: watch::Sender<StartupState>,
        stop_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            handle,
            actor,
            ctx,
            receiver,
            metrics,
            cancel,
            startup_tx,
            stop_tx,
        }
    }

    /// Drive the actor until cancellation. Runs as its own tokio task.
    pub(crate) async fn run(mut self) {
        match self.actor.on_start(&self.ctx).await {
            Ok(()) => {
                let _ = self.startup_tx.send(StartupState::Started);
            }
            Err(e) => {
                warn!(handle = %self.handle, error = %e, "actor start hook failed");
                let reason = e.to_string();
                let _ = self.startup_tx.send(StartupState::Failed(reason.clone()));
                self.fail_queued(|handle| Error::ActorStartFailed {
                    handle,
                    reason: reason.clone(),
                });
                self.actor.on_stop(&self.ctx).await;
                let _ = self.stop_tx.send(true);
                return;
            }
        }

        debug!(handle = %self.handle, "actor started");

        let cancel = self.cancel.clone();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                delivery = self.receiver.recv() => delivery,
            };
            let Some(delivery) = next else { break };

            self.process(delivery).await;
            // Drain everything already queued before waiting again.
            while !cancel.is_cancelled() {
                match self.receiver.try_recv() {
                    Some(delivery) => self.process(delivery).await,
                    None => break,
                }
            }
        }

        self.fail_queued(|_| Error::Cancelled);
        self.actor.on_stop(&self.ctx).await;
        debug!(handle = %self.handle, "actor stopped");
        let _ = self.stop_tx.send(true);
    }

    /// Close the mailbox and complete every queued delivery's reply, so no
    /// enqueue that linearized before shutdown goes unanswered.
    fn fail_queued(&mut self, make_error: impl Fn(u64) -> Error) {
        self.receiver.close();
        while let Some(delivery) = self.receiver.try_recv() {
            self.metrics.record_dequeue(self.handle);
            if let Some(reply) = delivery.reply {
                reply.complete(Err(make_error(self.handle.raw())));
            }
        }
    }

    async fn process(&mut self, delivery: Delivery) {
        self.metrics.record_dequeue(self.handle);

        let Delivery { envelope, reply } = delivery;
        let is_call = envelope.call_type == CallType::Call;
        let trace_id = envelope.trace_id.clone();

        if self.metrics.trace_enabled(self.handle) {
            debug!(handle = %self.handle, envelope = %envelope, trace = %trace_id, "processing");
        }

        let started = Instant::now();
        let result = trace::scope(trace_id, self.actor.handle(&self.ctx, envelope)).await;
        let elapsed_us = started.elapsed().as_micros() as u64;
        self.metrics.record_processed(self.handle, elapsed_us);

        match result {
            Ok(Some(payload)) => {
                if let Some(reply) = reply {
                    reply.complete(Ok(payload));
                }
            }
            Ok(None) => {
                if let Some(reply) = reply {
                    debug_assert!(is_call, "reply promise on a Send delivery");
                    reply.complete(Ok(Payload::empty()));
                }
            }
            Err(e) => {
                self.metrics.record_exception(self.handle);
                self.actor.on_error(&self.ctx, &e).await;
                match reply {
                    Some(reply) => {
                        reply.complete(Err(e));
                    }
                    None => {
                        warn!(handle = %self.handle, error = %e, "handler error on send");
                    }
                }
            }
        }
    }
}
