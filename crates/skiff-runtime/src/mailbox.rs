//! Actor mailboxes.
//!
//! A mailbox is a multi-producer single-consumer FIFO of deliveries. The
//! default is unbounded; a bounded variant makes enqueue await capacity
//! instead of dropping.

use skiff_core::envelope::Envelope;
use skiff_core::error::{Error, Result};
use skiff_core::handle::ActorHandle;
use skiff_core::metrics::MetricsRegistry;
use skiff_core::promise::ResponsePromise;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One queued message: the envelope plus the caller's response promise,
/// when the message is a Call.
#[derive(Debug)]
pub struct Delivery {
    pub envelope: Envelope,
    pub reply: Option<ResponsePromise>,
}

enum SenderKind {
    Unbounded(mpsc::UnboundedSender<Delivery>),
    Bounded(mpsc::Sender<Delivery>),
}

impl Clone for SenderKind {
    fn clone(&self) -> Self {
        match self {
            SenderKind::Unbounded(tx) => SenderKind::Unbounded(tx.clone()),
            SenderKind::Bounded(tx) => SenderKind::Bounded(tx.clone()),
        }
    }
}

/// Writer half of a mailbox. Cloneable; any task may enqueue.
#[derive(Clone)]
pub struct MailboxSender {
    handle: ActorHandle,
    kind: SenderKind,
    metrics: Arc<MetricsRegistry>,
}

enum ReceiverKind {
    Unbounded(mpsc::UnboundedReceiver<Delivery>),
    Bounded(mpsc::Receiver<Delivery>),
}

/// Reader half of a mailbox. Owned by the actor's pump.
pub struct MailboxReceiver {
    kind: ReceiverKind,
}

/// Create a mailbox for an actor. `capacity = None` selects the unbounded
/// variant; `Some(n)` bounds the queue and makes writers wait.
pub fn mailbox(
    handle: ActorHandle,
    capacity: Option<usize>,
    metrics: Arc<MetricsRegistry>,
) -> (MailboxSender, MailboxReceiver) {
    let (sender_kind, receiver_kind) = match capacity {
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (SenderKind::Unbounded(tx), ReceiverKind::Unbounded(rx))
        }
        Some(n) => {
            debug_assert!(n > 0, "bounded mailbox capacity must be positive");
            let (tx, rx) = mpsc::channel(n);
            (SenderKind::Bounded(tx), ReceiverKind::Bounded(rx))
        }
    };

    (
        MailboxSender {
            handle,
            kind: sender_kind,
            metrics,
        },
        MailboxReceiver {
            kind: receiver_kind,
        },
    )
}

impl MailboxSender {
    /// Enqueue a delivery.
    ///
    /// The metrics queue gauge goes up before the write so the gauge never
    /// under-reports. A closed mailbox completes the delivery's reply with
    /// `MailboxClosed` and returns the same error; nothing is silently
    /// dropped.
    pub async fn enqueue(&self, delivery: Delivery) -> Result<()> {
        self.metrics.record_enqueue(self.handle);

        let rejected = match &self.kind {
            SenderKind::Unbounded(tx) => tx.send(delivery).err().map(|e| e.0),
            SenderKind::Bounded(tx) => tx.send(delivery).await.err().map(|e| e.0),
        };

        match rejected {
            None => Ok(()),
            Some(delivery) => {
                self.metrics.record_dequeue(self.handle);
                if let Some(reply) = delivery.reply {
                    reply.complete(Err(Error::MailboxClosed {
                        handle: self.handle.raw(),
                    }));
                }
                Err(Error::MailboxClosed {
                    handle: self.handle.raw(),
                })
            }
        }
    }
}

impl MailboxReceiver {
    /// Wait for the next delivery. Returns `None` once the mailbox is
    /// closed and drained.
    pub async fn recv(&mut self) -> Option<Delivery> {
        match &mut self.kind {
            ReceiverKind::Unbounded(rx) => rx.recv().await,
            ReceiverKind::Bounded(rx) => rx.recv().await,
        }
    }

    /// Take an already-queued delivery without waiting.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        match &mut self.kind {
            ReceiverKind::Unbounded(rx) => rx.try_recv().ok(),
            ReceiverKind::Bounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Close the mailbox to new writes. Queued deliveries remain readable.
    pub fn close(&mut self) {
        match &mut self.kind {
            ReceiverKind::Unbounded(rx) => rx.close(),
            ReceiverKind::Bounded(rx) => rx.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use skiff_core::constants::PROTOCOL_VERSION;
    use skiff_core::envelope::{CallType, Payload};
    use skiff_core::promise::response_channel;

    fn delivery(n: u64, reply: Option<ResponsePromise>) -> Delivery {
        Delivery {
            envelope: Envelope {
                message_id: n,
                from: ActorHandle::NONE,
                to: ActorHandle::from_raw(1),
                call_type: CallType::Send,
                payload: Payload::new("test", Bytes::new()),
                trace_id: format!("t-{n}"),
                timestamp_ms: 0,
                ttl_ms: None,
                version: PROTOCOL_VERSION,
            },
            reply,
        }
    }

    fn registry_for(handle: ActorHandle) -> Arc<MetricsRegistry> {
        let metrics = Arc::new(MetricsRegistry::new());
        metrics.register(handle, None, "test");
        metrics
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let handle = ActorHandle::from_raw(1);
        let (tx, mut rx) = mailbox(handle, None, registry_for(handle));

        for n in 0..10 {
            tx.enqueue(delivery(n, None)).await.unwrap();
        }
        for n in 0..10 {
            assert_eq!(rx.recv().await.unwrap().envelope.message_id, n);
        }
    }

    #[tokio::test]
    async fn test_queue_gauge_tracks_depth() {
        let handle = ActorHandle::from_raw(1);
        let metrics = registry_for(handle);
        let (tx, mut rx) = mailbox(handle, None, metrics.clone());

        tx.enqueue(delivery(1, None)).await.unwrap();
        tx.enqueue(delivery(2, None)).await.unwrap();
        assert_eq!(metrics.try_snapshot(handle).unwrap().queue_len, 2);

        rx.recv().await.unwrap();
        metrics.record_dequeue(handle);
        assert_eq!(metrics.try_snapshot(handle).unwrap().queue_len, 1);
    }

    #[tokio::test]
    async fn test_closed_mailbox_fails_reply() {
        let handle = ActorHandle::from_raw(1);
        let (tx, mut rx) = mailbox(handle, None, registry_for(handle));
        rx.close();

        let (promise, receiver) = response_channel();
        let result = tx.enqueue(delivery(1, Some(promise))).await;
        assert!(matches!(result, Err(Error::MailboxClosed { .. })));
        assert!(matches!(
            receiver.recv().await,
            Err(Error::MailboxClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_bounded_enqueue_waits() {
        let handle = ActorHandle::from_raw(1);
        let (tx, mut rx) = mailbox(handle, Some(1), registry_for(handle));

        tx.enqueue(delivery(1, None)).await.unwrap();

        let tx2 = tx.clone();
        let writer = tokio::spawn(async move { tx2.enqueue(delivery(2, None)).await });

        // The writer cannot finish until the pump makes room.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        rx.recv().await.unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().envelope.message_id, 2);
    }
}
