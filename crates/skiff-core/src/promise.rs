//! Single-shot response completion.
//!
//! A call's promise may be completed by the reply path, the caller's
//! cancellation, or a timeout. The first completion wins; all later
//! attempts are no-ops.

use crate::envelope::Payload;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Completing half of a response channel. Cloneable so the reply path and
/// the cancellation path can race safely.
#[derive(Clone)]
pub struct ResponsePromise {
    inner: Arc<Mutex<Option<oneshot::Sender<Result<Payload>>>>>,
}

/// Receiving half of a response channel.
pub struct ResponseReceiver {
    rx: oneshot::Receiver<Result<Payload>>,
}

/// Create a linked promise/receiver pair.
pub fn response_channel() -> (ResponsePromise, ResponseReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        ResponsePromise {
            inner: Arc::new(Mutex::new(Some(tx))),
        },
        ResponseReceiver { rx },
    )
}

impl ResponsePromise {
    /// Complete the promise. Returns true iff this call performed the
    /// completion; later attempts return false.
    pub fn complete(&self, result: Result<Payload>) -> bool {
        let sender = self
            .inner
            .lock()
            .expect("promise lock poisoned")
            .take();
        match sender {
            Some(tx) => {
                // A dropped receiver still counts as completed.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// True once a completion has been performed.
    pub fn is_completed(&self) -> bool {
        self.inner.lock().expect("promise lock poisoned").is_none()
    }
}

impl std::fmt::Debug for ResponsePromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsePromise")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl ResponseReceiver {
    /// Wait for the response. A dropped promise surfaces as cancellation.
    pub async fn recv(self) -> Result<Payload> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_first_completion_wins() {
        let (promise, receiver) = response_channel();

        assert!(promise.complete(Ok(Payload::new("a", Bytes::from_static(b"1")))));
        assert!(!promise.complete(Ok(Payload::new("b", Bytes::from_static(b"2")))));
        assert!(!promise.complete(Err(Error::Cancelled)));

        let payload = receiver.recv().await.unwrap();
        assert_eq!(payload.type_tag, "a");
    }

    #[tokio::test]
    async fn test_clone_races_are_idempotent() {
        let (promise, receiver) = response_channel();
        let other = promise.clone();

        assert!(other.complete(Err(Error::Cancelled)));
        assert!(!promise.complete(Ok(Payload::empty())));
        assert!(promise.is_completed());

        assert!(matches!(receiver.recv().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_promise_is_cancellation() {
        let (promise, receiver) = response_channel();
        drop(promise);
        assert!(matches!(receiver.recv().await, Err(Error::Cancelled)));
    }
}
