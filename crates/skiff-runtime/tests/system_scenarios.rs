//! End-to-end scenarios on a single actor system.

use async_trait::async_trait;
use bytes::Bytes;
use skiff_core::envelope::{Envelope, Payload};
use skiff_core::error::{Error, Result};
use skiff_runtime::actor::{Actor, ActorContext};
use skiff_runtime::system::{ActorSystem, CreateOptions};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const INCREMENT_TAG: &str = "counter.increment";
const FAIL_TAG: &str = "counter.fail";

struct Counter {
    count: u64,
}

#[async_trait]
impl Actor for Counter {
    async fn handle(&mut self, _ctx: &ActorContext, envelope: Envelope) -> Result<Option<Payload>> {
        match envelope.payload.type_tag.as_str() {
            INCREMENT_TAG => {
                let n: u64 = envelope.payload.decode_json()?;
                self.count += n;
                Ok(Some(Payload::json("counter.value", &self.count)?))
            }
            FAIL_TAG => Err(Error::internal("counter asked to fail")),
            other => Err(Error::PayloadType {
                expected: INCREMENT_TAG.into(),
                actual: other.to_string(),
            }),
        }
    }
}

/// Thirty-two concurrent increments are served serially: the returned
/// values form exactly the multiset {1..32} and the counter ends at 32.
#[tokio::test]
async fn sequential_counter_under_concurrent_calls() {
    let system = ActorSystem::new().unwrap();
    let counter = system
        .create(|| Ok(Counter { count: 0 }), CreateOptions::default())
        .await
        .unwrap();

    let calls = (0..32).map(|_| {
        let counter = counter.clone();
        tokio::spawn(async move {
            let reply = counter
                .call(
                    Payload::json(INCREMENT_TAG, &1u64).unwrap(),
                    Some(Duration::from_secs(5)),
                )
                .await
                .unwrap();
            reply.decode_json::<u64>().unwrap()
        })
    });

    let mut values = HashSet::new();
    for call in calls {
        assert!(values.insert(call.await.unwrap()), "duplicate counter value");
    }
    assert_eq!(values, (1..=32).collect::<HashSet<u64>>());

    let final_count = counter
        .call(
            Payload::json(INCREMENT_TAG, &0u64).unwrap(),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap()
        .decode_json::<u64>()
        .unwrap();
    assert_eq!(final_count, 32);

    system.shutdown().await;
}

/// A handler error faults the caller's promise but leaves the actor
/// running; the next call succeeds.
#[tokio::test]
async fn handler_errors_do_not_kill_the_actor() {
    let system = ActorSystem::new().unwrap();
    let counter = system
        .create(|| Ok(Counter { count: 0 }), CreateOptions::default())
        .await
        .unwrap();

    let fault = counter
        .call(
            Payload::new(FAIL_TAG, Bytes::new()),
            Some(Duration::from_secs(5)),
        )
        .await;
    let err = fault.unwrap_err();
    assert!(err.to_string().contains("counter asked to fail"));

    let value = counter
        .call(
            Payload::json(INCREMENT_TAG, &1u64).unwrap(),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap()
        .decode_json::<u64>()
        .unwrap();
    assert_eq!(value, 1);

    let snapshot = system.try_snapshot(counter.handle()).unwrap();
    assert_eq!(snapshot.exceptions, 1);
    assert!(snapshot.processed >= snapshot.exceptions);

    system.shutdown().await;
}

/// Concurrent get_or_create_unique calls converge on one actor; the
/// factory runs at most once successfully.
#[tokio::test]
async fn unique_service_is_created_once() {
    let system = ActorSystem::new().unwrap();
    let successes = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let system = system.clone();
            let successes = successes.clone();
            tokio::spawn(async move {
                system
                    .get_or_create_unique("u", move || {
                        successes.fetch_add(1, Ordering::SeqCst);
                        Ok(Counter { count: 0 })
                    })
                    .await
                    .unwrap()
                    .handle()
            })
        })
        .collect();

    let mut handles = HashSet::new();
    for task in tasks {
        handles.insert(task.await.unwrap());
    }

    assert_eq!(handles.len(), 1, "all callers see the same actor");
    assert_eq!(successes.load(Ordering::SeqCst), 1, "factory ran once");

    system.shutdown().await;
}

/// Messages enqueued before a kill are answered, with cancellation at
/// worst, never silently dropped.
#[tokio::test]
async fn kill_answers_queued_calls() {
    struct Slow;

    #[async_trait]
    impl Actor for Slow {
        async fn handle(
            &mut self,
            _ctx: &ActorContext,
            _envelope: Envelope,
        ) -> Result<Option<Payload>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(None)
        }
    }

    let system = ActorSystem::new().unwrap();
    let slow = system
        .create(|| Ok(Slow), CreateOptions::default())
        .await
        .unwrap();

    let mut calls = Vec::new();
    for _ in 0..4 {
        let slow = slow.clone();
        calls.push(tokio::spawn(async move {
            slow.call(Payload::empty(), Some(Duration::from_secs(5))).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(system.kill(slow.handle()).await);

    for call in calls {
        // Every promise completed: success for work already in flight,
        // cancellation for drained mail.
        let outcome = call.await.unwrap();
        if let Err(e) = outcome {
            assert!(
                e.is_cancellation() || matches!(e, Error::MailboxClosed { .. }),
                "unexpected error: {e}"
            );
        }
    }

    system.shutdown().await;
}

/// Trace ids flow from the caller's ambient scope through the envelope
/// into the handler's scope.
#[tokio::test]
async fn trace_id_propagates_into_handlers() {
    struct TraceEcho;

    #[async_trait]
    impl Actor for TraceEcho {
        async fn handle(
            &mut self,
            _ctx: &ActorContext,
            _envelope: Envelope,
        ) -> Result<Option<Payload>> {
            let trace = skiff_core::trace::current().unwrap_or_default();
            Ok(Some(Payload::json("trace", &trace)?))
        }
    }

    let system = ActorSystem::new().unwrap();
    let actor = system
        .create(|| Ok(TraceEcho), CreateOptions::default())
        .await
        .unwrap();

    let observed = skiff_core::trace::scope("trace-42".into(), async {
        actor
            .call(Payload::empty(), Some(Duration::from_secs(5)))
            .await
            .unwrap()
            .decode_json::<String>()
            .unwrap()
    })
    .await;
    assert_eq!(observed, "trace-42");

    system.shutdown().await;
}
