//! Two-node round trip over real loopback TCP with a static registry.

use async_trait::async_trait;
use bytes::Bytes;
use skiff_cluster::{ClusterTransport, ClusterTransportConfig};
use skiff_core::envelope::{Envelope, Payload};
use skiff_core::error::{Error, Result};
use skiff_core::handle::ActorHandle;
use skiff_registry::{ActorLocation, ClusterRegistry, NodeDescriptor, NodeId, StaticRegistry};
use skiff_runtime::actor::{Actor, ActorContext};
use skiff_runtime::system::{ActorSystem, ActorSystemBuilder, CreateOptions};
use skiff_runtime::transport::Transport;
use skiff_runtime::ActorSystemConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const ECHO_HANDLE: u64 = 1001;
const SINK_HANDLE: u64 = 2500;

struct EchoService;

#[async_trait]
impl Actor for EchoService {
    async fn handle(&mut self, _ctx: &ActorContext, envelope: Envelope) -> Result<Option<Payload>> {
        let text = String::from_utf8_lossy(&envelope.payload.data).to_string();
        let reply = match text.as_str() {
            "ping" => "echo:pong".to_string(),
            other => format!("echo:{other}"),
        };
        Ok(Some(Payload::new("echo.reply", Bytes::from(reply))))
    }
}

struct Cluster {
    system1: ActorSystem,
    system2: ActorSystem,
    transport2: Arc<ClusterTransport>,
}

async fn two_node_cluster() -> Cluster {
    let node1 = NodeId::new("node-1").unwrap();
    let node2 = NodeId::new("node-2").unwrap();

    let transport_config = || ClusterTransportConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        heartbeat_interval_ms: 200,
        ..Default::default()
    };
    let transport1 = ClusterTransport::bind(node1.clone(), transport_config())
        .await
        .unwrap();
    let transport2 = ClusterTransport::bind(node2.clone(), transport_config())
        .await
        .unwrap();

    let nodes = vec![
        NodeDescriptor::new(node1.clone(), transport1.local_addr()),
        NodeDescriptor::new(node2.clone(), transport2.local_addr()),
    ];
    let mut services = HashMap::new();
    services.insert(
        "echo".to_string(),
        ActorLocation::new(node2.clone(), ActorHandle::from_raw(ECHO_HANDLE)),
    );
    services.insert(
        "sink".to_string(),
        ActorLocation::new(node2.clone(), ActorHandle::from_raw(SINK_HANDLE)),
    );

    let registry1: Arc<dyn ClusterRegistry> = Arc::new(StaticRegistry::new(
        node1.clone(),
        nodes.clone(),
        services.clone(),
    ));
    let registry2: Arc<dyn ClusterRegistry> =
        Arc::new(StaticRegistry::new(node2.clone(), nodes, services));
    transport1.set_registry(registry1.clone());
    transport2.set_registry(registry2.clone());

    let system1 = ActorSystemBuilder::new(ActorSystemConfig {
        node_id: "node-1".into(),
        ..Default::default()
    })
    .with_transport(transport1.clone() as Arc<dyn Transport>, true)
    .with_cluster_registry(registry1, false)
    .build()
    .unwrap();

    let system2 = ActorSystemBuilder::new(ActorSystemConfig {
        node_id: "node-2".into(),
        handle_offset: 2000,
        ..Default::default()
    })
    .with_transport(transport2.clone() as Arc<dyn Transport>, true)
    .with_cluster_registry(registry2, false)
    .build()
    .unwrap();

    system2
        .create(
            || Ok(EchoService),
            CreateOptions::named_with_handle("echo", ActorHandle::from_raw(ECHO_HANDLE)),
        )
        .await
        .unwrap();

    Cluster {
        system1,
        system2,
        transport2,
    }
}

/// Node1 resolves `echo` by name and calls it on node2 over TCP.
#[tokio::test]
async fn cross_node_call_round_trip() {
    let cluster = two_node_cluster().await;

    let echo = cluster.system1.get_by_name("echo").await.unwrap();
    assert_eq!(echo.handle().raw(), ECHO_HANDLE);

    let reply = echo
        .call(
            Payload::new("echo.request", Bytes::from_static(b"ping")),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(&reply.data[..], b"echo:pong");

    // A second call reuses the established connection.
    let reply = echo
        .call(
            Payload::new("echo.request", Bytes::from_static(b"again")),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(&reply.data[..], b"echo:again");

    cluster.system1.shutdown().await;
    cluster.system2.shutdown().await;
}

/// Cross-node sends are fire-and-forget and still arrive.
#[tokio::test]
async fn cross_node_send_is_delivered() {
    struct Sink {
        seen: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl Actor for Sink {
        async fn handle(
            &mut self,
            _ctx: &ActorContext,
            _envelope: Envelope,
        ) -> Result<Option<Payload>> {
            self.seen.notify_one();
            Ok(None)
        }
    }

    let cluster = two_node_cluster().await;
    let seen = Arc::new(tokio::sync::Notify::new());

    let seen_actor = seen.clone();
    cluster
        .system2
        .create(
            move || Ok(Sink { seen: seen_actor }),
            CreateOptions::named_with_handle("sink", ActorHandle::from_raw(SINK_HANDLE)),
        )
        .await
        .unwrap();

    // Node1 hosts no actor at this handle; the declared service table
    // routes it to node2.
    cluster
        .system1
        .send(
            ActorHandle::from_raw(SINK_HANDLE),
            Payload::new("sink.item", Bytes::from_static(b"x")),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), seen.notified())
        .await
        .expect("send never arrived");

    cluster.system1.shutdown().await;
    cluster.system2.shutdown().await;
}

/// Killing the peer mid-conversation surfaces as an I/O-flavored error
/// on the next call, and the slot recovers nothing until the peer is
/// back.
#[tokio::test]
async fn peer_loss_fails_calls() {
    let cluster = two_node_cluster().await;

    let echo = cluster.system1.get_by_name("echo").await.unwrap();
    echo.call(
        Payload::new("echo.request", Bytes::from_static(b"ping")),
        Some(Duration::from_secs(5)),
    )
    .await
    .unwrap();

    // Tear node2 down; node1's read loop sees EOF and clears the slot.
    cluster.system2.shutdown().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = echo
        .call(
            Payload::new("echo.request", Bytes::from_static(b"ping")),
            Some(Duration::from_millis(500)),
        )
        .await;
    let err = result.unwrap_err();
    assert!(
        matches!(err, Error::Io(_) | Error::Transport { .. }) || err.is_cancellation(),
        "unexpected error: {err}"
    );

    cluster.system1.shutdown().await;
}

/// The registry declares `echo` on node2, so node2 itself resolves the
/// name without touching the network.
#[tokio::test]
async fn local_lookup_stays_local() {
    let cluster = two_node_cluster().await;

    let echo = cluster.system2.get_by_name("echo").await.unwrap();
    let reply = echo
        .call(
            Payload::new("echo.request", Bytes::from_static(b"near")),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(&reply.data[..], b"echo:near");

    drop(cluster.transport2);
    cluster.system1.shutdown().await;
    cluster.system2.shutdown().await;
}
