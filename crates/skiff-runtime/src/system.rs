//! The actor system: actor table, name index, routing, and lifecycle.

use crate::actor::{Actor, ActorContext};
use crate::config::{ActorSystemConfig, InProcessTransportConfig};
use crate::host::{ActorHost, StartupState};
use crate::mailbox::{mailbox, Delivery, MailboxSender};
use crate::transport::{CallReply, InProcessTransport, Transport};
use skiff_core::constants::{
    ACTOR_NAME_LENGTH_BYTES_MAX, CALL_TIMEOUT_MS_DEFAULT, MESSAGE_ID_FIRST, PROTOCOL_VERSION,
};
use skiff_core::envelope::{CallType, Envelope, Payload};
use skiff_core::error::{Error, Result};
use skiff_core::handle::{ActorHandle, HandleAllocator};
use skiff_core::io::{TimeProvider, WallClockTime};
use skiff_core::metrics::{MetricsRegistry, MetricsSnapshot};
use skiff_core::promise::{response_channel, ResponsePromise};
use skiff_core::trace;
use skiff_registry::registry::ClusterRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Options for `ActorSystem::create`.
#[derive(Debug, Default, Clone)]
pub struct CreateOptions {
    /// Register the actor under this name.
    pub name: Option<String>,
    /// Use this handle instead of auto-allocating one (to match a
    /// pre-agreed cluster placement).
    pub handle: Option<ActorHandle>,
}

impl CreateOptions {
    /// Options with a registered name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            handle: None,
        }
    }

    /// Options with an explicit handle.
    pub fn with_handle(handle: ActorHandle) -> Self {
        Self {
            name: None,
            handle: Some(handle),
        }
    }

    /// Options with both a name and an explicit handle.
    pub fn named_with_handle(name: impl Into<String>, handle: ActorHandle) -> Self {
        Self {
            name: Some(name.into()),
            handle: Some(handle),
        }
    }
}

/// Row in `list_actors`.
#[derive(Debug, Clone)]
pub struct ActorInfo {
    pub handle: ActorHandle,
    pub name: Option<String>,
    pub impl_tag: String,
}

struct ActorEntry {
    name: Option<String>,
    impl_tag: String,
    sender: MailboxSender,
    startup: watch::Receiver<StartupState>,
    cancel: CancellationToken,
    stopped: watch::Receiver<bool>,
}

#[derive(Default)]
struct NameIndex {
    by_name: HashMap<String, ActorHandle>,
    by_handle: HashMap<ActorHandle, String>,
}

struct SystemInner {
    config: ActorSystemConfig,
    actors: RwLock<HashMap<ActorHandle, ActorEntry>>,
    names: Mutex<NameIndex>,
    handles: HandleAllocator,
    message_ids: AtomicU64,
    metrics: Arc<MetricsRegistry>,
    time: Arc<dyn TimeProvider>,
    transport: std::sync::OnceLock<Arc<dyn Transport>>,
    transport_owned: bool,
    registry: Option<Arc<dyn ClusterRegistry>>,
    registry_owned: bool,
    unique_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    shutdown_token: CancellationToken,
}

/// Handle to an actor system. Cheap to clone; all clones share one system.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

/// Non-owning system handle held by transports.
#[derive(Clone)]
pub struct WeakActorSystem {
    inner: Weak<SystemInner>,
}

impl WeakActorSystem {
    /// Upgrade to a full handle if the system is still alive.
    pub fn upgrade(&self) -> Option<ActorSystem> {
        self.inner.upgrade().map(|inner| ActorSystem { inner })
    }
}

/// Builder for an actor system.
pub struct ActorSystemBuilder {
    config: ActorSystemConfig,
    transport: Option<(Arc<dyn Transport>, bool)>,
    registry: Option<(Arc<dyn ClusterRegistry>, bool)>,
    time: Arc<dyn TimeProvider>,
}

impl ActorSystemBuilder {
    /// Start a builder from a configuration.
    pub fn new(config: ActorSystemConfig) -> Self {
        Self {
            config,
            transport: None,
            registry: None,
            time: Arc::new(WallClockTime::new()),
        }
    }

    /// Use the given transport. `owned` controls whether system shutdown
    /// disposes it.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>, owned: bool) -> Self {
        self.transport = Some((transport, owned));
        self
    }

    /// Attach a cluster registry. `owned` controls whether system shutdown
    /// disposes it.
    pub fn with_cluster_registry(mut self, registry: Arc<dyn ClusterRegistry>, owned: bool) -> Self {
        self.registry = Some((registry, owned));
        self
    }

    /// Inject a clock (tests).
    pub fn with_time(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = time;
        self
    }

    /// Validate the configuration and assemble the system.
    pub fn build(self) -> Result<ActorSystem> {
        self.config.validate()?;

        let (transport, transport_owned) = match self.transport {
            Some((transport, owned)) => (transport, owned),
            // The system constructs and therefore owns the default
            // short-circuit transport.
            None => (
                Arc::new(InProcessTransport::new(InProcessTransportConfig::default()))
                    as Arc<dyn Transport>,
                true,
            ),
        };
        let (registry, registry_owned) = match self.registry {
            Some((registry, owned)) => (Some(registry), owned),
            None => (None, false),
        };

        let inner = Arc::new(SystemInner {
            handles: HandleAllocator::new(self.config.handle_offset),
            config: self.config,
            actors: RwLock::new(HashMap::new()),
            names: Mutex::new(NameIndex::default()),
            message_ids: AtomicU64::new(MESSAGE_ID_FIRST),
            metrics: Arc::new(MetricsRegistry::with_time(self.time.clone())),
            time: self.time,
            transport: std::sync::OnceLock::new(),
            transport_owned,
            registry,
            registry_owned,
            unique_locks: tokio::sync::Mutex::new(HashMap::new()),
            shutdown_token: CancellationToken::new(),
        });

        let system = ActorSystem { inner };
        transport.bind(system.downgrade());
        let _ = system.inner.transport.set(transport);

        info!(node_id = %system.inner.config.node_id, "actor system started");
        Ok(system)
    }
}

/// Reference to an actor, local or remote. Routing happens per message.
#[derive(Clone)]
pub struct ActorRef {
    handle: ActorHandle,
    system: ActorSystem,
}

impl ActorRef {
    /// The referenced handle.
    pub fn handle(&self) -> ActorHandle {
        self.handle
    }

    /// Fire-and-forget to this actor.
    pub async fn send(&self, payload: Payload) -> Result<()> {
        self.system.send(self.handle, payload).await
    }

    /// Request/response to this actor.
    pub async fn call(&self, payload: Payload, timeout: Option<Duration>) -> Result<Payload> {
        self.system
            .call_from(None, self.handle, payload, timeout)
            .await
    }
}

impl ActorSystem {
    /// Build a system with default config and transport.
    pub fn new() -> Result<Self> {
        ActorSystemBuilder::new(ActorSystemConfig::default()).build()
    }

    /// Builder entry point.
    pub fn builder(config: ActorSystemConfig) -> ActorSystemBuilder {
        ActorSystemBuilder::new(config)
    }

    /// Non-owning handle for transports.
    pub fn downgrade(&self) -> WeakActorSystem {
        WeakActorSystem {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// This process's node id.
    pub fn node_id(&self) -> &str {
        &self.inner.config.node_id
    }

    /// The metrics registry.
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.inner.metrics
    }

    /// The attached cluster registry, if any.
    pub fn cluster_registry(&self) -> Option<&Arc<dyn ClusterRegistry>> {
        self.inner.registry.as_ref()
    }

    fn transport(&self) -> Arc<dyn Transport> {
        self.inner
            .transport
            .get()
            .expect("transport bound at build")
            .clone()
    }

    // =========================================================================
    // Creation / destruction
    // =========================================================================

    /// Create and start an actor. Returns once the start hook has run; a
    /// failed start rolls the actor back completely.
    pub async fn create<A, F>(&self, factory: F, options: CreateOptions) -> Result<ActorRef>
    where
        A: Actor,
        F: FnOnce() -> Result<A>,
    {
        if let Some(name) = &options.name {
            validate_name(name)?;
        }

        let handle = match options.handle {
            Some(handle) => {
                if handle.is_none() {
                    return Err(Error::InvalidHandle { value: 0 });
                }
                handle
            }
            None => self.inner.handles.allocate(),
        };

        let actor = factory().map_err(|e| Error::ActorStartFailed {
            handle: handle.raw(),
            reason: format!("factory failed: {e}"),
        })?;
        let impl_tag = std::any::type_name::<A>().to_string();

        let (sender, receiver) = mailbox(
            handle,
            self.inner.config.bounded_mailbox,
            self.inner.metrics.clone(),
        );
        let (startup_tx, startup_rx) = watch::channel(StartupState::Pending);
        let (stop_tx, stop_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        // Two-step reservation: handle row first, then the name. Name
        // lookups therefore never observe a name without its entry.
        {
            let mut actors = self.inner.actors.write().expect("actor table poisoned");
            if actors.contains_key(&handle) {
                return Err(Error::HandleAlreadyInUse {
                    handle: handle.raw(),
                });
            }
            actors.insert(
                handle,
                ActorEntry {
                    name: options.name.clone(),
                    impl_tag: impl_tag.clone(),
                    sender,
                    startup: startup_rx.clone(),
                    cancel: cancel.clone(),
                    stopped: stop_rx,
                },
            );
        }

        if let Some(name) = &options.name {
            let mut names = self.inner.names.lock().expect("name index poisoned");
            if names.by_name.contains_key(name) {
                self.inner
                    .actors
                    .write()
                    .expect("actor table poisoned")
                    .remove(&handle);
                return Err(Error::NameAlreadyRegistered { name: name.clone() });
            }
            names.by_name.insert(name.clone(), handle);
            names.by_handle.insert(handle, name.clone());
        }

        self.inner
            .metrics
            .register(handle, options.name.clone(), &impl_tag);

        let ctx = ActorContext::new(handle, self.clone());
        let host = ActorHost::new(
            handle,
            Box::new(actor),
            ctx,
            receiver,
            self.inner.metrics.clone(),
            cancel,
            startup_tx,
            stop_tx,
        );
        tokio::spawn(host.run());

        // Wait for the start hook before publishing anywhere else.
        let mut startup = startup_rx;
        loop {
            match startup.borrow().clone() {
                StartupState::Started => break,
                StartupState::Failed(reason) => {
                    self.rollback_actor(handle, options.name.as_deref());
                    return Err(Error::ActorStartFailed {
                        handle: handle.raw(),
                        reason,
                    });
                }
                StartupState::Pending => {}
            }
            if startup.changed().await.is_err() {
                self.rollback_actor(handle, options.name.as_deref());
                return Err(Error::ActorStartFailed {
                    handle: handle.raw(),
                    reason: "host exited before startup completed".into(),
                });
            }
        }

        // Claim the name in the cluster only after a successful start; a
        // rejected claim rolls the local actor back before the error
        // reaches the caller.
        if let (Some(name), Some(registry)) = (&options.name, &self.inner.registry) {
            if let Err(e) = registry.register_local_actor(name, handle).await {
                warn!(name = %name, handle = %handle, error = %e, "cluster name claim failed");
                self.kill(handle).await;
                return Err(Error::registry(e.to_string()));
            }
        }

        debug!(handle = %handle, name = ?options.name, "actor created");
        Ok(ActorRef {
            handle,
            system: self.clone(),
        })
    }

    fn rollback_actor(&self, handle: ActorHandle, name: Option<&str>) {
        self.inner
            .actors
            .write()
            .expect("actor table poisoned")
            .remove(&handle);
        if let Some(name) = name {
            let mut names = self.inner.names.lock().expect("name index poisoned");
            names.by_name.remove(name);
            names.by_handle.remove(&handle);
        }
        self.inner.metrics.unregister(handle);
    }

    /// Stop and remove an actor. Returns true iff it was present; the
    /// actor has fully stopped when this returns.
    pub async fn kill(&self, handle: ActorHandle) -> bool {
        let entry = {
            let mut actors = self.inner.actors.write().expect("actor table poisoned");
            actors.remove(&handle)
        };
        let Some(entry) = entry else { return false };

        if let Some(name) = &entry.name {
            let mut names = self.inner.names.lock().expect("name index poisoned");
            names.by_name.remove(name);
            names.by_handle.remove(&handle);
        }

        if let (Some(name), Some(registry)) = (&entry.name, &self.inner.registry) {
            if let Err(e) = registry.unregister_local_actor(name, handle).await {
                warn!(name = %name, handle = %handle, error = %e, "cluster unregister failed");
            }
        }

        entry.cancel.cancel();
        let mut stopped = entry.stopped.clone();
        while !*stopped.borrow() {
            if stopped.changed().await.is_err() {
                break;
            }
        }

        self.inner.metrics.unregister(handle);
        debug!(handle = %handle, "actor killed");
        true
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Reference by handle. Local-table lookup only.
    pub fn get_by_handle(&self, handle: ActorHandle) -> Result<ActorRef> {
        let actors = self.inner.actors.read().expect("actor table poisoned");
        if actors.contains_key(&handle) {
            Ok(ActorRef {
                handle,
                system: self.clone(),
            })
        } else {
            Err(Error::actor_not_found(handle.raw()))
        }
    }

    /// Reference by name, consulting the cluster registry before failing.
    pub async fn get_by_name(&self, name: &str) -> Result<ActorRef> {
        if let Some(handle) = self.try_get_handle_by_name(name) {
            return Ok(ActorRef {
                handle,
                system: self.clone(),
            });
        }

        if let Some(registry) = &self.inner.registry {
            match registry.try_resolve_by_name(name).await {
                Ok(Some(location)) => {
                    return Ok(ActorRef {
                        handle: location.handle,
                        system: self.clone(),
                    })
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(name = %name, error = %e, "registry lookup failed");
                }
            }
        }

        Err(Error::NameNotFound {
            name: name.to_string(),
        })
    }

    /// Local name-index lookup.
    pub fn try_get_handle_by_name(&self, name: &str) -> Option<ActorHandle> {
        self.inner
            .names
            .lock()
            .expect("name index poisoned")
            .by_name
            .get(name)
            .copied()
    }

    /// Get the sole actor with this name, creating it when absent. The
    /// factory runs at most once successfully; concurrent callers receive
    /// the same handle.
    pub async fn get_or_create_unique<A, F>(&self, name: &str, factory: F) -> Result<ActorRef>
    where
        A: Actor,
        F: FnOnce() -> Result<A>,
    {
        let lock = {
            let mut locks = self.inner.unique_locks.lock().await;
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        match self.get_by_name(name).await {
            Ok(actor_ref) => Ok(actor_ref),
            Err(Error::NameNotFound { .. }) => {
                self.create(factory, CreateOptions::named(name)).await
            }
            Err(e) => Err(e),
        }
    }

    /// True when the handle is hosted by this process.
    pub fn is_local(&self, handle: ActorHandle) -> bool {
        self.inner
            .actors
            .read()
            .expect("actor table poisoned")
            .contains_key(&handle)
    }

    /// Snapshot of all local actors.
    pub fn list_actors(&self) -> Vec<ActorInfo> {
        let actors = self.inner.actors.read().expect("actor table poisoned");
        actors
            .iter()
            .map(|(handle, entry)| ActorInfo {
                handle: *handle,
                name: entry.name.clone(),
                impl_tag: entry.impl_tag.clone(),
            })
            .collect()
    }

    /// Metrics snapshot of one actor.
    pub fn try_snapshot(&self, handle: ActorHandle) -> Option<MetricsSnapshot> {
        self.inner.metrics.try_snapshot(handle)
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Fire-and-forget. Completes when the transport accepted the envelope.
    pub async fn send(&self, to: ActorHandle, payload: Payload) -> Result<()> {
        self.send_from(None, to, payload).await
    }

    /// Fire-and-forget with an explicit sender.
    pub async fn send_from(
        &self,
        from: Option<ActorHandle>,
        to: ActorHandle,
        payload: Payload,
    ) -> Result<()> {
        let envelope = self.make_envelope(from, to, CallType::Send, payload);
        self.transport().send(envelope, None).await
    }

    /// Request/response with the default timeout.
    pub async fn call(&self, to: ActorHandle, payload: Payload) -> Result<Payload> {
        self.call_from(
            None,
            to,
            payload,
            Some(Duration::from_millis(CALL_TIMEOUT_MS_DEFAULT)),
        )
        .await
    }

    /// Request/response. `timeout = None` waits indefinitely.
    pub async fn call_from(
        &self,
        from: Option<ActorHandle>,
        to: ActorHandle,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Payload> {
        let envelope = self.make_envelope(from, to, CallType::Call, payload);
        let (promise, receiver) = response_channel();
        let cancel = self.inner.shutdown_token.child_token();

        // The timeout completes the promise; transports watching the token
        // then drop their pending-call bookkeeping.
        if let Some(timeout) = timeout {
            let promise = promise.clone();
            let cancel = cancel.clone();
            let handle = to.raw();
            let timeout_ms = timeout.as_millis() as u64;
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        promise.complete(Err(Error::CallTimeout { handle, timeout_ms }));
                        cancel.cancel();
                    }
                }
            });
        }

        self.transport()
            .send(envelope, Some(CallReply { promise, cancel: cancel.clone() }))
            .await?;

        let result = receiver.recv().await;
        // A settled call no longer needs its watchers.
        cancel.cancel();
        result
    }

    fn make_envelope(
        &self,
        from: Option<ActorHandle>,
        to: ActorHandle,
        call_type: CallType,
        payload: Payload,
    ) -> Envelope {
        Envelope {
            message_id: self.inner.message_ids.fetch_add(1, Ordering::SeqCst),
            from: from.unwrap_or(ActorHandle::NONE),
            to,
            call_type,
            payload,
            trace_id: trace::capture_or_new(),
            timestamp_ms: self.inner.time.now_ms(),
            ttl_ms: None,
            version: PROTOCOL_VERSION,
        }
    }

    /// Local delivery entry point used by every transport: look up the
    /// entry, wait for startup, enqueue. Unknown targets fail the reply
    /// promise and the caller.
    pub async fn deliver_local(
        &self,
        envelope: Envelope,
        reply: Option<ResponsePromise>,
    ) -> Result<()> {
        let to = envelope.to;
        let (sender, mut startup) = {
            let actors = self.inner.actors.read().expect("actor table poisoned");
            match actors.get(&to) {
                Some(entry) => (entry.sender.clone(), entry.startup.clone()),
                None => {
                    if let Some(reply) = reply {
                        reply.complete(Err(Error::actor_not_found(to.raw())));
                    }
                    return Err(Error::actor_not_found(to.raw()));
                }
            }
        };

        loop {
            match startup.borrow().clone() {
                StartupState::Started => break,
                StartupState::Failed(reason) => {
                    if let Some(reply) = reply {
                        reply.complete(Err(Error::ActorStartFailed {
                            handle: to.raw(),
                            reason: reason.clone(),
                        }));
                    }
                    return Err(Error::ActorStartFailed {
                        handle: to.raw(),
                        reason,
                    });
                }
                StartupState::Pending => {}
            }
            if startup.changed().await.is_err() {
                if let Some(reply) = reply {
                    reply.complete(Err(Error::actor_not_found(to.raw())));
                }
                return Err(Error::actor_not_found(to.raw()));
            }
        }

        sender.enqueue(Delivery { envelope, reply }).await
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop every actor, then dispose owned infrastructure.
    pub async fn shutdown(&self) {
        info!(node_id = %self.inner.config.node_id, "actor system shutting down");
        self.inner.shutdown_token.cancel();

        let handles: Vec<ActorHandle> = {
            let actors = self.inner.actors.read().expect("actor table poisoned");
            actors.keys().copied().collect()
        };
        for handle in handles {
            self.kill(handle).await;
        }

        if self.inner.transport_owned {
            if let Some(transport) = self.inner.transport.get() {
                if let Err(e) = transport.shutdown().await {
                    warn!(error = %e, "transport shutdown failed");
                }
            }
        }

        if self.inner.registry_owned {
            if let Some(registry) = &self.inner.registry {
                if let Err(e) = registry.shutdown().await {
                    warn!(error = %e, "registry shutdown failed");
                }
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "must not be empty".into(),
        });
    }
    if name.len() > ACTOR_NAME_LENGTH_BYTES_MAX {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: format!(
                "length {} exceeds limit {}",
                name.len(),
                ACTOR_NAME_LENGTH_BYTES_MAX
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct Echo;

    #[async_trait]
    impl Actor for Echo {
        async fn handle(
            &mut self,
            _ctx: &ActorContext,
            envelope: Envelope,
        ) -> Result<Option<Payload>> {
            Ok(Some(envelope.payload))
        }
    }

    struct FailsToStart;

    #[async_trait]
    impl Actor for FailsToStart {
        async fn on_start(&mut self, _ctx: &ActorContext) -> Result<()> {
            Err(Error::internal("boom"))
        }

        async fn handle(
            &mut self,
            _ctx: &ActorContext,
            _envelope: Envelope,
        ) -> Result<Option<Payload>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_first_message_id_is_one() {
        let system = ActorSystem::new().unwrap();
        let env = system.make_envelope(
            None,
            ActorHandle::from_raw(1),
            CallType::Send,
            Payload::empty(),
        );
        assert_eq!(env.message_id, 1);
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_and_call() {
        let system = ActorSystem::new().unwrap();
        let actor = system
            .create(|| Ok(Echo), CreateOptions::default())
            .await
            .unwrap();

        let reply = actor
            .call(Payload::new("m", Bytes::from_static(b"hi")), None)
            .await
            .unwrap();
        assert_eq!(reply.data, Bytes::from_static(b"hi"));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let system = ActorSystem::new().unwrap();
        system
            .create(|| Ok(Echo), CreateOptions::named("echo"))
            .await
            .unwrap();
        let result = system.create(|| Ok(Echo), CreateOptions::named("echo")).await;
        assert!(matches!(result, Err(Error::NameAlreadyRegistered { .. })));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_handle_rejected() {
        let system = ActorSystem::new().unwrap();
        let handle = ActorHandle::new(777).unwrap();
        system
            .create(|| Ok(Echo), CreateOptions::with_handle(handle))
            .await
            .unwrap();
        let result = system
            .create(|| Ok(Echo), CreateOptions::with_handle(handle))
            .await;
        assert!(matches!(result, Err(Error::HandleAlreadyInUse { .. })));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back() {
        let system = ActorSystem::new().unwrap();
        let result = system
            .create(|| Ok(FailsToStart), CreateOptions::named("broken"))
            .await;
        assert!(matches!(result, Err(Error::ActorStartFailed { .. })));

        // Name and entry are gone; a fresh actor can reuse the name.
        assert!(system.try_get_handle_by_name("broken").is_none());
        system
            .create(|| Ok(Echo), CreateOptions::named("broken"))
            .await
            .unwrap();
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_kill_returns_presence() {
        let system = ActorSystem::new().unwrap();
        let actor = system
            .create(|| Ok(Echo), CreateOptions::default())
            .await
            .unwrap();

        assert!(system.kill(actor.handle()).await);
        assert!(!system.kill(actor.handle()).await);
        assert!(system.get_by_handle(actor.handle()).is_err());
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_to_unknown_fails() {
        let system = ActorSystem::new().unwrap();
        let result = system
            .send(ActorHandle::from_raw(12345), Payload::empty())
            .await;
        assert!(matches!(result, Err(Error::ActorNotFound { .. })));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_timeout() {
        struct Sleeper;

        #[async_trait]
        impl Actor for Sleeper {
            async fn handle(
                &mut self,
                _ctx: &ActorContext,
                _envelope: Envelope,
            ) -> Result<Option<Payload>> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(None)
            }
        }

        let system = ActorSystem::new().unwrap();
        let actor = system
            .create(|| Ok(Sleeper), CreateOptions::default())
            .await
            .unwrap();

        let result = actor
            .call(Payload::empty(), Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(Error::CallTimeout { .. })));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_handle_offset_partitions_space() {
        let config = ActorSystemConfig {
            handle_offset: 10_000,
            ..Default::default()
        };
        let system = ActorSystem::builder(config).build().unwrap();
        let actor = system
            .create(|| Ok(Echo), CreateOptions::default())
            .await
            .unwrap();
        assert_eq!(actor.handle().raw(), 10_001);
        system.shutdown().await;
    }
}
