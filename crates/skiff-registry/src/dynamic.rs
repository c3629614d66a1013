//! KV-backed dynamic registry.
//!
//! Every local registration writes three TTL'd keys (node descriptor,
//! service location, handle owner); a background refresher extends the
//! TTLs, so a crashed node's entries evict on expiry. A pub/sub channel
//! carries registration events that prime and invalidate the per-process
//! lookup cache on other nodes.
//!
//! Invalidations are fire-and-forget: the staleness of a remote cache is
//! bounded by `cache_ttl_ms`, not by acknowledgement. Callers that need
//! strict consistency must read through to the backend.

use crate::error::{RegistryError, RegistryResult};
use crate::kv::KvStore;
use crate::node::{NodeDescriptor, NodeId};
use crate::registry::{ActorLocation, ClusterRegistry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skiff_core::constants::{
    REGISTRATION_TTL_MS_DEFAULT, REGISTRY_CACHE_TTL_MS_DEFAULT,
    REGISTRY_HEARTBEAT_INTERVAL_MS_DEFAULT,
};
use skiff_core::handle::ActorHandle;
use skiff_core::io::{TimeProvider, WallClockTime};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for the dynamic registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicRegistryConfig {
    /// Backend connection string. Empty selects the in-memory backend.
    #[serde(default)]
    pub connection_string: String,

    /// Backend database index, for backends that have one.
    #[serde(default)]
    pub database_index: u32,

    /// Namespace prefix for all keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// This node's identifier.
    pub node_id: String,

    /// Endpoint other nodes use to reach this node's cluster transport.
    pub local_endpoint: SocketAddr,

    /// TTL applied to every registration key.
    #[serde(default = "default_registration_ttl")]
    pub registration_ttl_ms: u64,

    /// Interval between TTL refreshes. Must be > 0 and < the TTL.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Lifetime of remote entries in the lookup cache.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_ms: u64,
}

fn default_key_prefix() -> String {
    "skiff".to_string()
}

fn default_registration_ttl() -> u64 {
    REGISTRATION_TTL_MS_DEFAULT
}

fn default_heartbeat_interval() -> u64 {
    REGISTRY_HEARTBEAT_INTERVAL_MS_DEFAULT
}

fn default_cache_ttl() -> u64 {
    REGISTRY_CACHE_TTL_MS_DEFAULT
}

impl DynamicRegistryConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.key_prefix.is_empty() {
            return Err(RegistryError::invalid_configuration(
                "key_prefix",
                "must not be empty",
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(RegistryError::invalid_configuration(
                "heartbeat_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.heartbeat_interval_ms >= self.registration_ttl_ms {
            return Err(RegistryError::invalid_configuration(
                "heartbeat_interval_ms",
                format!(
                    "{} must be less than registration_ttl_ms {}",
                    self.heartbeat_interval_ms, self.registration_ttl_ms
                ),
            ));
        }
        Ok(())
    }
}

struct CacheEntry<T> {
    value: T,
    expires_at_ms: u64,
}

/// Cache expiry marker for entries this node owns.
const NEVER_EXPIRES_MS: u64 = u64::MAX;

/// Dynamic registry over a [`KvStore`].
pub struct DynamicRegistry {
    config: DynamicRegistryConfig,
    node_id: NodeId,
    descriptor: NodeDescriptor,
    kv: Arc<dyn KvStore>,
    time: Arc<dyn TimeProvider>,
    local_registrations: Mutex<HashMap<String, ActorHandle>>,
    name_cache: Mutex<HashMap<String, CacheEntry<ActorLocation>>>,
    handle_cache: Mutex<HashMap<ActorHandle, CacheEntry<NodeId>>>,
    token: CancellationToken,
}

impl DynamicRegistry {
    /// Validate the configuration, publish this node's descriptor, and
    /// start the refresher and event-subscription tasks.
    pub async fn start(
        config: DynamicRegistryConfig,
        kv: Arc<dyn KvStore>,
    ) -> RegistryResult<Arc<Self>> {
        Self::start_with_time(config, kv, Arc::new(WallClockTime::new())).await
    }

    /// `start` with an injected clock.
    pub async fn start_with_time(
        config: DynamicRegistryConfig,
        kv: Arc<dyn KvStore>,
        time: Arc<dyn TimeProvider>,
    ) -> RegistryResult<Arc<Self>> {
        config.validate()?;
        let node_id = NodeId::new(config.node_id.clone())?;
        let descriptor = NodeDescriptor::new(node_id.clone(), config.local_endpoint);

        let registry = Arc::new(Self {
            node_id,
            descriptor,
            kv,
            time,
            local_registrations: Mutex::new(HashMap::new()),
            name_cache: Mutex::new(HashMap::new()),
            handle_cache: Mutex::new(HashMap::new()),
            token: CancellationToken::new(),
            config,
        });

        registry.publish_node_descriptor().await?;

        let subscription = registry
            .kv
            .subscribe(&registry.events_channel())
            .await?;
        tokio::spawn(Arc::clone(&registry).run_subscriber(subscription));
        tokio::spawn(Arc::clone(&registry).run_refresher());

        Ok(registry)
    }

    // =========================================================================
    // Key scheme
    // =========================================================================

    fn node_key(&self, node_id: &NodeId) -> String {
        format!("{}:nodes:{}", self.config.key_prefix, node_id)
    }

    fn service_key(&self, name: &str) -> String {
        format!("{}:services:{}", self.config.key_prefix, name)
    }

    fn handle_key(&self, handle: ActorHandle) -> String {
        format!("{}:handles:{}", self.config.key_prefix, handle.raw())
    }

    fn events_channel(&self) -> String {
        format!("{}:events", self.config.key_prefix)
    }

    // =========================================================================
    // Background tasks
    // =========================================================================

    async fn publish_node_descriptor(&self) -> RegistryResult<()> {
        let value = serde_json::to_string(&self.descriptor)
            .map_err(|e| RegistryError::internal(e.to_string()))?;
        self.kv
            .set(
                &self.node_key(&self.node_id),
                &value,
                self.config.registration_ttl_ms,
            )
            .await
    }

    async fn run_refresher(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = self.time.sleep_ms(self.config.heartbeat_interval_ms) => {}
            }

            if let Err(e) = self.refresh_once().await {
                warn!(node = %self.node_id, error = %e, "registry refresh failed");
            }
        }
    }

    async fn refresh_once(&self) -> RegistryResult<()> {
        let ttl = self.config.registration_ttl_ms;

        // A lapsed key (refresh returns false) is re-written rather than
        // left to disappear.
        if !self.kv.refresh_ttl(&self.node_key(&self.node_id), ttl).await? {
            self.publish_node_descriptor().await?;
        }

        let registrations: Vec<(String, ActorHandle)> = {
            let local = self
                .local_registrations
                .lock()
                .expect("registrations lock poisoned");
            local.iter().map(|(n, h)| (n.clone(), *h)).collect()
        };

        for (name, handle) in registrations {
            let service_key = self.service_key(&name);
            if !self.kv.refresh_ttl(&service_key, ttl).await? {
                let location = ActorLocation::new(self.node_id.clone(), handle);
                let value = serde_json::to_string(&location)
                    .map_err(|e| RegistryError::internal(e.to_string()))?;
                self.kv.set(&service_key, &value, ttl).await?;
            }

            let handle_key = self.handle_key(handle);
            if !self.kv.refresh_ttl(&handle_key, ttl).await? {
                self.kv
                    .set(&handle_key, self.node_id.as_str(), ttl)
                    .await?;
            }
        }

        Ok(())
    }

    async fn run_subscriber(self: Arc<Self>, mut subscription: crate::kv::KvSubscription) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                message = subscription.next() => match message {
                    Some(message) => self.handle_event(&message),
                    None => break,
                },
            }
        }
    }

    /// Apply one `service|name|node|handle` or `remove|name|handle`
    /// notification to the lookup cache.
    fn handle_event(&self, message: &str) {
        let parts: Vec<&str> = message.split('|').collect();
        match parts.as_slice() {
            ["service", name, node, handle] => {
                if self.owns_name(name) {
                    return;
                }
                let Ok(node_id) = NodeId::new(*node) else {
                    warn!(message, "malformed service event");
                    return;
                };
                let Ok(raw) = handle.parse::<u64>() else {
                    warn!(message, "malformed service event");
                    return;
                };
                let handle = ActorHandle::from_raw(raw);
                let expires = self.remote_expiry();
                self.name_cache
                    .lock()
                    .expect("name cache poisoned")
                    .insert(
                        name.to_string(),
                        CacheEntry {
                            value: ActorLocation::new(node_id.clone(), handle),
                            expires_at_ms: expires,
                        },
                    );
                self.handle_cache
                    .lock()
                    .expect("handle cache poisoned")
                    .insert(
                        handle,
                        CacheEntry {
                            value: node_id,
                            expires_at_ms: expires,
                        },
                    );
                debug!(name, "primed registry cache from event");
            }
            ["remove", name, handle] => {
                if self.owns_name(name) {
                    return;
                }
                self.name_cache
                    .lock()
                    .expect("name cache poisoned")
                    .remove(*name);
                if let Ok(raw) = handle.parse::<u64>() {
                    self.handle_cache
                        .lock()
                        .expect("handle cache poisoned")
                        .remove(&ActorHandle::from_raw(raw));
                }
                debug!(name, "invalidated registry cache from event");
            }
            _ => warn!(message, "unrecognized registry event"),
        }
    }

    fn owns_name(&self, name: &str) -> bool {
        self.local_registrations
            .lock()
            .expect("registrations lock poisoned")
            .contains_key(name)
    }

    fn remote_expiry(&self) -> u64 {
        self.time
            .now_ms()
            .saturating_add(self.config.cache_ttl_ms)
    }

    fn cached_location(&self, name: &str) -> Option<ActorLocation> {
        let mut cache = self.name_cache.lock().expect("name cache poisoned");
        match cache.get(name) {
            Some(entry) if entry.expires_at_ms > self.time.now_ms() => Some(entry.value.clone()),
            Some(_) => {
                cache.remove(name);
                None
            }
            None => None,
        }
    }

    fn cached_node_for(&self, handle: ActorHandle) -> Option<NodeId> {
        let mut cache = self.handle_cache.lock().expect("handle cache poisoned");
        match cache.get(&handle) {
            Some(entry) if entry.expires_at_ms > self.time.now_ms() => Some(entry.value.clone()),
            Some(_) => {
                cache.remove(&handle);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl ClusterRegistry for DynamicRegistry {
    fn local_node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn try_resolve_by_name(&self, name: &str) -> RegistryResult<Option<ActorLocation>> {
        if let Some(location) = self.cached_location(name) {
            return Ok(Some(location));
        }

        // Reads on an unreachable backend degrade to "not found".
        let value = match self.kv.get(&self.service_key(name)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(name, error = %e, "registry read failed");
                return Ok(None);
            }
        };
        let Some(value) = value else { return Ok(None) };

        let location: ActorLocation = match serde_json::from_str(&value) {
            Ok(location) => location,
            Err(e) => {
                warn!(name, error = %e, "malformed service record");
                return Ok(None);
            }
        };

        self.name_cache
            .lock()
            .expect("name cache poisoned")
            .insert(
                name.to_string(),
                CacheEntry {
                    value: location.clone(),
                    expires_at_ms: self.remote_expiry(),
                },
            );
        Ok(Some(location))
    }

    async fn try_resolve_by_handle(
        &self,
        handle: ActorHandle,
    ) -> RegistryResult<Option<ActorLocation>> {
        if let Some(node_id) = self.cached_node_for(handle) {
            return Ok(Some(ActorLocation::new(node_id, handle)));
        }

        let value = match self.kv.get(&self.handle_key(handle)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(handle = %handle, error = %e, "registry read failed");
                return Ok(None);
            }
        };
        let Some(value) = value else { return Ok(None) };

        let node_id = NodeId::new(value)?;
        self.handle_cache
            .lock()
            .expect("handle cache poisoned")
            .insert(
                handle,
                CacheEntry {
                    value: node_id.clone(),
                    expires_at_ms: self.remote_expiry(),
                },
            );
        Ok(Some(ActorLocation::new(node_id, handle)))
    }

    async fn try_get_node(&self, node_id: &NodeId) -> RegistryResult<Option<NodeDescriptor>> {
        let value = match self.kv.get(&self.node_key(node_id)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(node = %node_id, error = %e, "registry read failed");
                return Ok(None);
            }
        };
        let Some(value) = value else { return Ok(None) };

        match serde_json::from_str(&value) {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(e) => {
                warn!(node = %node_id, error = %e, "malformed node record");
                Ok(None)
            }
        }
    }

    async fn register_local_actor(&self, name: &str, handle: ActorHandle) -> RegistryResult<()> {
        let location = ActorLocation::new(self.node_id.clone(), handle);
        let value = serde_json::to_string(&location)
            .map_err(|e| RegistryError::internal(e.to_string()))?;
        let ttl = self.config.registration_ttl_ms;
        let service_key = self.service_key(name);

        if let Some(existing) = self.kv.set_if_absent(&service_key, &value, ttl).await? {
            let owner = serde_json::from_str::<ActorLocation>(&existing)
                .map(|l| l.node_id)
                .ok();
            match owner {
                Some(owner) if owner != self.node_id => {
                    return Err(RegistryError::NameAlreadyClaimed {
                        name: name.to_string(),
                        owner_node: owner.to_string(),
                    });
                }
                // Our own (or unreadable) record: take the slot over.
                _ => self.kv.set(&service_key, &value, ttl).await?,
            }
        }

        self.kv
            .set(&self.handle_key(handle), self.node_id.as_str(), ttl)
            .await?;

        self.local_registrations
            .lock()
            .expect("registrations lock poisoned")
            .insert(name.to_string(), handle);
        self.name_cache
            .lock()
            .expect("name cache poisoned")
            .insert(
                name.to_string(),
                CacheEntry {
                    value: location,
                    expires_at_ms: NEVER_EXPIRES_MS,
                },
            );
        self.handle_cache
            .lock()
            .expect("handle cache poisoned")
            .insert(
                handle,
                CacheEntry {
                    value: self.node_id.clone(),
                    expires_at_ms: NEVER_EXPIRES_MS,
                },
            );

        self.kv
            .publish(
                &self.events_channel(),
                &format!("service|{}|{}|{}", name, self.node_id, handle.raw()),
            )
            .await?;

        debug!(name, handle = %handle, "registered local actor");
        Ok(())
    }

    async fn unregister_local_actor(&self, name: &str, handle: ActorHandle) -> RegistryResult<()> {
        self.local_registrations
            .lock()
            .expect("registrations lock poisoned")
            .remove(name);
        self.name_cache
            .lock()
            .expect("name cache poisoned")
            .remove(name);
        self.handle_cache
            .lock()
            .expect("handle cache poisoned")
            .remove(&handle);

        self.kv.delete(&self.service_key(name)).await?;
        self.kv.delete(&self.handle_key(handle)).await?;

        self.kv
            .publish(
                &self.events_channel(),
                &format!("remove|{}|{}", name, handle.raw()),
            )
            .await?;

        debug!(name, handle = %handle, "unregistered local actor");
        Ok(())
    }

    /// Withdraw this node's entries instead of waiting for TTL expiry.
    async fn shutdown(&self) -> RegistryResult<()> {
        self.token.cancel();

        let registrations: Vec<(String, ActorHandle)> = {
            let mut local = self
                .local_registrations
                .lock()
                .expect("registrations lock poisoned");
            local.drain().collect()
        };
        for (name, handle) in registrations {
            self.kv.delete(&self.service_key(&name)).await?;
            self.kv.delete(&self.handle_key(handle)).await?;
            self.kv
                .publish(
                    &self.events_channel(),
                    &format!("remove|{}|{}", name, handle.raw()),
                )
                .await?;
        }

        self.kv.delete(&self.node_key(&self.node_id)).await?;
        self.name_cache
            .lock()
            .expect("name cache poisoned")
            .clear();
        self.handle_cache
            .lock()
            .expect("handle cache poisoned")
            .clear();
        Ok(())
    }
}
