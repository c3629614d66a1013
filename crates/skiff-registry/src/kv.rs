//! Generic KV backend for the dynamic registry.
//!
//! The dynamic registry only needs TTL'd writes, set-if-absent claims,
//! and a pub/sub channel; any store with those primitives can back it.

use crate::error::{RegistryError, RegistryResult};
use async_trait::async_trait;
use skiff_core::io::{TimeProvider, WallClockTime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Stream of messages from a subscribed channel.
pub struct KvSubscription {
    rx: mpsc::UnboundedReceiver<String>,
}

impl KvSubscription {
    /// Next published message, or `None` once the backend is gone.
    pub async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Key/value store with TTLs and pub/sub.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `key` only when absent. Returns the existing value on
    /// contention. `ttl_ms = 0` means no expiry.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
    ) -> RegistryResult<Option<String>>;

    /// Set `key`, replacing any existing value.
    async fn set(&self, key: &str, value: &str, ttl_ms: u64) -> RegistryResult<()>;

    /// Read a key. Expired keys read as absent.
    async fn get(&self, key: &str) -> RegistryResult<Option<String>>;

    /// Extend a key's TTL. Returns false when the key does not exist.
    async fn refresh_ttl(&self, key: &str, ttl_ms: u64) -> RegistryResult<bool>;

    /// Delete a key. Returns true when a live key was removed.
    async fn delete(&self, key: &str) -> RegistryResult<bool>;

    /// Publish a message to a channel.
    async fn publish(&self, channel: &str, message: &str) -> RegistryResult<()>;

    /// Subscribe to a channel.
    async fn subscribe(&self, channel: &str) -> RegistryResult<KvSubscription>;
}

struct KvEntry {
    value: String,
    expires_at_ms: Option<u64>,
}

/// In-memory KV backend.
///
/// Shared across "nodes" in tests by cloning the `Arc`; TTL expiry follows
/// the injected clock.
pub struct MemoryKv {
    entries: Mutex<HashMap<String, KvEntry>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>,
    time: Arc<dyn TimeProvider>,
}

impl MemoryKv {
    /// Create a store on the wall clock.
    pub fn new() -> Self {
        Self::with_time(Arc::new(WallClockTime::new()))
    }

    /// Create a store with an injected clock.
    pub fn with_time(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            time,
        }
    }

    fn expiry(&self, ttl_ms: u64) -> Option<u64> {
        (ttl_ms > 0).then(|| self.time.now_ms().saturating_add(ttl_ms))
    }

    fn is_expired(&self, entry: &KvEntry) -> bool {
        entry
            .expires_at_ms
            .is_some_and(|expires| self.time.now_ms() >= expires)
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
    ) -> RegistryResult<Option<String>> {
        let mut entries = self.entries.lock().expect("kv lock poisoned");
        if let Some(existing) = entries.get(key) {
            if !self.is_expired(existing) {
                return Ok(Some(existing.value.clone()));
            }
        }
        entries.insert(
            key.to_string(),
            KvEntry {
                value: value.to_string(),
                expires_at_ms: self.expiry(ttl_ms),
            },
        );
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_ms: u64) -> RegistryResult<()> {
        self.entries.lock().expect("kv lock poisoned").insert(
            key.to_string(),
            KvEntry {
                value: value.to_string(),
                expires_at_ms: self.expiry(ttl_ms),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> RegistryResult<Option<String>> {
        let mut entries = self.entries.lock().expect("kv lock poisoned");
        let expired = match entries.get(key) {
            Some(entry) => self.is_expired(entry),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn refresh_ttl(&self, key: &str, ttl_ms: u64) -> RegistryResult<bool> {
        let mut entries = self.entries.lock().expect("kv lock poisoned");
        let expired = match entries.get(key) {
            Some(entry) => self.is_expired(entry),
            None => return Ok(false),
        };
        if expired {
            entries.remove(key);
            return Ok(false);
        }
        let new_expiry = self.expiry(ttl_ms);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at_ms = new_expiry;
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> RegistryResult<bool> {
        let mut entries = self.entries.lock().expect("kv lock poisoned");
        match entries.remove(key) {
            Some(entry) => Ok(!self.is_expired(&entry)),
            None => Ok(false),
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> RegistryResult<()> {
        let mut subscribers = self.subscribers.lock().expect("kv lock poisoned");
        if let Some(senders) = subscribers.get_mut(channel) {
            senders.retain(|tx| tx.send(message.to_string()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> RegistryResult<KvSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("kv lock poisoned")
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(KvSubscription { rx })
    }
}

/// Backend factory hook: the in-tree backend is memory-only; an external
/// store is selected through the registry's `connection_string`.
pub fn open_backend(connection_string: &str) -> RegistryResult<Arc<dyn KvStore>> {
    if connection_string.is_empty() || connection_string == "memory://" {
        return Ok(Arc::new(MemoryKv::new()));
    }
    Err(RegistryError::invalid_configuration(
        "connection_string",
        format!("unsupported backend: {connection_string}"),
    ))
}
