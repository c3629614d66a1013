//! Per-actor metrics.
//!
//! Counters are atomics so recording is O(1) and safe from any thread;
//! the registry lock is only taken for registration and snapshots.

use crate::handle::ActorHandle;
use crate::io::{TimeProvider, WallClockTime};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Live counters for one actor.
#[derive(Debug)]
pub struct ActorMetrics {
    name: Option<String>,
    impl_tag: String,
    created_at_ms: u64,
    queue_len: AtomicI64,
    processed: AtomicU64,
    exceptions: AtomicU64,
    ticks_us_total: AtomicU64,
    last_enqueued_ms: AtomicU64,
    last_processed_ms: AtomicU64,
    trace_enabled: AtomicBool,
}

impl ActorMetrics {
    fn new(name: Option<String>, impl_tag: String, created_at_ms: u64) -> Self {
        Self {
            name,
            impl_tag,
            created_at_ms,
            queue_len: AtomicI64::new(0),
            processed: AtomicU64::new(0),
            exceptions: AtomicU64::new(0),
            ticks_us_total: AtomicU64::new(0),
            last_enqueued_ms: AtomicU64::new(0),
            last_processed_ms: AtomicU64::new(0),
            trace_enabled: AtomicBool::new(false),
        }
    }

    /// Whether message tracing is enabled for this actor.
    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled.load(Ordering::Relaxed)
    }
}

/// Point-in-time value copy of one actor's counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub handle: ActorHandle,
    pub name: Option<String>,
    pub impl_tag: String,
    pub created_at_ms: u64,
    pub queue_len: u64,
    pub processed: u64,
    pub exceptions: u64,
    pub avg_processing_us: u64,
    pub last_enqueued_ms: u64,
    pub last_processed_ms: u64,
    pub trace_enabled: bool,
}

/// Registry of per-actor metrics keyed by handle.
#[derive(Debug)]
pub struct MetricsRegistry {
    entries: RwLock<HashMap<ActorHandle, Arc<ActorMetrics>>>,
    time: Arc<dyn TimeProvider>,
}

impl MetricsRegistry {
    /// Create a registry on the wall clock.
    pub fn new() -> Self {
        Self::with_time(Arc::new(WallClockTime::new()))
    }

    /// Create a registry with an injected clock.
    pub fn with_time(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            time,
        }
    }

    /// Bind a handle to a metrics entry. Re-registration replaces the entry.
    pub fn register(&self, handle: ActorHandle, name: Option<String>, impl_tag: &str) {
        let entry = Arc::new(ActorMetrics::new(
            name,
            impl_tag.to_string(),
            self.time.now_ms(),
        ));
        self.entries
            .write()
            .expect("metrics lock poisoned")
            .insert(handle, entry);
    }

    /// Remove the entry for a handle. No-op when unknown.
    pub fn unregister(&self, handle: ActorHandle) {
        self.entries
            .write()
            .expect("metrics lock poisoned")
            .remove(&handle);
    }

    fn entry(&self, handle: ActorHandle) -> Option<Arc<ActorMetrics>> {
        self.entries
            .read()
            .expect("metrics lock poisoned")
            .get(&handle)
            .cloned()
    }

    /// Record an enqueue: queue gauge up, last-enqueued timestamp.
    pub fn record_enqueue(&self, handle: ActorHandle) {
        if let Some(entry) = self.entry(handle) {
            entry.queue_len.fetch_add(1, Ordering::Relaxed);
            entry
                .last_enqueued_ms
                .store(self.time.now_ms(), Ordering::Relaxed);
        }
    }

    /// Record a dequeue: queue gauge down, clamped at zero.
    pub fn record_dequeue(&self, handle: ActorHandle) {
        if let Some(entry) = self.entry(handle) {
            let _ = entry
                .queue_len
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                    Some((v - 1).max(0))
                });
        }
    }

    /// Record a completed invocation and its processing time.
    pub fn record_processed(&self, handle: ActorHandle, elapsed_us: u64) {
        if let Some(entry) = self.entry(handle) {
            entry.processed.fetch_add(1, Ordering::Relaxed);
            entry.ticks_us_total.fetch_add(elapsed_us, Ordering::Relaxed);
            entry
                .last_processed_ms
                .store(self.time.now_ms(), Ordering::Relaxed);
        }
    }

    /// Record a handler exception.
    pub fn record_exception(&self, handle: ActorHandle) {
        if let Some(entry) = self.entry(handle) {
            entry.exceptions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Toggle the trace bit. Returns true iff the state actually changed.
    pub fn set_trace_enabled(&self, handle: ActorHandle, enabled: bool) -> bool {
        match self.entry(handle) {
            Some(entry) => entry
                .trace_enabled
                .compare_exchange(!enabled, enabled, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok(),
            None => false,
        }
    }

    /// Whether tracing is enabled for a handle. Unknown handles are false.
    pub fn trace_enabled(&self, handle: ActorHandle) -> bool {
        self.entry(handle).map(|e| e.trace_enabled()).unwrap_or(false)
    }

    /// Value copy of one actor's counters.
    pub fn try_snapshot(&self, handle: ActorHandle) -> Option<MetricsSnapshot> {
        self.entry(handle).map(|e| snapshot_of(handle, &e))
    }

    /// Point-in-time slice of all registered actors.
    pub fn snapshot_all(&self) -> Vec<MetricsSnapshot> {
        let entries = self.entries.read().expect("metrics lock poisoned");
        entries
            .iter()
            .map(|(handle, entry)| snapshot_of(*handle, entry))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_of(handle: ActorHandle, entry: &ActorMetrics) -> MetricsSnapshot {
    let processed = entry.processed.load(Ordering::Relaxed);
    let ticks = entry.ticks_us_total.load(Ordering::Relaxed);
    let avg = if processed == 0 { 0 } else { ticks / processed };

    MetricsSnapshot {
        handle,
        name: entry.name.clone(),
        impl_tag: entry.impl_tag.clone(),
        created_at_ms: entry.created_at_ms,
        queue_len: entry.queue_len.load(Ordering::Relaxed).max(0) as u64,
        processed,
        exceptions: entry.exceptions.load(Ordering::Relaxed),
        avg_processing_us: avg,
        last_enqueued_ms: entry.last_enqueued_ms.load(Ordering::Relaxed),
        last_processed_ms: entry.last_processed_ms.load(Ordering::Relaxed),
        trace_enabled: entry.trace_enabled(),
    }
}
