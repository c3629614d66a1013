//! Time abstraction.
//!
//! Code that reads the clock or sleeps goes through [`TimeProvider`] so
//! TTL and timeout behavior stays testable with a manual clock.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static MONOTONIC_ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Clock abstraction used by metrics, TTL bookkeeping, and idle monitors.
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Monotonic timestamp in milliseconds, for measuring durations.
    fn monotonic_ms(&self) -> u64 {
        self.now_ms()
    }

    /// Sleep for the given number of milliseconds.
    async fn sleep_ms(&self, ms: u64);
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Default)]
pub struct WallClockTime;

impl WallClockTime {
    /// Create a wall-clock provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn monotonic_ms(&self) -> u64 {
        MONOTONIC_ANCHOR.elapsed().as_millis() as u64
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

/// Manually advanced clock for tests. `sleep_ms` advances the clock and
/// returns immediately.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock at the given instant.
    pub fn new(initial_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(initial_ms),
        }
    }

    /// Advance the clock.
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set the clock to an absolute value.
    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl TimeProvider for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    async fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
        // Let other tasks observe the new time before the sleeper resumes.
        tokio::task::yield_now().await;
    }
}
