//! Physical clock
//!
//! The trust pipeline itself never reads the clock; every operation takes the
//! current time as an argument. Drivers obtain that time from a
//! `PhysicalClock`, which tests replace with a `ManualClock`.

use crate::packet::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Source of wall-clock time in milliseconds
pub trait PhysicalClock: Send + Sync {
    /// Milliseconds since the UNIX epoch
    fn now_ms(&self) -> Timestamp;
}

impl<T: PhysicalClock + ?Sized> PhysicalClock for Arc<T> {
    fn now_ms(&self) -> Timestamp {
        (**self).now_ms()
    }
}

/// Operating system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually advanced clock for tests and replays.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock starting at `start_ms`
    pub fn with_start_ms(start_ms: Timestamp) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set_ms(&self, now_ms: Timestamp) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl PhysicalClock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.now_ms.load(Ordering::SeqCst)
    }
}
