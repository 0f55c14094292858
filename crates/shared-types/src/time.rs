//! Wall-clock time port (for testability).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::entities::Timestamp;

/// Abstract interface for time operations.
pub trait TimeSource: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> Timestamp;
}

/// Default time source using system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven time source for tests and deterministic replays.
#[derive(Debug, Default)]
pub struct FixedTimeSource {
    now: AtomicU64,
}

impl FixedTimeSource {
    pub fn new(now_ms: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: Timestamp) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
