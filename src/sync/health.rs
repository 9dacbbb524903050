//! Liveness signal for the sync pipeline.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;

/// Shared liveness signal: how far the indexer has applied and how fresh
/// the last applied event is. Updated lock-free from both sync paths;
/// operators read it to observe sync lag.
#[derive(Debug, Default)]
pub struct SyncHealth {
    last_applied_block: AtomicU64,
    /// Unix seconds of the last applied event; 0 until the first one.
    last_event_unix: AtomicI64,
}

/// Point-in-time view of the liveness signal.
#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    pub last_applied_block: u64,
    /// Seconds since the last applied event; None before the first one.
    pub seconds_since_last_event: Option<i64>,
}

impl SyncHealth {
    /// Record a freshly applied event.
    pub fn record_applied(&self, block_number: u64) {
        self.last_applied_block
            .fetch_max(block_number, Ordering::Relaxed);
        self.last_event_unix
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// Record checkpoint progress through quiet block ranges, so lag does
    /// not appear to grow while the chain is simply idle.
    pub fn record_checkpoint(&self, block_number: u64) {
        self.last_applied_block
            .fetch_max(block_number, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_event = self.last_event_unix.load(Ordering::Relaxed);
        HealthSnapshot {
            last_applied_block: self.last_applied_block.load(Ordering::Relaxed),
            seconds_since_last_event: (last_event > 0)
                .then(|| (Utc::now().timestamp() - last_event).max(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_watermark_never_decreases() {
        let health = SyncHealth::default();
        health.record_applied(50);
        health.record_checkpoint(40);
        assert_eq!(health.snapshot().last_applied_block, 50);
        health.record_checkpoint(60);
        assert_eq!(health.snapshot().last_applied_block, 60);
    }

    #[test]
    fn event_age_is_none_until_first_apply() {
        let health = SyncHealth::default();
        assert!(health.snapshot().seconds_since_last_event.is_none());
        health.record_applied(1);
        assert!(health.snapshot().seconds_since_last_event.is_some());
    }
}
