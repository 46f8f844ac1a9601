use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between a logger handle, its worker and its sampler.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    suppressed: AtomicU64,
    dropped: AtomicU64,
    transport_errors: AtomicU64,
    probe_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Records accepted onto the queue.
    pub enqueued: u64,
    /// Records handed to the backend successfully.
    pub delivered: u64,
    /// Records rejected by the level gate or a filter.
    pub suppressed: u64,
    /// Records lost: queue full or closed, retries exhausted, stale samples evicted.
    pub dropped: u64,
    /// Failed delivery attempts, retries included.
    pub transport_errors: u64,
    /// Failed metric sub-queries.
    pub probe_errors: u64,
}

impl DeliveryStats {
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_errors(&self, count: u64) {
        self.probe_errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            probe_errors: self.probe_errors.load(Ordering::Relaxed),
        }
    }
}
