//! Optional metrics for monitoring ring buffer activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of a ring buffer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub messages_admitted: u64,
    pub messages_evicted: u64,
    pub messages_rejected: u64,
    pub messages_dequeued: u64,
    pub lookups: u64,
    pub lookup_misses: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates another snapshot into this one.
    pub fn merge(&mut self, other: &Metrics) {
        self.messages_admitted += other.messages_admitted;
        self.messages_evicted += other.messages_evicted;
        self.messages_rejected += other.messages_rejected;
        self.messages_dequeued += other.messages_dequeued;
        self.lookups += other.lookups;
        self.lookup_misses += other.lookup_misses;
    }
}

/// Counters updated from shared references; lookups only hold `&RingBuffer`.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    enabled: bool,
    admitted: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    dequeued: AtomicU64,
    lookups: AtomicU64,
    misses: AtomicU64,
}

impl MetricsRecorder {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    #[inline]
    fn bump(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_admit(&self) {
        self.bump(&self.admitted);
    }

    pub(crate) fn record_evict(&self) {
        self.bump(&self.evicted);
    }

    pub(crate) fn record_reject(&self) {
        self.bump(&self.rejected);
    }

    pub(crate) fn record_dequeue(&self) {
        self.bump(&self.dequeued);
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        self.bump(&self.lookups);
        if !hit {
            self.bump(&self.misses);
        }
    }

    pub(crate) fn snapshot(&self) -> Metrics {
        Metrics {
            messages_admitted: self.admitted.load(Ordering::Relaxed),
            messages_evicted: self.evicted.load(Ordering::Relaxed),
            messages_rejected: self.rejected.load(Ordering::Relaxed),
            messages_dequeued: self.dequeued.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            lookup_misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
