use std::sync::atomic::{AtomicU64, Ordering};

/// Transport counters for one ring or one mailbox.
///
/// Updated with relaxed atomics; readers get a point-in-time snapshot. All
/// counters are disabled (never touched) unless the owning component was
/// configured with `enable_metrics`.
#[derive(Debug, Default)]
pub struct Metrics {
    slots_enqueued: AtomicU64,
    slots_dequeued: AtomicU64,
    failed_enqueues: AtomicU64,
    notifications: AtomicU64,
    waits: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub slots_enqueued: u64,
    pub slots_dequeued: u64,
    pub failed_enqueues: u64,
    pub notifications: u64,
    pub waits: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_enqueued(&self, n: u64) {
        self.slots_enqueued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_dequeued(&self, n: u64) {
        self.slots_dequeued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_failed_enqueue(&self) {
        self.failed_enqueues.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            slots_enqueued: self.slots_enqueued.load(Ordering::Relaxed),
            slots_dequeued: self.slots_dequeued.load(Ordering::Relaxed),
            failed_enqueues: self.failed_enqueues.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Accumulates another snapshot into this one (mailbox aggregation).
    pub fn merge(&mut self, other: &MetricsSnapshot) {
        self.slots_enqueued += other.slots_enqueued;
        self.slots_dequeued += other.slots_dequeued;
        self.failed_enqueues += other.failed_enqueues;
        self.notifications += other.notifications;
        self.waits += other.waits;
    }
}
