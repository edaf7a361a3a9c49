use crate::{Metrics, MetricsSnapshot, Ring, RingConfig};
use crossbeam_utils::CachePadded;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Hard cap on producers per mailbox (one per worker in the system).
pub const MAX_PRODUCERS: usize = 256;

/// Errors raised when building a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MailboxError {
    /// A mailbox needs at least one producer ring.
    #[error("mailbox needs at least one producer")]
    NoProducers,
    /// Requested more producer rings than the transport supports.
    #[error("too many producers requested ({requested}, max {})", MAX_PRODUCERS)]
    TooManyProducers {
        /// The rejected producer count.
        requested: usize,
    },
}

/// Multi-producer single-consumer mailbox: one dedicated SPSC ring per
/// producer, so producers never contend with each other. The consumer
/// drains all rings in index order once per pass and pays a bounded
/// round-robin cost proportional to the producer count.
///
/// Each producer must present the same `producer` index for its entire
/// lifetime; that index is what makes per-sender FIFO hold end to end.
///
/// An idle consumer can block in [`wait`](Mailbox::wait) for up to the
/// configured `idle_wait_ns`; any successful enqueue notifies it. With an
/// idle wait of zero the mailbox never blocks and the consumer spins.
pub struct Mailbox<T> {
    producers: Box<[CachePadded<Ring<T>>]>,
    idle_wait_ns: u64,
    enable_metrics: bool,
    metrics: Metrics,
    lock: Mutex<()>,
    available: Condvar,
}

impl<T: Copy + Send> Mailbox<T> {
    pub fn new(
        n_producers: usize,
        config: RingConfig,
        idle_wait_ns: u64,
    ) -> Result<Self, MailboxError> {
        if n_producers == 0 {
            return Err(MailboxError::NoProducers);
        }
        if n_producers > MAX_PRODUCERS {
            return Err(MailboxError::TooManyProducers {
                requested: n_producers,
            });
        }

        let producers = (0..n_producers)
            .map(|_| CachePadded::new(Ring::new(config)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            producers,
            idle_wait_ns,
            enable_metrics: config.enable_metrics,
            metrics: Metrics::new(),
            lock: Mutex::new(()),
            available: Condvar::new(),
        })
    }

    #[inline]
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Slot capacity of each producer ring.
    #[inline]
    pub fn ring_capacity(&self) -> usize {
        self.producers[0].capacity()
    }

    /// Configured idle wait bound in nanoseconds (0 = busy spin).
    #[inline]
    pub fn idle_wait_ns(&self) -> u64 {
        self.idle_wait_ns
    }

    /// Enqueues a whole record on the caller's dedicated ring.
    ///
    /// Returns `false` when the ring lacks space; the record is not
    /// partially written and the caller retries on a later tick. The
    /// calling thread must be the sole user of `producer`.
    pub fn enqueue(&self, producer: usize, record: &[T]) -> bool {
        debug_assert!(producer < self.producers.len());
        let ok = self.producers[producer].enqueue(record);
        if ok && self.idle_wait_ns > 0 {
            self.notify();
        }
        ok
    }

    /// Consumer only: drains each producer ring once, in index order,
    /// through the caller's scratch buffer. `f` receives each non-empty
    /// batch of whole records. `scratch` must span at least
    /// [`ring_capacity`](Mailbox::ring_capacity) elements so multi-element
    /// records are never split between drains.
    pub fn drain_into<F>(&self, scratch: &mut [T], mut f: F) -> usize
    where
        F: FnMut(&mut [T]),
    {
        debug_assert!(scratch.len() >= self.ring_capacity());
        let mut total = 0;
        for ring in &self.producers {
            let n = ring.dequeue(scratch);
            if n > 0 {
                f(&mut scratch[..n]);
                total += n;
            }
        }
        total
    }

    /// Consumer only: blocks up to the configured idle wait, or until a
    /// producer notifies. Returns immediately when the idle wait is zero.
    pub fn wait(&self) {
        if self.idle_wait_ns == 0 {
            return;
        }
        if self.enable_metrics {
            self.metrics.add_wait();
        }
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .available
            .wait_timeout(guard, Duration::from_nanos(self.idle_wait_ns));
    }

    /// Wakes the consumer if it sleeps in [`wait`](Mailbox::wait).
    pub fn notify(&self) {
        if self.idle_wait_ns > 0 {
            if self.enable_metrics {
                self.metrics.add_notification();
            }
            self.available.notify_all();
        }
    }

    /// Direct access to one producer ring (tests, teardown walkers).
    pub fn ring(&self, producer: usize) -> Option<&Ring<T>> {
        self.producers.get(producer).map(|r| &**r)
    }

    /// Aggregated transport counters: all producer rings plus this
    /// mailbox's own wait/notify counts.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut all = self.metrics.snapshot();
        for ring in &self.producers {
            all.merge(&ring.metrics());
        }
        all
    }
}
