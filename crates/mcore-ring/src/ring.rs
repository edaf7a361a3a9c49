use crate::invariants::{debug_assert_advances, debug_assert_head_bounded, debug_assert_occupancy};
use crate::{Metrics, MetricsSnapshot, RingConfig};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

// Synchronization protocol
// ------------------------
//
// `head` and `tail` are unbounded u64 sequence numbers; the buffer index is
// `seq & mask`. With 2^64 sequence values the ABA problem cannot occur over
// any realistic runtime.
//
// Producer: loads `tail` Relaxed (sole writer), checks space against its
// cached view of `head`, refreshing that cache with one Acquire load only
// when the cached view is insufficient; writes the slots; publishes with a
// Release store to `tail`.
//
// Consumer: the mirror image. Loads `head` Relaxed (sole writer), refreshes
// its cached view of `tail` with Acquire when empty, reads the slots,
// publishes consumption with a Release store to `head`.
//
// The cached views live in `UnsafeCell`s: each has exactly one writer (the
// side that owns it), so the unsynchronized accesses are safe. All four
// index fields are cache-line padded so the producer and consumer never
// share a line.

/// Bounded single-producer/single-consumer ring of `Copy` slots.
///
/// This is the unit the mailbox is built from: one dedicated producer
/// worker, one consumer worker. There is no blocking anywhere in the ring;
/// fullness surfaces as `enqueue` returning `false` and the caller applies
/// backpressure upstream (the staging pipe retains the bucket).
///
/// Multi-slot records (buckets) are enqueued all-or-nothing, so the ring
/// never holds a torn record. `dequeue` copies whole slots only; callers
/// packing multi-slot records must size the output buffer to `capacity()`
/// so a record is never split across two drains.
pub struct Ring<T> {
    // Producer-hot.
    tail: CachePadded<AtomicU64>,
    cached_head: CachePadded<UnsafeCell<u64>>,
    // Consumer-hot.
    head: CachePadded<AtomicU64>,
    cached_tail: CachePadded<UnsafeCell<u64>>,
    // Cold.
    config: RingConfig,
    metrics: Metrics,
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

// SAFETY: the producer/consumer protocol above gives every slot exactly one
// writer at a time; T crosses threads by copy, hence the Send bound.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T: Copy> Ring<T> {
    pub fn new(config: RingConfig) -> Self {
        let capacity = config.capacity();
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);

        Self {
            tail: CachePadded::new(AtomicU64::new(0)),
            cached_head: CachePadded::new(UnsafeCell::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            cached_tail: CachePadded::new(UnsafeCell::new(0)),
            config,
            metrics: Metrics::new(),
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.config.mask()
    }

    /// Currently occupied slots. Exact only from the consumer thread.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Relaxed)
    }

    /// Copies `src` into the ring, entirely or not at all.
    ///
    /// Returns `false` when fewer than `src.len()` slots are free (or the
    /// record can never fit). Producer-side only.
    pub fn enqueue(&self, src: &[T]) -> bool {
        let n = src.len();
        if n == 0 {
            return true;
        }
        if n > self.capacity() {
            return false;
        }

        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: cached_head is written only by the producer (this path).
        let mut head = unsafe { *self.cached_head.get() };
        if (self.capacity() - tail.wrapping_sub(head) as usize) < n {
            head = self.head.load(Ordering::Acquire);
            // SAFETY: as above; the Acquire load pairs with the consumer's
            // Release store so freed slots are visible before reuse.
            unsafe { *self.cached_head.get() = head };
            if (self.capacity() - tail.wrapping_sub(head) as usize) < n {
                if self.config.enable_metrics {
                    self.metrics.add_failed_enqueue();
                }
                return false;
            }
        }

        let idx = (tail as usize) & self.mask();
        let first = n.min(self.capacity() - idx);
        // SAFETY: the slots in [tail, tail + n) are free (checked above)
        // and only the producer writes them; the Release store below
        // publishes the writes before the consumer can observe them.
        unsafe {
            let base = (*self.buffer.get()).as_mut_ptr().cast::<T>();
            std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(idx), first);
            std::ptr::copy_nonoverlapping(src.as_ptr().add(first), base, n - first);
        }

        let new_tail = tail.wrapping_add(n as u64);
        debug_assert_occupancy!(new_tail.wrapping_sub(head) as usize, self.capacity());
        debug_assert_advances!("tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_enqueued(n as u64);
        }
        true
    }

    /// Copies up to `out.len()` slots from the head into `out`,
    /// reassembling across the wrap, and publishes consumption once.
    /// Consumer-side only.
    pub fn dequeue(&self, out: &mut [T]) -> usize {
        let head = self.head.load(Ordering::Relaxed);

        // SAFETY: cached_tail is written only by the consumer (this path).
        let mut tail = unsafe { *self.cached_tail.get() };
        let mut avail = tail.wrapping_sub(head) as usize;
        if avail == 0 {
            tail = self.tail.load(Ordering::Acquire);
            // SAFETY: as above; Acquire pairs with the producer's Release.
            unsafe { *self.cached_tail.get() = tail };
            avail = tail.wrapping_sub(head) as usize;
            if avail == 0 {
                return 0;
            }
        }

        let n = avail.min(out.len());
        let idx = (head as usize) & self.mask();
        let first = n.min(self.capacity() - idx);
        // SAFETY: slots in [head, head + n) were published by the producer
        // (Acquire above); only the consumer reads them before advancing.
        unsafe {
            let base = (*self.buffer.get()).as_ptr().cast::<T>();
            std::ptr::copy_nonoverlapping(base.add(idx), out.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(base, out.as_mut_ptr().add(first), n - first);
        }

        let new_head = head.wrapping_add(n as u64);
        debug_assert_head_bounded!(new_head, tail);
        debug_assert_advances!("head", head, new_head);
        self.head.store(new_head, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_dequeued(n as u64);
        }
        n
    }

    /// Hands every readable contiguous section (one, or two around the
    /// wrap) to `f` directly on the backing memory, then publishes
    /// consumption once. Consumer-side only.
    pub fn consume_all<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&[T]),
    {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let avail = tail.wrapping_sub(head) as usize;
        if avail == 0 {
            return 0;
        }

        let idx = (head as usize) & self.mask();
        let first = avail.min(self.capacity() - idx);
        // SAFETY: as in `dequeue`; the sections are fully published and
        // the producer cannot reuse them until `head` advances below.
        unsafe {
            let base = (*self.buffer.get()).as_ptr().cast::<T>();
            f(std::slice::from_raw_parts(base.add(idx), first));
            if avail > first {
                f(std::slice::from_raw_parts(base, avail - first));
            }
        }

        let new_head = head.wrapping_add(avail as u64);
        debug_assert_head_bounded!(new_head, tail);
        self.head.store(new_head, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_dequeued(avail as u64);
        }
        avail
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
