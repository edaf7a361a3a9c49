use std::mem::MaybeUninit;

/// Growable staging buffer holding a FIFO run of packed buckets awaiting
/// flush, one per (source worker, target worker) pair.
///
/// The pipe is single-threaded: it is owned by its source worker and never
/// shared. Writes only append (`allocate_back`, `recycle_back`); the flush
/// path drains from the head and rewinds with [`reset`](Pipe::reset) when a
/// peer mailbox refuses part of the run. A bucket is either entirely
/// written or absent; callers reserve the full bucket length in one
/// `allocate_back` call.
///
/// When the dead zone before `begin` grows past half the capacity and the
/// next request fits in it, the live region is compacted to offset zero
/// instead of growing the allocation.
pub struct Pipe<T> {
    begin: usize,
    end: usize,
    factor: usize,
    base: usize,
    buf: Box<[MaybeUninit<T>]>,
}

/// Initial pipe capacity, in elements.
const INITIAL_CAPACITY: usize = 4096;

fn uninit_box<T>(len: usize) -> Box<[MaybeUninit<T>]> {
    let mut v = Vec::with_capacity(len);
    v.resize_with(len, MaybeUninit::uninit);
    v.into_boxed_slice()
}

impl<T: Copy> Pipe<T> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates a pipe with a custom initial capacity (growth doubles from
    /// this base).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            begin: 0,
            end: 0,
            factor: 1,
            base: capacity,
            buf: uninit_box(capacity),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Index of the first pending element.
    #[inline]
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Index one past the last pending element.
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of pending elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Base pointer of the backing buffer. Pending elements live at
    /// `[begin, end)` relative to this pointer; indices remain valid until
    /// the next `allocate_back`/`recycle_back` (which may move the buffer).
    #[inline]
    pub fn data(&mut self) -> *mut T {
        self.buf.as_mut_ptr().cast::<T>()
    }

    /// Reserves `n` contiguous elements at the tail and returns a pointer
    /// to the first. The reserved elements count as pending immediately;
    /// the caller must fully initialize them before the pipe is drained.
    pub fn allocate_back(&mut self, n: usize) -> *mut T {
        if self.end + n <= self.capacity() {
            let at = self.end;
            self.end += n;
            return unsafe { self.data().add(at) };
        }

        let live = self.end - self.begin;
        let half = self.capacity() / 2;
        if self.begin > half && n < half {
            // Compact: the dead zone in front of `begin` dominates.
            self.buf.copy_within(self.begin..self.end, 0);
            self.begin = 0;
            self.end = live + n;
            unsafe { self.data().add(live) }
        } else {
            let mut new_capacity;
            loop {
                self.factor <<= 1;
                new_capacity = self.factor * self.base;
                if new_capacity - live >= n {
                    break;
                }
            }
            let mut fresh = uninit_box(new_capacity);
            fresh[..live].copy_from_slice(&self.buf[self.begin..self.end]);
            self.buf = fresh;
            self.begin = 0;
            self.end = live + n;
            unsafe { self.data().add(live) }
        }
    }

    /// Appends a copy of an existing run of elements (a bucket being
    /// re-sent by a failed flush, a reply, or a forward).
    pub fn recycle_back(&mut self, src: &[T]) -> *mut T {
        let dst = self.allocate_back(src.len());
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
        dst
    }

    /// Releases `n` elements from the head (fully flushed).
    #[inline]
    pub fn free_front(&mut self, n: usize) {
        debug_assert!(self.begin + n <= self.end);
        self.begin += n;
    }

    /// Takes back `n` elements from the tail (aborted write).
    #[inline]
    pub fn free_back(&mut self, n: usize) {
        debug_assert!(self.begin + n <= self.end);
        self.end -= n;
    }

    /// Rewinds after a partial drain: `pos` is how far the drain cursor
    /// got. Anything before it is released; if everything was drained the
    /// pipe snaps back to offset zero so the next run starts fresh.
    #[inline]
    pub fn reset(&mut self, pos: usize) {
        debug_assert!(pos >= self.begin && pos <= self.end);
        if pos != self.end {
            self.begin = pos;
        } else {
            self.begin = 0;
            self.end = 0;
        }
    }

    /// Discards all pending elements.
    #[inline]
    pub fn clear(&mut self) {
        self.begin = 0;
        self.end = 0;
    }
}

impl<T: Copy> Default for Pipe<T> {
    fn default() -> Self {
        Self::new()
    }
}
