/// Sizing for a single SPSC ring (and, through the mailbox, for every
/// producer ring of a worker).
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Ring capacity as a power of two (default: 12 = 4096 slots).
    pub ring_bits: u8,
    /// Enable transport counters (slight overhead on the hot path).
    pub enable_metrics: bool,
}

impl RingConfig {
    /// Creates a configuration with a custom capacity.
    ///
    /// # Panics
    ///
    /// Panics if `ring_bits` is 0 or greater than 20 (1M slots); a ring
    /// that large holds 64MB per producer and is almost certainly a typo.
    pub const fn new(ring_bits: u8, enable_metrics: bool) -> Self {
        assert!(
            ring_bits > 0 && ring_bits <= 20,
            "ring_bits must be between 1 and 20"
        );
        Self {
            ring_bits,
            enable_metrics,
        }
    }

    /// Ring capacity in slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        1 << self.ring_bits
    }

    /// Index mask for sequence-number wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity() - 1
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            ring_bits: 12, // 4096 slots: 256KB per producer ring
            enable_metrics: false,
        }
    }
}
