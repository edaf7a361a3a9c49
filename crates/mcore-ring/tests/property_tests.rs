//! Property tests for the transport invariants: bounded occupancy, FIFO
//! under arbitrary operation interleavings, all-or-nothing record
//! enqueueing, and pipe cursor bookkeeping.

use mcore_ring::{Mailbox, Pipe, Ring, RingConfig};
use proptest::prelude::*;

proptest! {
    /// Occupancy never exceeds capacity, whatever the write/read mix.
    #[test]
    fn ring_occupancy_bounded(ops in prop::collection::vec(any::<bool>(), 1..200)) {
        let ring = Ring::<u64>::new(RingConfig::new(4, false)); // 16 slots
        let capacity = ring.capacity();
        let mut out = [0u64; 16];

        for is_write in ops {
            if is_write {
                let _ = ring.enqueue(&[7]);
            } else {
                let _ = ring.dequeue(&mut out[..1]);
            }
            prop_assert!(ring.len() <= capacity);
        }
    }

    /// Values drain in exactly the order they were enqueued, across any
    /// batching of writes and reads.
    #[test]
    fn ring_fifo_any_batching(
        batches in prop::collection::vec(1usize..6, 1..50),
        read_chunk in 1usize..8,
    ) {
        let ring = Ring::<u64>::new(RingConfig::new(6, false)); // 64 slots
        let mut out = vec![0u64; 64];
        let mut next_write = 0u64;
        let mut next_read = 0u64;

        for batch in batches {
            let values: Vec<u64> = (next_write..next_write + batch as u64).collect();
            if ring.enqueue(&values) {
                next_write += batch as u64;
            }
            let n = ring.dequeue(&mut out[..read_chunk]);
            for v in &out[..n] {
                prop_assert_eq!(*v, next_read);
                next_read += 1;
            }
        }

        // Drain the rest.
        loop {
            let n = ring.dequeue(&mut out);
            if n == 0 { break; }
            for v in &out[..n] {
                prop_assert_eq!(*v, next_read);
                next_read += 1;
            }
        }
        prop_assert_eq!(next_read, next_write);
    }

    /// A multi-slot record is either fully present after enqueue or fully
    /// absent; a failed enqueue leaves the ring untouched.
    #[test]
    fn ring_enqueue_all_or_nothing(
        record_len in 1usize..10,
        prefill in 0usize..16,
    ) {
        let ring = Ring::<u64>::new(RingConfig::new(4, false)); // 16 slots
        let filler = vec![0u64; prefill.min(16)];
        let _ = ring.enqueue(&filler);
        let before = ring.len();

        let record: Vec<u64> = (100..100 + record_len as u64).collect();
        let accepted = ring.enqueue(&record);
        if accepted {
            prop_assert_eq!(ring.len(), before + record_len);
        } else {
            prop_assert_eq!(ring.len(), before);
        }
    }

    /// The mailbox preserves per-producer FIFO regardless of the enqueue
    /// interleaving across producers.
    #[test]
    fn mailbox_per_producer_fifo(
        sends in prop::collection::vec(0usize..3, 1..120),
    ) {
        let mb = Mailbox::<(usize, u64)>::new(3, RingConfig::new(8, false), 0).unwrap();
        let mut sent = [0u64; 3];
        for p in sends {
            if mb.enqueue(p, &[(p, sent[p])]) {
                sent[p] += 1;
            }
        }

        let mut scratch = vec![(0usize, 0u64); mb.ring_capacity()];
        let mut next = [0u64; 3];
        mb.drain_into(&mut scratch, |batch| {
            for (p, i) in batch.iter() {
                assert_eq!(*i, next[*p]);
                next[*p] += 1;
            }
        });
        prop_assert_eq!(next, sent);
    }

    /// Pipe cursors stay consistent through appends, partial drains and
    /// rewinds; pending data is never clobbered by growth or compaction.
    #[test]
    fn pipe_bookkeeping(
        ops in prop::collection::vec((1usize..8, any::<bool>()), 1..80),
    ) {
        let mut pipe = Pipe::<u64>::with_capacity(16);
        let mut shadow: std::collections::VecDeque<u64> = Default::default();
        let mut next = 0u64;

        for (n, drain) in ops {
            if drain {
                let take = n.min(pipe.len());
                // Verify the head before releasing it.
                for k in 0..take {
                    let idx = pipe.begin() + k;
                    let got = unsafe { pipe.data().add(idx).read() };
                    prop_assert_eq!(Some(got), shadow.pop_front());
                }
                pipe.free_front(take);
                if pipe.is_empty() {
                    pipe.reset(pipe.end());
                }
            } else {
                let p = pipe.allocate_back(n);
                for k in 0..n {
                    unsafe { p.add(k).write(next) };
                    shadow.push_back(next);
                    next += 1;
                }
            }
            prop_assert_eq!(pipe.len(), shadow.len());
        }

        // Everything still pending must match the shadow queue.
        for (k, expected) in shadow.iter().enumerate() {
            let idx = pipe.begin() + k;
            let got = unsafe { pipe.data().add(idx).read() };
            prop_assert_eq!(got, *expected);
        }
    }
}
