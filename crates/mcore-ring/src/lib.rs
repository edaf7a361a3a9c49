//! Lock-free transport substrate for the mcore actor runtime.
//!
//! Events travel between workers as cache-line aligned, variable-length
//! *buckets*: a one-slot [`BucketHeader`] followed by raw payload slots.
//! The same bytes move through three stages without reinterpretation:
//!
//! 1. a growable staging [`Pipe`] on the sending worker, one per
//!    destination worker,
//! 2. a bounded SPSC [`Ring`] inside the destination's [`Mailbox`]: one
//!    ring per producer worker, so producers never contend,
//! 3. the consumer's scratch buffer, from which the runtime dispatches.
//!
//! Backpressure is expressed structurally: a full ring refuses the bucket
//! and the staging pipe retains it until the next flush pass. Nothing in
//! this crate blocks except the mailbox's bounded idle wait.
//!
//! # Example
//!
//! ```
//! use mcore_ring::{Mailbox, RingConfig};
//!
//! let mailbox = Mailbox::<u64>::new(2, RingConfig::default(), 0).unwrap();
//! assert!(mailbox.enqueue(0, &[1, 2, 3]));
//! assert!(mailbox.enqueue(1, &[40]));
//!
//! let mut scratch = vec![0u64; mailbox.ring_capacity()];
//! let mut received = Vec::new();
//! mailbox.drain_into(&mut scratch, |batch| received.extend_from_slice(batch));
//! assert_eq!(received, vec![1, 2, 3, 40]);
//! ```

mod backoff;
mod bucket;
mod config;
mod invariants;
mod mailbox;
mod metrics;
mod pipe;
mod ring;

pub use backoff::Backoff;
pub use bucket::{
    bucket_slots, slots_for, BucketHeader, DropFn, Slot, BUCKET_MAGIC, QOS_DEFAULT, SLOT_BYTES,
};
pub use config::RingConfig;
pub use mailbox::{Mailbox, MailboxError, MAX_PRODUCERS};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipe::Pipe;
pub use ring::Ring;
