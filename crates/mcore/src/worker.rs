use crate::actor::ActorCell;
use crate::callback::CallbackEntry;
use crate::context::Context;
use crate::error::error_bits;
use crate::event::{Event, KillEvent};
use crate::id::{ActorId, SlotId, WorkerId, FIRST_DYNAMIC_SLOT};
use crate::signal;
use crate::time::now_nanos;
use crossbeam_utils::CachePadded;
use mcore_ring::{bucket_slots, Backoff, BucketHeader, DropFn, Mailbox, Pipe, Slot, SLOT_BYTES};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::mem::MaybeUninit;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::addr_of_mut;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Engine-global state every worker shares: the per-worker mailboxes, the
/// startup barrier and the shutdown/abort flags. Read-only after start,
/// apart from the atomics.
pub(crate) struct SharedComms {
    mailboxes: Vec<Mailbox<Slot>>,
    sync_start: CachePadded<AtomicU64>,
    init_failed: AtomicBool,
    stop: AtomicBool,
}

impl SharedComms {
    pub(crate) fn new(mailboxes: Vec<Mailbox<Slot>>) -> Self {
        Self {
            mailboxes,
            sync_start: CachePadded::new(AtomicU64::new(0)),
            init_failed: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn mailbox(&self, worker: WorkerId) -> &Mailbox<Slot> {
        &self.mailboxes[worker as usize]
    }

    #[inline]
    pub(crate) fn n_workers(&self) -> usize {
        self.mailboxes.len()
    }

    /// Sets the stop flag and wakes every sleeping worker. Idempotent.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        for mailbox in &self.mailboxes {
            mailbox.notify();
        }
    }

    #[inline]
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

impl Drop for SharedComms {
    fn drop(&mut self) {
        // All workers have exited by the time the last reference goes
        // away; destroy whatever payloads never got delivered.
        let capacity = self.mailboxes.first().map_or(0, Mailbox::ring_capacity);
        let mut scratch = vec![Slot::zeroed(); capacity];
        for mailbox in &self.mailboxes {
            mailbox.drain_into(&mut scratch, drop_batch_payloads);
        }
    }
}

/// Per-tick and lifetime counters of one worker.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct WorkerMetrics {
    pub events_received: u64,
    pub events_sent: u64,
    pub events_lost: u64,
    pub events_unhandled: u64,
    pub idle_waits: u64,
}

/// The part of a worker that actor contexts reach into: outbound pipes,
/// id allocation, callback registrations, removal scheduling. Split off
/// from the actor map so the dispatcher can lend out one actor and this
/// state simultaneously.
pub(crate) struct WorkerRuntime {
    pub worker_id: WorkerId,
    pub n_workers: usize,
    pub ring_capacity: usize,
    pub comms: Arc<SharedComms>,
    /// One staging pipe per destination worker; the self entry stages
    /// local deliveries and is consumed by the receive phase, never
    /// flushed to a mailbox.
    pub pipes: Vec<Pipe<Slot>>,
    /// Spare buffer swapped with the self pipe while its buckets are
    /// dispatched, so handlers can keep pushing locally.
    pub mono_spare: Pipe<Slot>,
    pub tick_time: u64,
    pub to_remove: HashSet<SlotId>,
    pub spawned: Vec<ActorCell>,
    pub callbacks: Vec<CallbackEntry>,
    pub error_bits: u64,
    pub metrics: WorkerMetrics,
    next_slot: SlotId,
    free_slots: Vec<SlotId>,
}

fn drop_fn_for<E>() -> Option<DropFn> {
    if std::mem::needs_drop::<E>() {
        Some(drop_payload_in_place::<E>)
    } else {
        None
    }
}

unsafe fn drop_payload_in_place<E>(header: *mut BucketHeader) {
    std::ptr::drop_in_place(BucketHeader::payload_ptr(header).cast::<E>());
}

/// Stack image of a small bucket, used by the unordered direct-send path.
/// Only ever accessed through raw pointer writes.
#[repr(C)]
#[allow(dead_code)]
struct StackBucket<E> {
    header: BucketHeader,
    payload: E,
}

impl WorkerRuntime {
    pub(crate) fn new(worker_id: WorkerId, comms: Arc<SharedComms>) -> Self {
        let n_workers = comms.n_workers();
        let ring_capacity = comms.mailbox(worker_id).ring_capacity();
        Self {
            worker_id,
            n_workers,
            ring_capacity,
            comms,
            pipes: (0..n_workers).map(|_| Pipe::new()).collect(),
            mono_spare: Pipe::new(),
            tick_time: 0,
            to_remove: HashSet::new(),
            spawned: Vec::new(),
            callbacks: Vec::new(),
            error_bits: 0,
            metrics: WorkerMetrics::default(),
            next_slot: FIRST_DYNAMIC_SLOT,
            free_slots: Vec::new(),
        }
    }

    pub(crate) fn seed_slots(&mut self, next_slot: SlotId) {
        self.next_slot = next_slot;
    }

    pub(crate) fn alloc_slot(&mut self) -> SlotId {
        if let Some(slot) = self.free_slots.pop() {
            return slot;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    pub(crate) fn release_slot(&mut self, slot: SlotId) {
        if slot >= FIRST_DYNAMIC_SLOT {
            self.free_slots.push(slot);
        }
    }

    /// Builds a bucket for `event` in the staging pipe of `dest`'s worker
    /// and returns a pointer to the staged payload.
    pub(crate) fn stage<E: Event>(&mut self, dest: ActorId, source: ActorId, event: E) -> *mut E {
        let slots = bucket_slots::<E>();
        debug_assert!(std::mem::align_of::<E>() <= SLOT_BYTES);
        assert!(
            (dest.worker() as usize) < self.n_workers,
            "destination worker {} is not configured",
            dest.worker()
        );
        assert!(
            slots <= self.ring_capacity,
            "event needs {slots} slots but mailbox rings hold {}",
            self.ring_capacity
        );

        let pipe = &mut self.pipes[dest.worker() as usize];
        let base = pipe.allocate_back(slots);
        // SAFETY: `base` points at `slots` reserved elements; the bucket
        // is fully initialized (zero fill covers trailing padding) before
        // anything reads it.
        unsafe {
            std::ptr::write_bytes(base, 0, slots);
            let header = base.cast::<BucketHeader>();
            header.write(BucketHeader::new(
                TypeId::of::<E>(),
                slots as u16,
                dest.raw(),
                source.raw(),
                drop_fn_for::<E>(),
            ));
            let payload = BucketHeader::payload_ptr(header).cast::<E>();
            payload.write(event);
            payload
        }
    }

    /// Unordered fast path: builds the bucket on the stack and offers it
    /// straight to the destination mailbox, falling back to the ordered
    /// staging pipe when the ring is full.
    pub(crate) fn send_direct<E: Event + Copy>(&mut self, dest: ActorId, source: ActorId, event: E) {
        let slots = bucket_slots::<E>();
        debug_assert!(std::mem::align_of::<E>() <= SLOT_BYTES);
        debug_assert_eq!(std::mem::size_of::<StackBucket<E>>(), slots * SLOT_BYTES);
        assert!(
            (dest.worker() as usize) < self.n_workers,
            "destination worker {} is not configured",
            dest.worker()
        );
        assert!(
            slots <= self.ring_capacity,
            "event needs {slots} slots but mailbox rings hold {}",
            self.ring_capacity
        );

        let mut stack = MaybeUninit::<StackBucket<E>>::zeroed();
        // SAFETY: header and payload fields are written before the bytes
        // are read; zeroed() initializes the padding.
        unsafe {
            let bucket = stack.as_mut_ptr();
            addr_of_mut!((*bucket).header).write(BucketHeader::new(
                TypeId::of::<E>(),
                slots as u16,
                dest.raw(),
                source.raw(),
                None,
            ));
            addr_of_mut!((*bucket).payload).write(event);
            let record = std::slice::from_raw_parts(bucket.cast::<Slot>(), slots);

            let accepted = self
                .comms
                .mailbox(dest.worker())
                .enqueue(self.worker_id as usize, record);
            if !accepted {
                self.pipes[dest.worker() as usize].recycle_back(record);
            }
        }
    }

    /// Re-sends an already-delivered bucket (reply/forward/respond): the
    /// bytes are copied into the staging pipe of the header's current
    /// destination, then the original is marked consumed so the
    /// dispatcher leaves the payload alone.
    ///
    /// # Safety
    ///
    /// `header` must point at a delivered bucket (scratch buffer or the
    /// swapped self pipe, never inside a staging pipe) with a live,
    /// not-yet-consumed payload whose `dest` names a configured worker.
    pub(crate) unsafe fn recycle(&mut self, header: *mut BucketHeader) {
        let dest = ActorId::from_raw((*header).dest);
        debug_assert!((dest.worker() as usize) < self.n_workers);
        let record = BucketHeader::as_slots(header);
        self.pipes[dest.worker() as usize].recycle_back(record);
        (*header).mark_consumed();
    }
}

/// One virtual core: an OS thread owning a set of actors and running the
/// cooperative tick loop: drain mailbox, run callbacks, flush pipes,
/// process removals, idle-wait.
pub(crate) struct Worker {
    actors: HashMap<SlotId, ActorCell>,
    init_order: Vec<SlotId>,
    rt: WorkerRuntime,
    scratch: Box<[Slot]>,
    kill_broadcast_done: bool,
}

impl Worker {
    pub(crate) fn new(worker_id: WorkerId, comms: Arc<SharedComms>, initial_bits: u64) -> Self {
        let mut rt = WorkerRuntime::new(worker_id, comms);
        rt.error_bits = initial_bits;
        let scratch = vec![Slot::zeroed(); rt.ring_capacity].into_boxed_slice();
        Self {
            actors: HashMap::new(),
            init_order: Vec::new(),
            rt,
            scratch,
            kill_broadcast_done: false,
        }
    }

    /// Installs a preconfigured actor (configuration phase; `on_init` runs
    /// later, on this worker's thread, in installation order).
    pub(crate) fn install(&mut self, cell: ActorCell) {
        let slot = cell.meta.id.slot();
        self.init_order.push(slot);
        self.actors.insert(slot, cell);
        if slot >= FIRST_DYNAMIC_SLOT {
            self.rt.seed_slots(self.rt.next_slot.max(slot + 1));
        }
    }

    /// Continues dynamic slot assignment where the configuration phase
    /// left off.
    pub(crate) fn seed_dynamic_slots(&mut self, next_slot: SlotId) {
        self.rt.seed_slots(self.rt.next_slot.max(next_slot));
    }

    /// Thread body: init, barrier, tick loop, drain.
    pub(crate) fn run(mut self) -> u64 {
        if !self.init_actors() {
            self.rt.comms.init_failed.store(true, Ordering::Release);
        }
        Self::barrier(&self.rt.comms);

        if self.rt.comms.init_failed.load(Ordering::Acquire) {
            // A peer (or this worker) failed an on_init: the whole start
            // aborts and every already-initialized actor is destructed.
            self.teardown();
            return self.rt.error_bits;
        }

        debug!(
            worker = self.rt.worker_id,
            actors = self.actors.len(),
            "worker running"
        );

        loop {
            self.rt.tick_time = now_nanos();

            if !self.kill_broadcast_done && self.shutdown_observed() {
                self.stage_kill_broadcast();
                self.kill_broadcast_done = true;
            }

            let received = self.receive();
            self.run_callbacks();
            let sent = self.flush();

            if !self.rt.to_remove.is_empty() {
                self.process_removals();
            }
            if self.actors.is_empty() {
                break;
            }

            // Idle only when nothing arrived, nothing went out and no
            // pipe still holds work (a full peer ring keeps us retrying
            // at full speed rather than sleeping on delivery).
            let pending = self.rt.pipes.iter().any(|p| !p.is_empty());
            if received == 0 && sent == 0 && !pending {
                self.rt.metrics.idle_waits += 1;
                self.rt.comms.mailbox(self.rt.worker_id).wait();
            }
        }

        // Draining: dispatch whatever already arrived (all remaining
        // destinations are gone, so payloads are destroyed and counted
        // lost), then retry residual flushes until the backoff is spent.
        self.receive();
        let mut backoff = Backoff::new();
        while self.has_pending_output() && !backoff.exhausted() {
            if self.flush() == 0 {
                backoff.snooze();
            } else {
                backoff.reset();
            }
        }
        self.teardown();

        let m = self.rt.metrics;
        debug!(
            worker = self.rt.worker_id,
            received = m.events_received,
            sent = m.events_sent,
            lost = m.events_lost,
            unhandled = m.events_unhandled,
            idle_waits = m.idle_waits,
            "worker stopped"
        );
        self.rt.error_bits
    }

    /// Runs `on_init` for every preconfigured actor, in installation
    /// order. Any `false` (or panic) aborts the whole start.
    fn init_actors(&mut self) -> bool {
        let order = std::mem::take(&mut self.init_order);
        for slot in &order {
            let Some(cell) = self.actors.get_mut(slot) else {
                continue;
            };
            let mut ctx = Context {
                meta: &mut cell.meta,
                rt: &mut self.rt,
            };
            let ok = catch_unwind(AssertUnwindSafe(|| cell.actor.init(&mut ctx))).unwrap_or(false);
            if !ok {
                error!(
                    worker = self.rt.worker_id,
                    actor = cell.meta.name,
                    "actor failed to initialize; aborting start"
                );
                self.rt.error_bits |= error_bits::BAD_ACTOR_INIT;
                return false;
            }
            self.merge_spawned();
        }
        true
    }

    /// Startup barrier: every worker bumps the counter and spins until
    /// all arrived, so nobody dispatches before every peer can accept
    /// flushes.
    fn barrier(comms: &SharedComms) {
        comms.sync_start.fetch_add(1, Ordering::AcqRel);
        let total = comms.n_workers() as u64;
        let mut backoff = Backoff::new();
        while comms.sync_start.load(Ordering::Acquire) < total {
            backoff.snooze();
        }
    }

    fn shutdown_observed(&self) -> bool {
        if self.rt.comms.stop_requested() || signal::shutdown_requested() {
            fence(Ordering::Acquire);
            return true;
        }
        false
    }

    /// Stages a local kill broadcast; the receive phase dispatches it this
    /// same tick and default handlers take it from there.
    fn stage_kill_broadcast(&mut self) {
        debug!(worker = self.rt.worker_id, "shutdown observed, killing local actors");
        let dest = ActorId::broadcast(self.rt.worker_id);
        self.rt.stage(dest, ActorId::INVALID, KillEvent);
    }

    /// Tick step 2: drain the mailbox rings through the scratch buffer,
    /// then one swap of the self pipe for locally staged deliveries.
    /// Returns total slots drained plus local buckets dispatched.
    fn receive(&mut self) -> u64 {
        let mut activity = 0u64;

        let comms = Arc::clone(&self.rt.comms);
        let mut scratch = std::mem::take(&mut self.scratch);
        activity += comms
            .mailbox(self.rt.worker_id)
            .drain_into(&mut scratch, |batch| self.dispatch_batch(batch))
            as u64;
        self.scratch = scratch;

        let self_idx = self.rt.worker_id as usize;
        if !self.rt.pipes[self_idx].is_empty() {
            // Double-buffer swap: handlers triggered below may push to
            // local actors again; those land in the (now empty) self pipe
            // and are dispatched next tick.
            std::mem::swap(&mut self.rt.pipes[self_idx], &mut self.rt.mono_spare);
            let (base, begin, end) = {
                let staged = &mut self.rt.mono_spare;
                (staged.data(), staged.begin(), staged.end())
            };
            let mut i = begin;
            while i < end {
                // SAFETY: the self pipe holds whole, initialized buckets;
                // nothing appends to `mono_spare` while we walk it.
                let header = unsafe { base.add(i).cast::<BucketHeader>() };
                let n = unsafe { (*header).slot_count } as usize;
                debug_assert!(n >= 1 && i + n <= end);
                self.dispatch_bucket(header);
                activity += 1;
                i += n;
            }
            self.rt.mono_spare.clear();
        }

        activity
    }

    /// Walks whole buckets out of one drained mailbox batch.
    fn dispatch_batch(&mut self, batch: &mut [Slot]) {
        let base = batch.as_mut_ptr();
        let len = batch.len();
        let mut i = 0;
        while i < len {
            // SAFETY: rings only ever hold whole buckets (all-or-nothing
            // enqueue) and the scratch buffer spans a full ring.
            let header = unsafe { base.add(i).cast::<BucketHeader>() };
            let n = unsafe { (*header).slot_count } as usize;
            debug_assert!(n >= 1 && i + n <= len, "bucket walk desynchronized");
            self.dispatch_bucket(header);
            i += n;
        }
    }

    /// Dispatches one bucket: direct or broadcast fan-out, then destroys
    /// the payload unless a handler consumed it via reply/forward.
    fn dispatch_bucket(&mut self, header: *mut BucketHeader) {
        // SAFETY: header points into the scratch buffer (or swapped self
        // pipe), exclusively ours for the duration of dispatch.
        let (dest, type_id) = unsafe {
            debug_assert!((*header).magic_ok());
            (ActorId::from_raw((*header).dest), (*header).type_id)
        };
        self.rt.metrics.events_received += 1;

        if dest.is_broadcast() {
            let targets: Vec<SlotId> = self
                .actors
                .iter()
                .filter(|(_, cell)| cell.meta.alive && cell.meta.handlers.contains_key(&type_id))
                .map(|(slot, _)| *slot)
                .collect();
            for slot in targets {
                self.dispatch_to(slot, type_id, header);
            }
        } else {
            self.dispatch_to(dest.slot(), type_id, header);
        }

        // SAFETY: dispatch is over; nobody holds the payload anymore.
        unsafe {
            if !(*header).is_consumed() {
                BucketHeader::drop_payload(header);
            }
        }

        if !self.rt.spawned.is_empty() {
            self.merge_spawned();
        }
    }

    fn dispatch_to(&mut self, slot: SlotId, type_id: TypeId, header: *mut BucketHeader) {
        let Some(cell) = self.actors.get_mut(&slot) else {
            self.rt.metrics.events_lost += 1;
            warn!(
                worker = self.rt.worker_id,
                slot, "event for unknown actor dropped"
            );
            return;
        };

        let Some(thunk) = cell.meta.handlers.get(&type_id).copied() else {
            // Default behavior for unsubscribed event types: drop quietly.
            self.rt.metrics.events_unhandled += 1;
            return;
        };

        let mut ctx = Context {
            meta: &mut cell.meta,
            rt: &mut self.rt,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            thunk(cell.actor.as_mut(), &mut ctx, header);
        }));
        if outcome.is_err() {
            self.rt.error_bits |= error_bits::PANIC_IN_HANDLER;
            warn!(
                worker = self.rt.worker_id,
                slot, "handler panicked; continuing with next event"
            );
        }
    }

    /// Tick step 3: periodic callbacks, in registration order.
    fn run_callbacks(&mut self) {
        let mut i = 0;
        while i < self.rt.callbacks.len() {
            let entry = self.rt.callbacks[i];
            i += 1;
            if !entry.active {
                continue;
            }
            let Some(cell) = self.actors.get_mut(&entry.slot) else {
                continue;
            };
            let mut ctx = Context {
                meta: &mut cell.meta,
                rt: &mut self.rt,
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                (entry.thunk)(cell.actor.as_mut(), &mut ctx);
            }));
            if outcome.is_err() {
                self.rt.error_bits |= error_bits::PANIC_IN_HANDLER;
                warn!(
                    worker = self.rt.worker_id,
                    slot = entry.slot,
                    "periodic callback panicked"
                );
            }
        }
        if !self.rt.spawned.is_empty() {
            self.merge_spawned();
        }
        self.rt.callbacks.retain(|e| e.active);
    }

    /// Tick step 4: walk every peer-bound pipe head to tail, enqueueing
    /// bucket by bucket; a refused bucket stays (with everything behind
    /// it) for the next tick. Returns buckets flushed.
    fn flush(&mut self) -> u64 {
        let mut sent = 0u64;
        let self_idx = self.rt.worker_id as usize;
        let comms = Arc::clone(&self.rt.comms);

        for w in 0..self.rt.n_workers {
            if w == self_idx {
                continue;
            }
            let pipe = &mut self.rt.pipes[w];
            if pipe.is_empty() {
                continue;
            }
            let mailbox = comms.mailbox(w as WorkerId);
            let base = pipe.data();
            let mut i = pipe.begin();
            let end = pipe.end();
            while i < end {
                // SAFETY: the pipe holds whole initialized buckets and is
                // not appended to during the walk.
                unsafe {
                    let header = base.add(i).cast::<BucketHeader>();
                    debug_assert!((*header).magic_ok());
                    let n = (*header).slot_count as usize;
                    let record = std::slice::from_raw_parts(base.add(i), n);
                    if !mailbox.enqueue(self_idx, record) {
                        break;
                    }
                    sent += 1;
                    i += n;
                }
            }
            pipe.reset(i);
        }

        self.rt.metrics.events_sent += sent;
        sent
    }

    /// Tick step 5: destruct actors marked dead and recycle their slots.
    fn process_removals(&mut self) {
        let slots: Vec<SlotId> = self.rt.to_remove.drain().collect();
        for slot in slots {
            if let Some(cell) = self.actors.remove(&slot) {
                debug!(
                    worker = self.rt.worker_id,
                    slot,
                    actor = cell.meta.name,
                    "actor removed"
                );
                for entry in &mut self.rt.callbacks {
                    if entry.slot == slot {
                        entry.active = false;
                    }
                }
                self.rt.release_slot(slot);
                drop(cell);
            }
        }
        self.rt.callbacks.retain(|e| e.active);
    }

    fn merge_spawned(&mut self) {
        for cell in self.rt.spawned.drain(..) {
            let slot = cell.meta.id.slot();
            debug!(
                worker = cell.meta.id.worker(),
                slot,
                actor = cell.meta.name,
                "referenced actor added"
            );
            self.actors.insert(slot, cell);
        }
    }

    fn has_pending_output(&self) -> bool {
        let self_idx = self.rt.worker_id as usize;
        self.rt
            .pipes
            .iter()
            .enumerate()
            .any(|(w, pipe)| w != self_idx && !pipe.is_empty())
    }

    /// Destroys remaining actors and any undelivered payloads staged in
    /// this worker's pipes. Undelivered mailbox contents are destroyed by
    /// `SharedComms` when the engine lets go of it.
    fn teardown(&mut self) {
        self.actors.clear();
        self.rt.spawned.clear();
        for pipe in &mut self.rt.pipes {
            drop_pipe_payloads(pipe);
        }
        drop_pipe_payloads(&mut self.rt.mono_spare);
    }
}

fn drop_pipe_payloads(pipe: &mut Pipe<Slot>) {
    let base = pipe.data();
    let mut i = pipe.begin();
    let end = pipe.end();
    while i < end {
        // SAFETY: pipes hold whole initialized buckets.
        unsafe {
            let header = base.add(i).cast::<BucketHeader>();
            let n = (*header).slot_count as usize;
            if !(*header).is_consumed() {
                BucketHeader::drop_payload(header);
            }
            i += n;
        }
    }
    pipe.clear();
}

fn drop_batch_payloads(batch: &mut [Slot]) {
    let base = batch.as_mut_ptr();
    let len = batch.len();
    let mut i = 0;
    while i < len {
        // SAFETY: mailbox rings hold whole initialized buckets.
        unsafe {
            let header = base.add(i).cast::<BucketHeader>();
            let n = (*header).slot_count as usize;
            if !(*header).is_consumed() {
                BucketHeader::drop_payload(header);
            }
            i += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcore_ring::RingConfig;
    use std::sync::atomic::AtomicU64;

    fn comms(n_workers: usize, ring_bits: u8) -> Arc<SharedComms> {
        let mailboxes = (0..n_workers)
            .map(|_| Mailbox::new(n_workers, RingConfig::new(ring_bits, false), 0).unwrap())
            .collect();
        Arc::new(SharedComms::new(mailboxes))
    }

    struct Tracker {
        drops: Arc<AtomicU64>,
    }

    impl Drop for Tracker {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn stage_lays_out_a_whole_bucket() {
        let mut rt = WorkerRuntime::new(0, comms(2, 6));
        let dest = ActorId::new(1, 300);
        let source = ActorId::new(0, 299);

        let payload = rt.stage(dest, source, 0xAB54_u64);
        // SAFETY: just staged, nothing else touches the pipe.
        unsafe {
            assert_eq!(*payload, 0xAB54);
        }

        let expected_slots = bucket_slots::<u64>();
        let pipe = &mut rt.pipes[1];
        assert_eq!(pipe.len(), expected_slots);

        let header = pipe.data().cast::<BucketHeader>();
        unsafe {
            assert!((*header).magic_ok());
            assert!((*header).is_alive());
            assert!(!(*header).is_consumed());
            assert_eq!((*header).slot_count as usize, expected_slots);
            assert_eq!((*header).dest, dest.raw());
            assert_eq!((*header).source, source.raw());
            assert_eq!((*header).type_id, TypeId::of::<u64>());
            assert!((*header).drop.is_none(), "u64 needs no destructor");
        }
    }

    #[test]
    fn pipe_teardown_destroys_each_payload_once() {
        let drops = Arc::new(AtomicU64::new(0));
        let mut rt = WorkerRuntime::new(0, comms(2, 6));

        for _ in 0..3 {
            rt.stage(
                ActorId::new(1, 300),
                ActorId::new(0, 299),
                Tracker {
                    drops: Arc::clone(&drops),
                },
            );
        }
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        drop_pipe_payloads(&mut rt.pipes[1]);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
        assert!(rt.pipes[1].is_empty());

        // A second walk over the cleared pipe must not double-drop.
        drop_pipe_payloads(&mut rt.pipes[1]);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn recycle_transfers_payload_ownership() {
        let drops = Arc::new(AtomicU64::new(0));
        let mut rt = WorkerRuntime::new(0, comms(2, 6));

        rt.stage(
            ActorId::new(1, 300),
            ActorId::new(0, 299),
            Tracker {
                drops: Arc::clone(&drops),
            },
        );

        // Move the bucket into a scratch buffer, as delivery would.
        let n = bucket_slots::<Tracker>();
        let mut scratch = vec![Slot::zeroed(); n];
        // SAFETY: the staged bucket occupies exactly n initialized slots.
        unsafe {
            std::ptr::copy_nonoverlapping(rt.pipes[1].data(), scratch.as_mut_ptr(), n);
        }
        rt.pipes[1].clear();

        let header = scratch.as_mut_ptr().cast::<BucketHeader>();
        // SAFETY: scratch holds a whole delivered bucket.
        unsafe {
            rt.recycle(header);
            assert!((*header).is_consumed());
        }

        // The recycled copy owns the payload now; the consumed original
        // is skipped by the teardown walkers. Exactly one destruction.
        drop_pipe_payloads(&mut rt.pipes[1]);
        drop_batch_payloads(&mut scratch);
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn send_direct_falls_back_to_the_pipe_when_full() {
        let shared = comms(2, 2); // 4-slot rings
        let mut rt = WorkerRuntime::new(0, Arc::clone(&shared));
        let dest = ActorId::new(1, 300);
        let source = ActorId::new(0, 299);

        // Two 2-slot buckets fill the destination ring.
        rt.send_direct(dest, source, 1u64);
        rt.send_direct(dest, source, 2u64);
        assert!(rt.pipes[1].is_empty());

        // The third has to take the ordered staging path.
        rt.send_direct(dest, source, 3u64);
        assert_eq!(rt.pipes[1].len(), bucket_slots::<u64>());

        // The ring kept the first two, whole.
        let mut scratch = vec![Slot::zeroed(); shared.mailbox(1).ring_capacity()];
        let drained = shared.mailbox(1).drain_into(&mut scratch, |_| {});
        assert_eq!(drained, 2 * bucket_slots::<u64>());
    }

    #[test]
    fn slot_allocation_reuses_released_ids() {
        let mut rt = WorkerRuntime::new(0, comms(1, 6));
        let a = rt.alloc_slot();
        let b = rt.alloc_slot();
        assert_eq!(a, FIRST_DYNAMIC_SLOT);
        assert_eq!(b, FIRST_DYNAMIC_SLOT + 1);

        rt.release_slot(a);
        assert_eq!(rt.alloc_slot(), a);

        // Service-range slots never enter the free list.
        rt.release_slot(7);
        assert_ne!(rt.alloc_slot(), 7);
    }
}
