use crate::actor::{handler_thunk, Actor, ActorCell, CellMeta, Handle};
use crate::callback::{callback_thunk, CallbackEntry, Periodic};
use crate::event::{Event, Inbound, PingEvent, ServiceEvent};
use crate::id::{ActorId, WorkerId};
use crate::worker::WorkerRuntime;
use std::any::TypeId;

/// The runtime surface an actor sees while one of its handlers, callbacks
/// or `on_init` runs.
///
/// Everything an actor does to the outside world goes through here:
/// sending, replying, registering handlers and callbacks, spawning
/// same-worker children, terminating. A `Context` is only ever handed to
/// the actor it belongs to and only for the duration of one invocation;
/// actors never hold on to it.
pub struct Context<'a> {
    pub(crate) meta: &'a mut CellMeta,
    pub(crate) rt: &'a mut WorkerRuntime,
}

impl<'a> Context<'a> {
    /// This actor's address.
    #[inline]
    pub fn id(&self) -> ActorId {
        self.meta.id
    }

    /// The worker hosting this actor.
    #[inline]
    pub fn worker_id(&self) -> WorkerId {
        self.rt.worker_id
    }

    /// Number of workers in the engine.
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.rt.n_workers
    }

    /// Cached tick timestamp, nanoseconds. Stable across one invocation:
    /// every call within the same handler returns the same value.
    #[inline]
    pub fn time(&self) -> u64 {
        self.rt.tick_time
    }

    /// False once `kill` ran; the actor still drains already-queued events
    /// until the worker's next removal pass.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.meta.alive
    }

    /// Type token of the hosted actor (what discovery pings match on).
    #[inline]
    pub fn actor_type_id(&self) -> TypeId {
        self.meta.type_id
    }

    /// Marks this actor dead and schedules its removal. Idempotent.
    pub fn kill(&mut self) {
        self.meta.alive = false;
        self.rt.to_remove.insert(self.meta.id.slot());
    }

    /// Requests a system-wide graceful shutdown, exactly as an OS signal
    /// would: every worker broadcasts a kill to its actors at its next
    /// tick boundary.
    pub fn shutdown(&mut self) {
        self.rt.comms.request_stop();
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Sends `event` to `dest`, ordered: events pushed by one actor to the
    /// same destination are delivered in push order.
    ///
    /// Returns a reference into the staging pipe, valid until the next
    /// context operation; mutate the event through it before the tick's
    /// flush if needed.
    ///
    /// # Panics
    ///
    /// Panics if `dest` names an unconfigured worker or the event is too
    /// large for a mailbox ring.
    pub fn push<E: Event>(&mut self, dest: ActorId, event: E) -> &mut E {
        let source = self.meta.id;
        // SAFETY: stage returns a pointer into the staging pipe that stays
        // valid until the pipe is appended to again, which only context
        // operations do, and those require `&mut self`.
        unsafe { &mut *self.rt.stage(dest, source, event) }
    }

    /// Fire-and-forget: tries to hand `event` straight to the destination
    /// mailbox, skipping the staging pipe. Falls back to the ordered path
    /// when the mailbox ring is momentarily full.
    ///
    /// No ordering is guaranteed relative to `push` from the same actor;
    /// the payload must be trivially destructible (`Copy`).
    pub fn send<E: Event + Copy>(&mut self, dest: ActorId, event: E) {
        let source = self.meta.id;
        self.rt.send_direct(dest, source, event);
    }

    /// Sends the inbound event back to its sender, reusing the bucket:
    /// source and destination swap and the bytes go back out through the
    /// staging pipe. The payload's ownership transfers with it; the
    /// dispatcher will not destroy it.
    pub fn reply<E: Event>(&mut self, event: Inbound<'_, E>) {
        let header = event.header();
        // SAFETY: the Inbound guarantees exclusive access to a live
        // bucket; recycle copies it out before marking it consumed.
        unsafe {
            debug_assert!(!(*header).is_consumed(), "inbound event re-sent twice");
            std::mem::swap(&mut (*header).dest, &mut (*header).source);
            self.rt.recycle(header);
        }
    }

    /// Passes the inbound event on to `dest`, preserving the original
    /// source. Consumes the bucket exactly like [`reply`](Self::reply).
    pub fn forward<E: Event>(&mut self, dest: ActorId, event: Inbound<'_, E>) {
        let header = event.header();
        // SAFETY: as in `reply`.
        unsafe {
            debug_assert!(!(*header).is_consumed(), "inbound event re-sent twice");
            (*header).dest = dest.raw();
            self.rt.recycle(header);
        }
    }

    /// Service-side acknowledgement: applies [`Inbound::received`] (the
    /// requester becomes the destination, the type token flips to the
    /// reply type) and re-sends the bucket.
    pub fn respond<E: ServiceEvent>(&mut self, mut event: Inbound<'_, E>) {
        event.received();
        let header = event.header();
        // SAFETY: as in `reply`.
        unsafe {
            debug_assert!(!(*header).is_consumed(), "inbound event re-sent twice");
            self.rt.recycle(header);
        }
    }

    /// Sends `event` to every actor on every worker (one bucket per
    /// worker; the receiving worker fans out to its local actors that
    /// handle `E`).
    pub fn broadcast<E: Event + Clone>(&mut self, event: E) {
        let source = self.meta.id;
        let last = self.rt.n_workers as WorkerId - 1;
        for w in 0..last {
            let copy = event.clone();
            self.rt.stage(ActorId::broadcast(w), source, copy);
        }
        self.rt.stage(ActorId::broadcast(last), source, event);
    }

    /// Discovers live actors of type `A`: broadcasts a [`PingEvent`] with
    /// `A`'s type token. Every live actor of that type replies with a
    /// [`RequireEvent`](crate::RequireEvent); register a handler for it
    /// before calling.
    pub fn require<A: Actor>(&mut self) {
        self.broadcast(PingEvent {
            type_id: TypeId::of::<A>(),
        });
    }

    /// A send handle bound to one destination, for pushing several events
    /// to the same actor without repeating the address.
    pub fn pipe_to(&mut self, dest: ActorId) -> BoundPipe<'_> {
        BoundPipe {
            rt: &mut *self.rt,
            source: self.meta.id,
            dest,
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Subscribes this actor to events of type `E`. `A` must be the
    /// concrete actor type (`Self` at the call site). Replaces any
    /// previous handler for `E`, built-ins included.
    pub fn register_event<E: Event, A: Handle<E>>(&mut self) {
        self.meta
            .handlers
            .insert(TypeId::of::<E>(), handler_thunk::<E, A>);
    }

    /// Drops this actor's handler for `E`; subsequent deliveries of `E`
    /// are discarded by the dispatcher.
    pub fn unregister_event<E: Event>(&mut self) {
        self.meta.handlers.remove(&TypeId::of::<E>());
    }

    /// Registers this actor's [`Periodic::on_callback`] to run every tick,
    /// in registration order, until unregistered or the actor dies.
    pub fn register_callback<A: Periodic>(&mut self) {
        let slot = self.meta.id.slot();
        if let Some(entry) = self.rt.callbacks.iter_mut().find(|e| e.slot == slot) {
            entry.thunk = callback_thunk::<A>;
            entry.active = true;
        } else {
            self.rt.callbacks.push(CallbackEntry {
                slot,
                thunk: callback_thunk::<A>,
                active: true,
            });
        }
    }

    /// Stops this actor's periodic callback. Safe to call from within the
    /// callback itself.
    pub fn unregister_callback(&mut self) {
        let slot = self.meta.id.slot();
        if let Some(entry) = self.rt.callbacks.iter_mut().find(|e| e.slot == slot) {
            entry.active = false;
        }
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    /// Creates a child actor on this worker, running its `on_init`
    /// synchronously. Returns a direct reference on success, `None` if
    /// `on_init` declined (the child is destroyed immediately).
    ///
    /// The reference is non-owning: the child controls its own lifetime
    /// through `kill`, and its slot id may eventually be reused after it
    /// dies. Prefer messaging the child via its id for anything beyond
    /// immediate post-construction setup.
    pub fn add_ref_actor<A: Actor>(&mut self, actor: A) -> Option<&mut A> {
        let slot = self.rt.alloc_slot();
        let id = ActorId::new(self.rt.worker_id, slot);
        let mut cell = ActorCell::new(actor, id);

        let ok = {
            let mut ctx = Context {
                meta: &mut cell.meta,
                rt: &mut *self.rt,
            };
            cell.actor.init(&mut ctx)
        };
        if !ok {
            self.rt.release_slot(slot);
            return None;
        }

        self.rt.spawned.push(cell);
        self.rt
            .spawned
            .last_mut()
            .and_then(|cell| cell.actor.any_mut().downcast_mut::<A>())
    }
}

/// Send handle bound to one destination actor. Obtained from
/// [`Context::pipe_to`]; pushes through it are ordered exactly like
/// [`Context::push`].
pub struct BoundPipe<'a> {
    rt: &'a mut WorkerRuntime,
    source: ActorId,
    dest: ActorId,
}

impl BoundPipe<'_> {
    #[inline]
    pub fn dest(&self) -> ActorId {
        self.dest
    }

    /// Ordered send to the bound destination.
    pub fn push<E: Event>(&mut self, event: E) -> &mut E {
        // SAFETY: see `Context::push`.
        unsafe { &mut *self.rt.stage(self.dest, self.source, event) }
    }
}
