use crate::id::ActorId;
use mcore_ring::BucketHeader;
use std::any::TypeId;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Marker for types that can travel between actors.
///
/// Any `Send + 'static` type qualifies: the payload is moved into the
/// sending worker's staging pipe and crosses threads as raw bytes. Types
/// with destructors are fully supported on the ordered
/// [`push`](crate::Context::push) path; the unordered
/// [`send`](crate::Context::send) path additionally requires `Copy`.
pub trait Event: Send + 'static {}
impl<T: Send + 'static> Event for T {}

/// Asks the receiving actor to terminate. Every actor handles this out of
/// the box by calling `kill()`; override by registering your own handler
/// when cleanup must happen first.
#[derive(Debug, Clone, Copy, Default)]
pub struct KillEvent;

/// Carries an OS signal number to actors that want to react to specific
/// signals. The built-in handler terminates the actor.
#[derive(Debug, Clone, Copy)]
pub struct SignalEvent {
    pub signum: i32,
}

/// Liveness/discovery probe: "is an actor of this type here?". Handled by
/// every actor out of the box; a matching type token earns the sender a
/// [`RequireEvent`] reply. Broadcast by [`require`](crate::Context::require).
#[derive(Debug, Clone, Copy)]
pub struct PingEvent {
    pub type_id: TypeId,
}

/// Reported liveness of a discovered actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    Alive,
    Dead,
}

/// Discovery response to a matching [`PingEvent`].
#[derive(Debug, Clone, Copy)]
pub struct RequireEvent {
    pub type_id: TypeId,
    pub status: ActorStatus,
}

/// Asks the receiving actor to drop its periodic callback registration.
/// Handled out of the box.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnregisterCallbackEvent;

/// Second routing tuple carried by request/response events.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRouting {
    /// Where the response should go, usually the requester's own id.
    pub forward: ActorId,
    /// Event type the bucket turns into when the service acknowledges.
    pub reply_type: TypeId,
}

/// Request/response events processed by service actors.
///
/// The requester fills in the routing tuple before pushing; the service
/// calls [`Inbound::received`] (directly or via
/// [`respond`](crate::Context::respond)), which swaps the bucket's
/// destination with `forward` and its type token with `reply_type`, so
/// re-sending the same bytes delivers the response to the original
/// requester with no new allocation.
///
/// # Safety
///
/// `received` re-labels the bucket's payload with `reply_type` without
/// touching the bytes. Implementors must guarantee that `reply_type`
/// always names a type for which the payload is a valid value; in
/// practice, `TypeId::of::<Self>()` (request and response share the
/// struct, distinguished by direction), which is trivially sound.
pub unsafe trait ServiceEvent: Event {
    fn routing_mut(&mut self) -> &mut ServiceRouting;
}

/// A delivered event, borrowed from the dispatch buffer for the duration
/// of one handler call.
///
/// Dereferences to the payload. Passing it to
/// [`reply`](crate::Context::reply) or [`forward`](crate::Context::forward)
/// consumes it and transfers payload ownership back into the outbound
/// pipe; otherwise the dispatcher destroys the payload in place after the
/// handler returns.
pub struct Inbound<'a, E> {
    header: *mut BucketHeader,
    _marker: PhantomData<(&'a mut BucketHeader, fn(E))>,
}

impl<'a, E: Event> Inbound<'a, E> {
    /// # Safety
    ///
    /// `header` must point at a bucket holding a live payload of type `E`,
    /// exclusively borrowed for `'a`.
    pub(crate) unsafe fn new(header: *mut BucketHeader) -> Self {
        debug_assert!((*header).magic_ok());
        debug_assert_eq!((*header).type_id, TypeId::of::<E>());
        Self {
            header,
            _marker: PhantomData,
        }
    }

    pub(crate) fn header(&self) -> *mut BucketHeader {
        self.header
    }

    /// Actor that sent this event.
    #[inline]
    pub fn source(&self) -> ActorId {
        // SAFETY: header is valid for 'a by construction.
        ActorId::from_raw(unsafe { (*self.header).source })
    }

    /// Actor this event was addressed to (self, or a broadcast id).
    #[inline]
    pub fn dest(&self) -> ActorId {
        // SAFETY: as above.
        ActorId::from_raw(unsafe { (*self.header).dest })
    }
}

impl<'a, E: ServiceEvent> Inbound<'a, E> {
    /// Acknowledges a service request in place: swaps the bucket's
    /// destination with the routing tuple's `forward` and its type token
    /// with `reply_type`, and re-marks the bucket alive. After this the
    /// bucket is addressed back at the requester as the response type;
    /// re-send it with [`respond`](crate::Context::respond) (or stage it
    /// yourself, as a scheduler would).
    pub fn received(&mut self) {
        // SAFETY: exclusive access for 'a; payload is a valid E.
        unsafe {
            let header = &mut *self.header;
            let routing = (*BucketHeader::payload_ptr(self.header).cast::<E>()).routing_mut();

            let fwd = routing.forward;
            routing.forward = ActorId::from_raw(header.dest);
            header.dest = fwd.raw();

            let reply = routing.reply_type;
            routing.reply_type = header.type_id;
            header.type_id = reply;

            header.set_alive(true);
        }
    }
}

impl<'a, E: Event> Deref for Inbound<'a, E> {
    type Target = E;

    #[inline]
    fn deref(&self) -> &E {
        // SAFETY: the payload lives one slot past the header and is a
        // valid E for 'a.
        unsafe { &*BucketHeader::payload_ptr(self.header).cast::<E>() }
    }
}

impl<'a, E: Event> DerefMut for Inbound<'a, E> {
    #[inline]
    fn deref_mut(&mut self) -> &mut E {
        // SAFETY: as above, exclusively borrowed.
        unsafe { &mut *BucketHeader::payload_ptr(self.header).cast::<E>() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcore_ring::{bucket_slots, Slot};

    struct Req {
        routing: ServiceRouting,
        val: u32,
    }

    // SAFETY: reply_type stays Req's own type id throughout the test.
    unsafe impl ServiceEvent for Req {
        fn routing_mut(&mut self) -> &mut ServiceRouting {
            &mut self.routing
        }
    }

    #[test]
    fn received_redirects_the_bucket_at_the_requester() {
        let requester = ActorId::new(0, 300);
        let service = ActorId::new(1, 5);

        let slots = bucket_slots::<Req>();
        let mut storage = vec![Slot::zeroed(); slots];
        let header = storage.as_mut_ptr().cast::<BucketHeader>();

        // Build the bucket the way the staging path would.
        unsafe {
            header.write(BucketHeader::new(
                TypeId::of::<Req>(),
                slots as u16,
                service.raw(),
                requester.raw(),
                None,
            ));
            BucketHeader::payload_ptr(header).cast::<Req>().write(Req {
                routing: ServiceRouting {
                    forward: requester,
                    reply_type: TypeId::of::<Req>(),
                },
                val: 9,
            });

            let mut inbound = Inbound::<Req>::new(header);
            assert_eq!(inbound.dest(), service);
            assert_eq!(inbound.source(), requester);

            inbound.received();

            // Destination and forward swapped; payload untouched.
            assert_eq!(inbound.dest(), requester);
            assert_eq!(inbound.routing.forward, service);
            assert_eq!(inbound.val, 9);
            assert_eq!((*header).type_id, TypeId::of::<Req>());
            assert!((*header).is_alive());
        }
    }

    #[test]
    fn inbound_exposes_payload_mutably() {
        let slots = bucket_slots::<u64>();
        let mut storage = vec![Slot::zeroed(); slots];
        let header = storage.as_mut_ptr().cast::<BucketHeader>();

        unsafe {
            header.write(BucketHeader::new(
                TypeId::of::<u64>(),
                slots as u16,
                ActorId::new(0, 300).raw(),
                ActorId::new(0, 301).raw(),
                None,
            ));
            BucketHeader::payload_ptr(header).cast::<u64>().write(40);

            let mut inbound = Inbound::<u64>::new(header);
            *inbound += 2;
            assert_eq!(*inbound, 42);
        }
    }
}
