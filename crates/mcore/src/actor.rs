use crate::context::Context;
use crate::event::{ActorStatus, Event, Inbound, PingEvent, RequireEvent};
use crate::id::ActorId;
use mcore_ring::BucketHeader;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// An addressable unit of state, bound to one worker for its whole life.
///
/// Implementations register the event types they react to (usually from
/// `on_init`) and receive them through [`Handle`] impls. All interaction
/// with the rest of the system goes through the [`Context`] passed into
/// every invocation; actors hold no runtime references of their own.
pub trait Actor: 'static {
    /// Called exactly once, after the actor has its id and before it
    /// receives any event. Returning `false` destroys the actor
    /// immediately: during the configuration phase this aborts the whole
    /// engine start, at runtime (`add_ref_actor`) it yields `None`.
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        let _ = ctx;
        true
    }
}

/// Reaction of an actor to one event type. Install with
/// [`register_event`](Context::register_event).
pub trait Handle<E: Event>: Actor {
    fn on(&mut self, ctx: &mut Context<'_>, event: Inbound<'_, E>);
}

/// Object-safe shim over a concrete actor: lifecycle entry plus `Any`
/// access for the typed dispatch thunks.
pub(crate) trait AnyActor: Any {
    fn any_mut(&mut self) -> &mut dyn Any;
    fn init(&mut self, ctx: &mut Context<'_>) -> bool;
}

impl<A: Actor> AnyActor for A {
    fn any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> bool {
        self.on_init(ctx)
    }
}

/// Typed dispatch entry: casts the payload to the concrete event type and
/// invokes the actor's handler. Monomorphized per (actor, event) pair, so
/// the handler table stores plain function pointers.
pub(crate) type HandlerThunk = fn(&mut dyn AnyActor, &mut Context<'_>, *mut BucketHeader);

/// Periodic callback entry, monomorphized per actor type.
pub(crate) type CallbackThunk = fn(&mut dyn AnyActor, &mut Context<'_>);

pub(crate) fn handler_thunk<E: Event, A: Handle<E>>(
    actor: &mut dyn AnyActor,
    ctx: &mut Context<'_>,
    header: *mut BucketHeader,
) {
    let Some(actor) = actor.any_mut().downcast_mut::<A>() else {
        debug_assert!(false, "dispatch thunk bound to a different actor type");
        return;
    };
    // SAFETY: the dispatcher selected this thunk by the header's type
    // token, so the payload is a valid E with exclusive access.
    let inbound = unsafe { Inbound::new(header) };
    actor.on(ctx, inbound);
}

/// Runtime identity and handler table of one hosted actor.
pub(crate) struct CellMeta {
    pub id: ActorId,
    pub alive: bool,
    /// Type token of the concrete actor type (discovery pings match on it).
    pub type_id: TypeId,
    pub name: &'static str,
    pub handlers: HashMap<TypeId, HandlerThunk>,
}

/// One hosted actor: the type-erased state plus its metadata, split so the
/// dispatcher can borrow both halves independently.
pub(crate) struct ActorCell {
    pub actor: Box<dyn AnyActor>,
    pub meta: CellMeta,
}

impl ActorCell {
    pub fn new<A: Actor>(actor: A, id: ActorId) -> Self {
        let mut meta = CellMeta {
            id,
            alive: true,
            type_id: TypeId::of::<A>(),
            name: std::any::type_name::<A>(),
            handlers: HashMap::new(),
        };
        install_builtins(&mut meta);
        Self {
            actor: Box::new(actor),
            meta,
        }
    }
}

/// Handlers every actor gets for free. `register_event` replaces them when
/// the actor wants its own behavior.
pub(crate) fn install_builtins(meta: &mut CellMeta) {
    meta.handlers
        .insert(TypeId::of::<crate::event::KillEvent>(), builtin_kill);
    meta.handlers
        .insert(TypeId::of::<crate::event::SignalEvent>(), builtin_kill);
    meta.handlers.insert(TypeId::of::<PingEvent>(), builtin_ping);
    meta.handlers.insert(
        TypeId::of::<crate::event::UnregisterCallbackEvent>(),
        builtin_unregister_callback,
    );
}

fn builtin_kill(_actor: &mut dyn AnyActor, ctx: &mut Context<'_>, _header: *mut BucketHeader) {
    ctx.kill();
}

fn builtin_ping(_actor: &mut dyn AnyActor, ctx: &mut Context<'_>, header: *mut BucketHeader) {
    // SAFETY: the dispatcher routed this thunk by type token.
    let ping = unsafe { Inbound::<PingEvent>::new(header) };
    if ping.type_id == ctx.actor_type_id() && ctx.is_alive() {
        let requester = ping.source();
        ctx.push(
            requester,
            RequireEvent {
                type_id: ping.type_id,
                status: ActorStatus::Alive,
            },
        );
    }
}

fn builtin_unregister_callback(
    _actor: &mut dyn AnyActor,
    ctx: &mut Context<'_>,
    _header: *mut BucketHeader,
) {
    ctx.unregister_callback();
}
