use crate::actor::{Actor, AnyActor, CallbackThunk};
use crate::context::Context;
use crate::id::SlotId;

/// Per-tick callback for actors that need to run without an inbound event
/// (pollers, reactors, schedulers).
///
/// Registered callbacks are invoked once per worker tick, after the
/// mailbox drain, in registration order. The same cooperative contract as
/// handlers applies: run to completion, never block.
pub trait Periodic: Actor {
    fn on_callback(&mut self, ctx: &mut Context<'_>);
}

pub(crate) fn callback_thunk<A: Periodic>(actor: &mut dyn AnyActor, ctx: &mut Context<'_>) {
    let Some(actor) = actor.any_mut().downcast_mut::<A>() else {
        debug_assert!(false, "callback thunk bound to a different actor type");
        return;
    };
    actor.on_callback(ctx);
}

/// One registered periodic callback. Deactivated entries are skipped and
/// compacted away after each callback pass.
#[derive(Clone, Copy)]
pub(crate) struct CallbackEntry {
    pub slot: SlotId,
    pub thunk: CallbackThunk,
    pub active: bool,
}
