//! mcore - a fixed-topology actor runtime for latency-sensitive servers.
//!
//! Work is partitioned across a fixed set of worker threads ("virtual
//! cores"); each actor is bound to one worker for life and talks to the
//! rest of the system exclusively through asynchronous message passing.
//! Inside a worker everything is single-threaded and cooperative: a
//! handler runs to completion, never blocks, never yields mid-way.
//! Between workers, events travel as cache-line aligned buckets through
//! per-producer lock-free rings ([`mcore_ring`]), so there is no shared
//! mutable state anywhere in the hot path.
//!
//! Guarantees:
//!
//! - **Ordering**: events [`push`](Context::push)ed by one actor to one
//!   destination arrive in push order, including across workers.
//!   [`send`](Context::send) opts out of ordering for a shorter path.
//! - **Backpressure without loss**: a full mailbox ring leaves the bucket
//!   in the sender's staging pipe; it is retried every tick until the
//!   consumer catches up.
//! - **Graceful shutdown**: a handled signal (or [`Engine::stop`]) makes
//!   every worker deliver a [`KillEvent`] to its actors; the engine joins
//!   once every actor has been destructed.
//!
//! # Example
//!
//! ```no_run
//! use mcore::{Actor, Context, Engine, Handle, Inbound, KillEvent};
//!
//! struct Greeting {
//!     text: String,
//! }
//!
//! struct Greeter;
//!
//! impl Actor for Greeter {
//!     fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
//!         ctx.register_event::<Greeting, Self>();
//!         true
//!     }
//! }
//!
//! impl Handle<Greeting> for Greeter {
//!     fn on(&mut self, ctx: &mut Context<'_>, event: Inbound<'_, Greeting>) {
//!         println!("{}", event.text);
//!         ctx.kill();
//!     }
//! }
//!
//! struct Starter {
//!     greeter: mcore::ActorId,
//! }
//!
//! impl Actor for Starter {
//!     fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
//!         ctx.push(self.greeter, Greeting { text: "hello".into() });
//!         ctx.kill();
//!         true
//!     }
//! }
//!
//! let mut engine = Engine::new(2);
//! let greeter = engine.worker(1).unwrap().add_actor(Greeter).unwrap();
//! engine.worker(0).unwrap().add_actor(Starter { greeter }).unwrap();
//! engine.start().unwrap();
//! engine.join().unwrap();
//! ```

mod actor;
mod callback;
mod context;
mod engine;
mod error;
mod event;
mod id;
mod service;
mod signal;
mod time;
mod worker;

pub use actor::{Actor, Handle};
pub use callback::Periodic;
pub use context::{BoundPipe, Context};
pub use engine::{Engine, ShutdownHandle, WorkerConfig};
pub use error::{error_bits, ConfigError, EngineError, WorkerFailure};
pub use event::{
    ActorStatus, Event, Inbound, KillEvent, PingEvent, RequireEvent, ServiceEvent, ServiceRouting,
    SignalEvent, UnregisterCallbackEvent,
};
pub use id::{
    ActorId, SlotId, WorkerId, WorkerIdSet, BROADCAST_SLOT, FIRST_DYNAMIC_SLOT, MAX_WORKERS,
};
pub use service::{service_id, Service};
pub use time::now_nanos;
