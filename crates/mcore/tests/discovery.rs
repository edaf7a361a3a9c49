//! Service discovery: `require` reaches every worker and each live
//! service of the requested type answers exactly once.

use mcore::{Actor, ActorStatus, Context, Engine, Handle, Inbound, RequireEvent, Service};
use std::any::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Registry;

impl Actor for Registry {}

impl Service for Registry {
    type Tag = Registry;
}

struct Seeker {
    found: Arc<AtomicU64>,
    expected: u64,
}

impl Actor for Seeker {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<RequireEvent, Self>();
        ctx.require::<Registry>();
        true
    }
}

impl Handle<RequireEvent> for Seeker {
    fn on(&mut self, ctx: &mut Context<'_>, event: Inbound<'_, RequireEvent>) {
        if event.type_id == TypeId::of::<Registry>() && event.status == ActorStatus::Alive {
            let seen = self.found.fetch_add(1, Ordering::Relaxed) + 1;
            if seen == self.expected {
                ctx.shutdown();
            }
        }
    }
}

#[test]
fn require_finds_a_service_on_every_worker() {
    const WORKERS: usize = 3;
    let found = Arc::new(AtomicU64::new(0));

    let mut engine = Engine::new(WORKERS);
    engine.set_latency(Duration::from_micros(500));

    for w in 0..WORKERS as u16 {
        engine.worker(w).unwrap().add_service(Registry).unwrap();
    }
    engine
        .worker(0)
        .unwrap()
        .add_actor(Seeker {
            found: Arc::clone(&found),
            expected: WORKERS as u64,
        })
        .unwrap();

    engine.start().unwrap();

    let dog = engine.shutdown_handle();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(10));
        dog.stop();
    });

    engine.join().unwrap();
    assert_eq!(found.load(Ordering::Relaxed), WORKERS as u64);
}

#[test]
fn service_addresses_are_stable() {
    use mcore::service_id;
    let a = service_id::<Registry>(0);
    let b = service_id::<Registry>(2);
    assert_eq!(a.slot(), b.slot());
    assert_ne!(a, b);
}
