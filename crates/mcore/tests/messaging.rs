//! Reply, forward, service acknowledgement and broadcast semantics.

use mcore::{
    Actor, ActorId, Context, Engine, Handle, Inbound, ServiceEvent, ServiceRouting,
};
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn run(engine: &mut Engine) {
    engine.start().unwrap();
    let dog = engine.shutdown_handle();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(15));
        dog.stop();
    });
    engine.join().unwrap();
}

// ---------------------------------------------------------------------
// reply: same bucket comes back, payload intact, endpoints swapped
// ---------------------------------------------------------------------

struct Echo {
    text: String,
    hops: u32,
}

struct EchoServer;

impl Actor for EchoServer {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<Echo, Self>();
        true
    }
}

impl Handle<Echo> for EchoServer {
    fn on(&mut self, ctx: &mut Context<'_>, mut event: Inbound<'_, Echo>) {
        event.hops += 1;
        ctx.reply(event);
    }
}

struct EchoClient {
    server: ActorId,
    ok: Arc<AtomicBool>,
}

impl Actor for EchoClient {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<Echo, Self>();
        ctx.push(
            self.server,
            Echo {
                text: "round trip".into(),
                hops: 0,
            },
        );
        true
    }
}

impl Handle<Echo> for EchoClient {
    fn on(&mut self, ctx: &mut Context<'_>, event: Inbound<'_, Echo>) {
        if event.source() == self.server
            && event.dest() == ctx.id()
            && event.text == "round trip"
            && event.hops == 1
        {
            self.ok.store(true, Ordering::Relaxed);
        }
        ctx.shutdown();
    }
}

#[test]
fn reply_swaps_endpoints_and_preserves_payload() {
    let ok = Arc::new(AtomicBool::new(false));

    let mut engine = Engine::new(2);
    engine.set_latency(Duration::from_micros(500));
    let server = engine.worker(1).unwrap().add_actor(EchoServer).unwrap();
    engine
        .worker(0)
        .unwrap()
        .add_actor(EchoClient {
            server,
            ok: Arc::clone(&ok),
        })
        .unwrap();

    run(&mut engine);
    assert!(ok.load(Ordering::Relaxed));
}

// ---------------------------------------------------------------------
// forward: destination changes, source survives
// ---------------------------------------------------------------------

struct Job {
    payload: Vec<u8>,
}

struct Router {
    sink: ActorId,
}

impl Actor for Router {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<Job, Self>();
        true
    }
}

impl Handle<Job> for Router {
    fn on(&mut self, ctx: &mut Context<'_>, event: Inbound<'_, Job>) {
        ctx.forward(self.sink, event);
    }
}

struct Sink {
    origin: ActorId,
    ok: Arc<AtomicBool>,
}

impl Actor for Sink {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<Job, Self>();
        true
    }
}

impl Handle<Job> for Sink {
    fn on(&mut self, ctx: &mut Context<'_>, event: Inbound<'_, Job>) {
        if event.source() == self.origin && event.payload == vec![1, 2, 3] {
            self.ok.store(true, Ordering::Relaxed);
        }
        ctx.shutdown();
    }
}

struct Origin {
    router: ActorId,
}

impl Actor for Origin {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.push(
            self.router,
            Job {
                payload: vec![1, 2, 3],
            },
        );
        true
    }
}

#[test]
fn forward_keeps_the_original_source() {
    let ok = Arc::new(AtomicBool::new(false));

    let mut engine = Engine::new(3);
    engine.set_latency(Duration::from_micros(500));

    // Ids are assigned at configuration time, so wire the chain up front.
    let origin_id = ActorId::new(0, mcore::FIRST_DYNAMIC_SLOT);
    let sink = engine
        .worker(2)
        .unwrap()
        .add_actor(Sink {
            origin: origin_id,
            ok: Arc::clone(&ok),
        })
        .unwrap();
    let router = engine.worker(1).unwrap().add_actor(Router { sink }).unwrap();
    let origin = engine
        .worker(0)
        .unwrap()
        .add_actor(Origin { router })
        .unwrap();
    assert_eq!(origin, origin_id);

    run(&mut engine);
    assert!(ok.load(Ordering::Relaxed));
}

// ---------------------------------------------------------------------
// service events: received() turns the request into the response
// ---------------------------------------------------------------------

struct Query {
    routing: ServiceRouting,
    text: String,
}

// SAFETY: reply_type is always Query's own type id; request and response
// share the struct.
unsafe impl ServiceEvent for Query {
    fn routing_mut(&mut self) -> &mut ServiceRouting {
        &mut self.routing
    }
}

struct UpperService;

impl Actor for UpperService {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<Query, Self>();
        true
    }
}

impl Handle<Query> for UpperService {
    fn on(&mut self, ctx: &mut Context<'_>, mut event: Inbound<'_, Query>) {
        event.text = event.text.to_uppercase();
        ctx.respond(event);
    }
}

struct Requester {
    service: ActorId,
    ok: Arc<AtomicBool>,
}

impl Actor for Requester {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<Query, Self>();
        let me = ctx.id();
        ctx.push(
            self.service,
            Query {
                routing: ServiceRouting {
                    forward: me,
                    reply_type: TypeId::of::<Query>(),
                },
                text: "quiet".into(),
            },
        );
        true
    }
}

impl Handle<Query> for Requester {
    fn on(&mut self, ctx: &mut Context<'_>, event: Inbound<'_, Query>) {
        if event.text == "QUIET" {
            self.ok.store(true, Ordering::Relaxed);
        }
        ctx.shutdown();
    }
}

#[test]
fn service_acknowledgement_routes_back_to_the_requester() {
    let ok = Arc::new(AtomicBool::new(false));

    let mut engine = Engine::new(2);
    engine.set_latency(Duration::from_micros(500));
    let service = engine.worker(1).unwrap().add_actor(UpperService).unwrap();
    engine
        .worker(0)
        .unwrap()
        .add_actor(Requester {
            service,
            ok: Arc::clone(&ok),
        })
        .unwrap();

    run(&mut engine);
    assert!(ok.load(Ordering::Relaxed));
}

// ---------------------------------------------------------------------
// broadcast: one bucket per worker, fan-out to every subscriber
// ---------------------------------------------------------------------

#[derive(Clone)]
struct Announcement {
    round: u64,
}

struct Listener {
    heard: Arc<AtomicU64>,
}

impl Actor for Listener {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<Announcement, Self>();
        true
    }
}

impl Handle<Announcement> for Listener {
    fn on(&mut self, ctx: &mut Context<'_>, event: Inbound<'_, Announcement>) {
        assert_eq!(event.round, 7);
        self.heard.fetch_add(1, Ordering::Relaxed);
        ctx.kill();
    }
}

struct Announcer;

impl Actor for Announcer {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.broadcast(Announcement { round: 7 });
        ctx.kill();
        true
    }
}

#[test]
fn broadcast_reaches_every_subscriber_once() {
    const WORKERS: usize = 3;
    const LISTENERS_PER_WORKER: u64 = 4;
    let heard = Arc::new(AtomicU64::new(0));

    let mut engine = Engine::new(WORKERS);
    engine.set_latency(Duration::from_micros(500));
    for w in 0..WORKERS as u16 {
        let cfg = engine.worker(w).unwrap();
        for _ in 0..LISTENERS_PER_WORKER {
            cfg.add_actor(Listener {
                heard: Arc::clone(&heard),
            })
            .unwrap();
        }
    }
    engine.worker(0).unwrap().add_actor(Announcer).unwrap();

    engine.start().unwrap();
    let dog = engine.shutdown_handle();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(15));
        dog.stop();
    });
    // Listeners kill themselves after one announcement; the engine
    // terminates once every worker is empty.
    engine.join().unwrap();

    assert_eq!(
        heard.load(Ordering::Relaxed),
        WORKERS as u64 * LISTENERS_PER_WORKER
    );
}
