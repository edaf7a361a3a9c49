//! Two workers bouncing a counter back and forth, then a clean shutdown.
//!
//! Run with: cargo run --bin pingpong

use mcore::{Actor, ActorId, Context, Engine, Handle, Inbound};
use std::time::Duration;

struct Ball {
    bounces: u64,
}

struct Player {
    name: &'static str,
    peer: ActorId,
    limit: u64,
    serves: bool,
}

impl Actor for Player {
    fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.register_event::<Ball, Self>();
        if self.serves {
            ctx.push(self.peer, Ball { bounces: 0 });
        }
        true
    }
}

impl Handle<Ball> for Player {
    fn on(&mut self, ctx: &mut Context<'_>, mut event: Inbound<'_, Ball>) {
        event.bounces += 1;
        if event.bounces % 100_000 == 0 {
            println!(
                "{}: {} bounces at t={}ns",
                self.name,
                event.bounces,
                ctx.time()
            );
        }
        if event.bounces >= self.limit {
            println!("{}: done after {} bounces", self.name, event.bounces);
            ctx.shutdown();
        } else {
            ctx.reply(event);
        }
    }
}

fn main() {
    let mut engine = Engine::new(2);
    engine.set_latency(Duration::from_micros(100));

    // Ids are deterministic: first dynamic slot on each worker.
    let left_id = ActorId::new(0, mcore::FIRST_DYNAMIC_SLOT);
    let right_id = ActorId::new(1, mcore::FIRST_DYNAMIC_SLOT);

    let left = engine
        .add_actor(
            0,
            Player {
                name: "left",
                peer: right_id,
                limit: 1_000_000,
                serves: true,
            },
        )
        .expect("configure left");
    let right = engine
        .add_actor(
            1,
            Player {
                name: "right",
                peer: left_id,
                limit: 1_000_000,
                serves: false,
            },
        )
        .expect("configure right");
    assert_eq!((left, right), (left_id, right_id));

    engine.start().expect("engine start");
    match engine.join() {
        Ok(()) => println!("engine stopped cleanly"),
        Err(e) => eprintln!("engine stopped with errors: {e}"),
    }
}
