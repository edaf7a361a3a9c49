//! Signal-initiated shutdown. Kept in its own test binary: the signal
//! flag is process-wide, and a concurrently starting engine in another
//! test would re-arm it.

#![cfg(unix)]

use mcore::{Actor, Engine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Idle {
    drops: Arc<AtomicU64>,
}

impl Actor for Idle {}

impl Drop for Idle {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn sigint_drains_every_actor() {
    const WORKERS: usize = 4;
    const ACTORS_PER_WORKER: u64 = 100;

    let drops = Arc::new(AtomicU64::new(0));
    let mut engine = Engine::new(WORKERS);
    engine.set_latency(Duration::from_micros(500));
    for w in 0..WORKERS as u16 {
        let cfg = engine.worker(w).unwrap();
        for _ in 0..ACTORS_PER_WORKER {
            cfg.add_actor(Idle {
                drops: Arc::clone(&drops),
            })
            .unwrap();
        }
    }

    engine.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    // SAFETY: raising a handled signal in-process; the installed handler
    // only stores atomic flags.
    unsafe {
        libc::raise(libc::SIGINT);
    }

    let started = Instant::now();
    engine.join().unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "signal shutdown took too long"
    );
    assert_eq!(
        drops.load(Ordering::Relaxed),
        WORKERS as u64 * ACTORS_PER_WORKER
    );
    assert!(!engine.has_error());
}
