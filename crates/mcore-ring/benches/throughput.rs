use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use mcore_ring::{Mailbox, RingConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn mailbox_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("mailbox");

    for &producers in &[1usize, 2, 4] {
        group.throughput(Throughput::Elements(100_000));
        group.bench_function(format!("{producers}p_drain"), |b| {
            b.iter_custom(|iters| {
                let mb = Arc::new(
                    Mailbox::<u64>::new(producers, RingConfig::default(), 0).unwrap(),
                );
                let stop = Arc::new(AtomicBool::new(false));

                let handles: Vec<_> = (0..producers)
                    .map(|p| {
                        let mb = Arc::clone(&mb);
                        let stop = Arc::clone(&stop);
                        thread::spawn(move || {
                            let mut i = 0u64;
                            while !stop.load(Ordering::Relaxed) {
                                if mb.enqueue(p, &[i]) {
                                    i += 1;
                                }
                            }
                        })
                    })
                    .collect();

                let mut scratch = vec![0u64; mb.ring_capacity()];
                let target = iters * 100_000;
                let start = std::time::Instant::now();
                let mut drained = 0u64;
                while drained < target {
                    drained += mb.drain_into(&mut scratch, |_| {}) as u64;
                }
                let elapsed = start.elapsed();

                stop.store(true, Ordering::Relaxed);
                for h in handles {
                    h.join().unwrap();
                }
                elapsed
            });
        });
    }

    group.finish();
}

criterion_group!(benches, mailbox_throughput);
criterion_main!(benches);
