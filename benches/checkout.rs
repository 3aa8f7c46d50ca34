use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use esox_concurrentpool::{ConcurrentObjectPool, PoolConfiguration};

const NOW: Option<Duration> = Some(Duration::ZERO);

fn seeded(size: usize) -> ConcurrentObjectPool<usize> {
    ConcurrentObjectPool::new(
        PoolConfiguration::new()
            .with_capacity(size)
            .with_initial_items((0..size).collect()),
    )
    .unwrap()
}

fn bench_single_thread(c: &mut Criterion) {
    let pool = seeded(64);

    c.bench_function("checkout_return_explicit", |b| {
        b.iter(|| {
            let mut obj = pool.get_object(NOW, None).unwrap();
            black_box(*obj);
            obj.return_to_pool(NOW, None)
        })
    });

    c.bench_function("checkout_return_drop", |b| {
        b.iter(|| {
            let obj = pool.get_object(NOW, None).unwrap();
            black_box(*obj);
        })
    });

    let created = ConcurrentObjectPool::new(
        PoolConfiguration::new().with_factory(|| vec![0u8; 1024]),
    )
    .unwrap();
    c.bench_function("checkout_on_demand", |b| {
        b.iter(|| created.get_object(NOW, None).unwrap().detach().unwrap())
    });
}

fn bench_contended(c: &mut Criterion) {
    let pool = Arc::new(seeded(4));

    c.bench_function("checkout_return_8_threads", |b| {
        b.iter(|| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let obj = pool.get_object(None, None).unwrap();
                            black_box(*obj);
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
        })
    });
}

criterion_group!(benches, bench_single_thread, bench_contended);
criterion_main!(benches);
