//! Basic usage of the blocking pool API

use esox_concurrentpool::{CancellationToken, ConcurrentObjectPool, PoolConfiguration};
use std::thread;
use std::time::Duration;

const NOW: Option<Duration> = Some(Duration::ZERO);

fn main() {
    println!("=== Esox Concurrent Pool - Basic Examples ===\n");

    // Example 1: Seeded pool, return on drop
    simple_pool();

    // Example 2: Factory-backed pool
    factory_pool();

    // Example 3: Timeouts and cancellation
    waiting();

    // Example 4: Observers and metrics
    observers_and_metrics();
}

fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = ConcurrentObjectPool::new(
        PoolConfiguration::new()
            .with_capacity(3)
            .with_initial_items(vec![1, 2, 3]),
    )
    .unwrap();

    {
        let obj = pool.get_object(NOW, None).unwrap();
        println!("   Got object: {}", *obj);
        println!("   Available while checked out: {}", pool.available_count());
        // Object automatically returned when dropped
    }

    let mut obj = pool.get_object(NOW, None).unwrap();
    println!("   Explicit return accepted: {}", obj.return_to_pool(NOW, None));
    println!("   Available after return: {}\n", pool.available_count());
}

fn factory_pool() {
    println!("2. Factory Pool:");
    let pool = ConcurrentObjectPool::new(
        PoolConfiguration::new()
            .with_capacity(4)
            .with_factory(|| vec![0u8; 1024]),
    )
    .unwrap();

    let added = pool.fill(2, NOW, None).unwrap();
    println!("   Pre-filled {} buffers", added);

    let buffers: Vec<_> = (0..3).map(|_| pool.get_object(NOW, None).unwrap()).collect();
    println!("   Checked out {} buffers", buffers.len());
    println!("   Created on demand: {}\n", pool.metrics().total_created);
}

fn waiting() {
    println!("3. Timeouts and Cancellation:");
    let pool = ConcurrentObjectPool::new(
        PoolConfiguration::new()
            .with_capacity(1)
            .with_initial_items(vec!["connection".to_string()]),
    )
    .unwrap();

    let held = pool.get_object(NOW, None).unwrap();
    match pool.get_object(Some(Duration::from_millis(50)), None) {
        Ok(_) => println!("   Got object"),
        Err(e) => println!("   Error: {}", e),
    }

    let token = CancellationToken::new();
    let waiter = {
        let pool = pool.clone();
        let token = token.clone();
        thread::spawn(move || pool.get_object(None, Some(&token)).map(|obj| obj.len()))
    };
    thread::sleep(Duration::from_millis(50));
    token.cancel();
    match waiter.join().unwrap() {
        Ok(len) => println!("   Waiter got an object of length {}", len),
        Err(e) => println!("   Waiter: {}", e),
    }

    drop(held);
    println!("   Available after return: {}\n", pool.available_count());
}

fn observers_and_metrics() {
    println!("4. Observers and Metrics:");
    let pool = ConcurrentObjectPool::new(
        PoolConfiguration::new()
            .with_capacity(5)
            .with_initial_items(vec![1, 2, 3])
            .with_on_get(|item: &i32| println!("   Checked out {}", item)),
    )
    .unwrap();
    pool.on_add(|item| println!("   Returned {}", item));

    {
        let _obj1 = pool.get_object(NOW, None).unwrap();
        let _obj2 = pool.get_object(NOW, None).unwrap();
        println!("   Active: {}, Available: {}", pool.active_count(), pool.available_count());
    }

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
