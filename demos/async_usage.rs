//! Async usage of the pool

use esox_concurrentpool::{CancellationToken, ConcurrentObjectPool, PoolConfiguration};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() {
    println!("=== Esox Concurrent Pool - Async Examples ===\n");

    // Example 1: Async get
    async_get().await;

    // Example 2: Async with timeout and cancellation
    async_waiting().await;

    // Example 3: Async fill
    async_fill().await;

    // Example 4: Concurrent access
    concurrent_access().await;
}

async fn async_get() {
    println!("1. Async Get:");
    let pool = ConcurrentObjectPool::new(
        PoolConfiguration::new().with_initial_items(vec![1, 2, 3]),
    )
    .unwrap();

    let mut obj = pool.get_object_async(None, None).await.unwrap();
    println!("   Got object asynchronously: {}", *obj);
    let returned = obj.return_to_pool_async(None, None).await;
    println!("   Returned asynchronously: {}\n", returned);
}

async fn async_waiting() {
    println!("2. Async with Timeout and Cancellation:");
    let pool = ConcurrentObjectPool::new(
        PoolConfiguration::new()
            .with_capacity(1)
            .with_initial_items(vec![42]),
    )
    .unwrap();

    // Get the only object
    let _obj = pool.get_object_async(None, None).await.unwrap();

    match pool.get_object_async(Some(Duration::from_millis(100)), None).await {
        Ok(_) => println!("   Got object"),
        Err(e) => println!("   Error: {}", e),
    }

    let token = CancellationToken::new();
    let waiter = {
        let pool = pool.clone();
        let token = token.clone();
        tokio::spawn(async move { pool.get_object_async(None, Some(&token)).await.map(|obj| *obj) })
    };
    sleep(Duration::from_millis(20)).await;
    token.cancel();
    match waiter.await.unwrap() {
        Ok(value) => println!("   Waiter got {}", value),
        Err(e) => println!("   Waiter: {}", e),
    }

    println!();
}

async fn async_fill() {
    println!("3. Async Fill:");
    let pool = ConcurrentObjectPool::new(
        PoolConfiguration::new()
            .with_capacity(10)
            .with_factory(|| {
                println!("   Creating new object...");
                42
            }),
    )
    .unwrap();

    let added = pool.fill_async(5, None, None).await.unwrap();
    println!("   Added {} objects, available: {}", added, pool.available_count());

    let added = pool.fill_with_async(vec![7, 8], None, None).await.unwrap();
    println!("   Added {} more, available: {}\n", added, pool.available_count());
}

async fn concurrent_access() {
    println!("4. Concurrent Access:");
    let pool = ConcurrentObjectPool::new(
        PoolConfiguration::new().with_initial_items(vec![1, 2, 3, 4, 5]),
    )
    .unwrap();

    let mut handles = vec![];

    for i in 0..10 {
        let pool = pool.clone();
        let handle = tokio::spawn(async move {
            match pool.get_object_async(Some(Duration::from_millis(500)), None).await {
                Ok(obj) => {
                    println!("   Task {} got object: {}", i, *obj);
                    sleep(Duration::from_millis(50)).await;
                }
                Err(e) => println!("   Task {} couldn't get object: {}", i, e),
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    println!("   Final available: {}", pool.available_count());
}
