// demos/basic_usage.rs
//! Basic usage example of the pool.

use adapool::config::PoolConfigBuilder;
use adapool::prelude::*;

fn main() -> Result<()> {
    println!("=== Basic Pool Usage ===\n");

    // 1. A pool of reusable byte buffers. The allocator builds a fresh
    // Vec<u8>, the cleaner clears it before the next caller sees it.
    let pool: Pool<Vec<u8>> = Pool::new(
        || Box::new(Vec::with_capacity(4096)),
        |buf: &mut Vec<u8>| buf.clear(),
    )?;

    println!("Pool initialized with capacity {}", pool.capacity());

    {
        let mut buf = pool.acquire()?;
        buf.extend_from_slice(b"Hello, World!");
        println!("Acquired buffer, len = {}", buf.len());
        // Buffer is automatically returned when dropped.
    }

    let stats = pool.stats();
    println!(
        "After one round trip: total_gets={}, objects_in_use={}",
        stats.total_gets, stats.objects_in_use
    );

    println!("\n=== Acquiring Several at Once ===\n");

    {
        let mut buf1 = pool.acquire()?;
        let mut buf2 = pool.acquire()?;

        buf1.extend_from_slice(b"Buffer 1");
        buf2.extend_from_slice(b"Buffer 2");

        println!(
            "Acquired 2 buffers, {} currently in use",
            pool.stats().objects_in_use
        );
    }

    println!(
        "Buffers returned, {} currently in use",
        pool.stats().objects_in_use
    );

    let stats = pool.stats();
    println!(
        "Pool stats: total_gets={}, fast_return_hit={}, fast_return_miss={}",
        stats.total_gets, stats.fast_return_hit, stats.fast_return_miss
    );

    println!("\n=== Explicit release() ===\n");

    let buf = pool.acquire()?;
    match buf.release() {
        Ok(()) => println!("Released cleanly"),
        Err(e) => println!("Release failed: {e}"),
    }

    println!("\n=== Custom Configuration ===\n");

    let config = PoolConfigBuilder::new()
        .initial_capacity(8)
        .hard_limit(64)
        .verbose(false)
        .build()?;

    let sized_pool: Pool<Vec<u8>> = Pool::with_config(
        || Box::new(Vec::with_capacity(256)),
        |buf: &mut Vec<u8>| buf.clear(),
        config,
    )?;

    let held: Vec<_> = (0..20)
        .map(|_| sized_pool.acquire().unwrap())
        .collect();
    println!(
        "Grew L2 capacity to {} after checking out {} objects",
        sized_pool.capacity(),
        held.len()
    );
    drop(held);

    sized_pool.close()?;
    println!("Pool closed: {}", sized_pool.is_closed());

    Ok(())
}
