// demos/network_simulation.rs
//! Simulates a connection pool under concurrent request load.

use adapool::config::{AggressivenessLevel, PoolConfigBuilder};
use adapool::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Stands in for a TCP connection: cheap to allocate, worth reusing.
struct Connection {
    id: u32,
    requests_served: u32,
}

fn main() -> Result<()> {
    println!("=== Connection Pool Simulation ===\n");

    let next_id = Arc::new(AtomicU32::new(0));
    let alloc_id = Arc::clone(&next_id);

    let config = PoolConfigBuilder::new()
        .initial_capacity(16)
        .hard_limit(256)
        .aggressiveness(AggressivenessLevel::Moderate)
        .build()?;

    let pool = Arc::new(Pool::with_config(
        move || {
            Box::new(Connection {
                id: alloc_id.fetch_add(1, Ordering::Relaxed),
                requests_served: 0,
            })
        },
        |conn: &mut Connection| conn.requests_served = 0,
        config,
    )?);

    let num_workers = 32;
    let requests_per_worker = 500;
    let start = Instant::now();

    let handles: Vec<_> = (0..num_workers)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..requests_per_worker {
                    let mut conn = pool.acquire().expect("acquire failed");
                    conn.requests_served += 1;
                    // Hold the connection just long enough to look like work.
                    thread::yield_now();
                    let _ = worker;
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("worker panicked");
    }

    let elapsed = start.elapsed();
    let total_requests = num_workers * requests_per_worker;
    println!(
        "Served {} requests across {} workers in {:?}",
        total_requests, num_workers, elapsed
    );
    println!(
        "Connections minted: {}",
        next_id.load(Ordering::Relaxed)
    );

    let stats = pool.stats();
    println!("\nPool statistics:");
    println!("  total_gets:        {}", stats.total_gets);
    println!("  fast_return_hit:   {}", stats.fast_return_hit);
    println!("  fast_return_miss:  {}", stats.fast_return_miss);
    println!("  objects_in_use:    {}", stats.objects_in_use);
    println!("  current_capacity:  {}", stats.current_capacity);
    println!("  total_growth_events: {}", stats.total_growth_events);
    println!("  utilization:       {:.1}%", stats.utilization() * 100.0);
    assert!(stats.accounting_balanced());

    println!("\n=== Waiting for the Controller to Shrink Idle Capacity ===\n");
    let grown_capacity = pool.capacity();
    thread::sleep(std::time::Duration::from_secs(3));
    println!(
        "Capacity went from {} to {} once the workers went idle",
        grown_capacity,
        pool.capacity()
    );

    pool.close()?;
    println!("Pool closed.");

    Ok(())
}
