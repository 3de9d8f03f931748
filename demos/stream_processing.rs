// demos/stream_processing.rs
//! Demonstrates backpressure: a slow consumer, a fast producer, and a
//! pool whose hard limit caps how far the producer can get ahead.

use adapool::config::PoolConfigBuilder;
use adapool::prelude::*;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// A unit of work moving through the pipeline. Boxed so the allocator
/// can hand back a stable heap address for reuse.
struct WorkItem {
    payload: Vec<u8>,
    sequence: u64,
}

fn main() -> Result<()> {
    println!("=== Stream Processing With Backpressure ===\n");

    let config = PoolConfigBuilder::new()
        .initial_capacity(4)
        .hard_limit(8)
        .blocking(true)
        .build()?;

    let pool: Pool<WorkItem> = Pool::with_config(
        || {
            Box::new(WorkItem {
                payload: vec![0u8; 256],
                sequence: 0,
            })
        },
        |item: &mut WorkItem| item.sequence = 0,
        config,
    )?;

    let (tx, rx) = mpsc::channel::<u64>();
    let total_items = 40u64;
    let start = Instant::now();

    let producer_pool = pool.clone();
    let producer = thread::spawn(move || {
        for seq in 0..total_items {
            // Blocks once 8 items are checked out at once, since the
            // pool's hard limit is smaller than the full work queue.
            let mut item = producer_pool.acquire().expect("acquire failed");
            item.sequence = seq;
            item.payload.iter_mut().for_each(|b| *b = (seq % 256) as u8);
            tx.send(seq).expect("consumer gone");
            // item drops here, returning to the pool for reuse.
        }
    });

    let mut received = Vec::with_capacity(total_items as usize);
    for seq in rx {
        // Simulate slow downstream processing.
        thread::sleep(Duration::from_millis(5));
        received.push(seq);
        if seq % 10 == 0 {
            println!(
                "Consumed item {} ({} in use, {} capacity)",
                seq,
                pool.stats().objects_in_use,
                pool.capacity()
            );
        }
    }

    producer.join().expect("producer panicked");

    println!(
        "\nProcessed {} items in {:?}, in sequence order: {}",
        received.len(),
        start.elapsed(),
        received.windows(2).all(|w| w[0] < w[1])
    );

    let stats = pool.stats();
    println!("\nFinal pool statistics:");
    println!("  total_gets:       {}", stats.total_gets);
    println!("  current_capacity: {}", stats.current_capacity);
    println!("  objects_in_use:   {}", stats.objects_in_use);
    assert!(stats.accounting_balanced());

    Ok(())
}
