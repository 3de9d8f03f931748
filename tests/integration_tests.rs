// tests/integration_tests.rs
//! Integration tests for the pool.

use adapool::config::{AggressivenessLevel, PoolConfigBuilder, ShrinkConfig};
use adapool::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_acquire_release_cycle_preserves_accounting() {
    let pool: Pool<Vec<u8>> = Pool::new(
        || Box::new(Vec::with_capacity(256)),
        |buf: &mut Vec<u8>| buf.clear(),
    )
    .unwrap();

    for round in 0..20u8 {
        let mut buf = pool.acquire().unwrap();
        buf.extend_from_slice(&[round; 16]);
        assert_eq!(buf.len(), 16);
        drop(buf);
    }

    let stats = pool.stats();
    assert_eq!(stats.total_gets, 20);
    assert_eq!(stats.objects_in_use, 0);
    assert!(stats.accounting_balanced());
}

#[test]
fn test_pool_concurrency_under_fixed_hard_limit() {
    let config = PoolConfigBuilder::new()
        .initial_capacity(8)
        .hard_limit(32)
        .build()
        .unwrap();
    let pool = Arc::new(
        Pool::with_config(
            || Box::new(Vec::<u32>::with_capacity(4)),
            |buf: &mut Vec<u32>| buf.clear(),
            config,
        )
        .unwrap(),
    );

    let mut handles = vec![];
    for i in 0..16u32 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for j in 0..64u32 {
                let mut buf = pool.acquire().unwrap();
                buf.push(i * 64 + j);
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.total_gets, 16 * 64);
    assert_eq!(stats.objects_in_use, 0);
    assert!(stats.accounting_balanced());
    assert!(stats.current_capacity <= 32);
}

#[test]
fn test_growth_then_shrink_under_extreme_aggressiveness() {
    let config = PoolConfigBuilder::new()
        .initial_capacity(2)
        .hard_limit(64)
        .min_capacity(2)
        .aggressiveness(AggressivenessLevel::Extreme)
        .build()
        .unwrap();
    let pool = Pool::with_config(|| Box::new(0u32), |_v: &mut u32| {}, config).unwrap();

    // Push well past initial capacity to force at least one growth event.
    let held: Vec<_> = (0..20).map(|_| pool.acquire().unwrap()).collect();
    let grown_capacity = pool.capacity();
    assert!(grown_capacity > 2);
    drop(held);

    // Extreme aggressiveness checks every 500ms with a 1s cooldown; give
    // the controller a few rounds to notice the pool went idle.
    thread::sleep(Duration::from_millis(4500));

    let stats = pool.stats();
    assert!(stats.total_shrink_events >= 1);
    assert!(pool.capacity() < grown_capacity);
}

#[test]
fn test_non_blocking_pool_rejects_at_hard_limit() {
    let config = PoolConfigBuilder::new()
        .initial_capacity(2)
        .hard_limit(2)
        .blocking(false)
        .build()
        .unwrap();
    let pool = Pool::with_config(|| Box::new(0u32), |_v: &mut u32| {}, config).unwrap();

    let _a = pool.acquire().unwrap();
    let _b = pool.acquire().unwrap();
    let err = pool.acquire().unwrap_err();
    assert_eq!(err, PoolError::HardLimitReached);
}

#[test]
fn test_blocking_acquire_wakes_on_release() {
    let config = PoolConfigBuilder::new()
        .initial_capacity(1)
        .hard_limit(1)
        .build()
        .unwrap();
    let pool = Arc::new(Pool::with_config(|| Box::new(0u32), |_v: &mut u32| {}, config).unwrap());

    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire().unwrap())
    };

    thread::sleep(Duration::from_millis(100));
    drop(held);

    let _second = waiter.join().unwrap();
    let stats = pool.stats();
    assert_eq!(stats.objects_in_use, 1);
}

#[test]
fn test_close_drains_and_rejects_further_use() {
    let pool: Pool<u32> = Pool::new(|| Box::new(0), |_v: &mut u32| {}).unwrap();
    let obj = pool.acquire().unwrap();
    obj.release().unwrap();

    pool.close().unwrap();
    assert!(pool.is_closed());
    assert_eq!(pool.acquire().unwrap_err(), PoolError::Closed);
    assert_eq!(pool.close().unwrap_err(), PoolError::AlreadyClosed);
}

#[test]
fn test_cleaner_panic_does_not_poison_pool() {
    let pool: Pool<u32> = Pool::new(
        || Box::new(0u32),
        |v: &mut u32| {
            if *v == 1 {
                panic!("cleaner boom");
            }
        },
    )
    .unwrap();

    let mut obj = pool.acquire().unwrap();
    *obj = 1;
    let err = obj.release().unwrap_err();
    assert!(matches!(err, PoolError::CleanerPanicked(_)));

    // The pool itself must still be usable afterward.
    let obj2 = pool.acquire().unwrap();
    drop(obj2);
}

#[test]
fn test_release_routes_to_blocked_readers_directly() {
    let config = PoolConfigBuilder::new()
        .initial_capacity(1)
        .hard_limit(1)
        .build()
        .unwrap();
    let pool = Arc::new(Pool::with_config(|| Box::new(0u32), |_v: &mut u32| {}, config).unwrap());

    let held = pool.acquire().unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire().unwrap())
        })
        .collect();

    thread::sleep(Duration::from_millis(150));
    assert_eq!(pool.blocked_readers(), 4);

    // With hard_limit == 1, only one object can ever be checked out at a
    // time, so the waiters must resolve one at a time as each prior
    // holder releases. If release still preferred L1 while readers were
    // parked on L2, these joins would hang until the read timeout.
    drop(held);
    for waiter in waiters {
        let obj = waiter.join().unwrap();
        drop(obj);
    }

    let stats = pool.stats();
    assert_eq!(stats.objects_in_use, 0);
    assert!(stats.accounting_balanced());
}

#[test]
fn test_shrink_controller_parks_then_resumes_on_acquire() {
    let shrink = ShrinkConfig {
        aggressiveness_level: AggressivenessLevel::Extreme,
        check_interval: Duration::from_millis(30),
        idle_threshold: Duration::from_millis(30),
        min_idle_before_shrink: 1,
        shrink_cooldown: Duration::from_millis(10),
        min_util_before_shrink: 1.0,
        stable_underutil_rounds: 1,
        shrink_percent: 0.1,
        max_consecutive_shrinks: 2,
        min_capacity: 10,
    };
    let config = PoolConfigBuilder::new()
        .initial_capacity(1024)
        .hard_limit(2048)
        .shrink(shrink)
        .build()
        .unwrap();
    let pool = Pool::with_config(|| Box::new(0u32), |_v: &mut u32| {}, config).unwrap();

    // A real acquire/release establishes `last_get_time` so the
    // controller's idle check has a non-zero baseline to compare against.
    drop(pool.acquire().unwrap());

    // Give the controller enough ticks to exhaust its two-shrink budget
    // and park.
    thread::sleep(Duration::from_millis(400));
    let parked_capacity = pool.capacity();
    assert!(parked_capacity < 1024);
    assert_eq!(pool.stats().consecutive_shrinks, 2);

    // Parked: capacity and the shrink counter stay put no matter how long
    // we wait.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(pool.stats().consecutive_shrinks, 2);
    assert_eq!(pool.capacity(), parked_capacity);

    // The next acquire clears the park and decrements the counter,
    // letting the controller shrink again.
    drop(pool.acquire().unwrap());
    thread::sleep(Duration::from_millis(400));
    assert!(pool.stats().total_shrink_events >= 3);
}
