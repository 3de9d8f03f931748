// src/controller.rs
//! Background capacity controller: the thread that periodically votes
//! on whether L2 (and, downstream of that, L1) should shrink.
//!
//! Growth is reactive and happens inline on the acquire path in
//! `pool.rs`, since it has to happen before the caller's `acquire()`
//! returns. Shrink is proactive and happens here, off the hot path, on
//! a fixed interval, so a quiet pool gives memory back without any
//! caller having to ask for it.
//!
//! Built from the same `std::sync` primitives the rest of the crate
//! leans on: a `Condvar`-gated wait loop, the same shape as
//! `RingBuffer`'s own wait loops.
//!
//! When `consecutive_shrinks` hits `max_consecutive_shrinks`, the loop
//! parks on its wake condvar instead of spinning on the timer forever;
//! the next `Acquire` clears the flag, wakes it, and decrements the
//! counter (see `unblock_shrink` and `pool::Pool::acquire`).

use crate::config::{RingBufferConfig, ShrinkConfig, compute_growth};
use crate::fast_path::FastPath;
use crate::ring_buffer::RingBuffer;
use crate::stats::PoolStatsInner;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};

/// Installs a pre-read block hook on `rb` that tries to pull one item
/// out of `l1` and push it into `rb` before a reader parks. Shared
/// between `pool.rs` (initial construction) and this module (every
/// buffer swap needs its own hook re-installed, since the hook is
/// tied to one `RingBuffer` instance).
pub(crate) fn install_recycle_hook<T: Send + 'static>(rb: &Arc<RingBuffer<T>>, l1: &Arc<FastPath<T>>) {
    use crate::ring_buffer::PreReadBlockOutcome;
    let rb_weak = Arc::downgrade(rb);
    let l1 = Arc::clone(l1);
    rb.install_pre_read_block_hook(move || {
        let Some(rb) = rb_weak.upgrade() else {
            return PreReadBlockOutcome::GiveUp;
        };
        match l1.try_pop() {
            Some(item) => {
                if rb.write(item).is_ok() {
                    PreReadBlockOutcome::TryAgain
                } else {
                    PreReadBlockOutcome::GiveUp
                }
            }
            None => PreReadBlockOutcome::GiveUp,
        }
    });
}

/// Clears `shrink_blocked` and wakes the parked controller, if one is
/// parked. A no-op if the controller isn't currently blocked. Called
/// from the facade's acquire path.
pub(crate) fn unblock_shrink(shrink_blocked: &AtomicBool, wake_lock: &Mutex<()>, wake: &Condvar) {
    if shrink_blocked.swap(false, Ordering::SeqCst) {
        let _guard = wake_lock.lock().unwrap();
        drop(_guard);
        wake.notify_all();
    }
}

/// Owns the background shrink thread for one pool instance.
pub(crate) struct CapacityController {
    stop: Arc<AtomicBool>,
    wake_lock: Arc<Mutex<()>>,
    wake: Arc<Condvar>,
    handle: Option<JoinHandle<()>>,
}

impl CapacityController {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn<T: Send + 'static>(
        shrink: ShrinkConfig,
        fast_path_shrink: ShrinkConfig,
        fast_path_growth_trigger: u32,
        fast_path_shrink_trigger: u32,
        ring_buffer_config: RingBufferConfig,
        stats: Arc<PoolStatsInner>,
        l2: Arc<RwLock<Arc<RingBuffer<T>>>>,
        l1: Arc<FastPath<T>>,
        hard_limit: usize,
        verbose: bool,
        shrink_blocked: Arc<AtomicBool>,
        wake_lock: Arc<Mutex<()>>,
        wake: Arc<Condvar>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = Arc::clone(&stop);
            let wake_lock = Arc::clone(&wake_lock);
            let wake = Arc::clone(&wake);
            thread::Builder::new()
                .name("adapool-capacity-controller".into())
                .spawn(move || {
                    run_loop(
                        shrink,
                        fast_path_shrink,
                        fast_path_growth_trigger,
                        fast_path_shrink_trigger,
                        ring_buffer_config,
                        stats,
                        l2,
                        l1,
                        hard_limit,
                        verbose,
                        stop,
                        wake_lock,
                        wake,
                        shrink_blocked,
                    )
                })
                .expect("failed to spawn capacity controller thread")
        };

        Self {
            stop,
            wake_lock,
            wake,
            handle: Some(handle),
        }
    }

    /// Signals the controller thread to exit and waits for it to finish.
    /// Idempotent; safe to call from `Drop`.
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _guard = self.wake_lock.lock().unwrap();
        drop(_guard);
        self.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CapacityController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_loop<T: Send + 'static>(
    shrink: ShrinkConfig,
    fast_path_shrink: ShrinkConfig,
    fast_path_growth_trigger: u32,
    fast_path_shrink_trigger: u32,
    ring_buffer_config: RingBufferConfig,
    stats: Arc<PoolStatsInner>,
    l2: Arc<RwLock<Arc<RingBuffer<T>>>>,
    l1: Arc<FastPath<T>>,
    hard_limit: usize,
    verbose: bool,
    stop: Arc<AtomicBool>,
    wake_lock: Arc<Mutex<()>>,
    wake: Arc<Condvar>,
    shrink_blocked: Arc<AtomicBool>,
) {
    let mut idle_rounds: u32 = 0;
    let mut underutil_rounds: u32 = 0;
    let mut last_growth_events_seen: u64 = 0;
    let mut last_shrink_events_seen: u64 = 0;
    let fast_path_growth_cfg = crate::config::GrowthConfig::default();

    loop {
        {
            let guard = wake_lock.lock().unwrap();
            let _ = wake.wait_timeout(guard, shrink.check_interval).unwrap();
        }
        if stop.load(Ordering::SeqCst) {
            return;
        }

        let current_l2 = { Arc::clone(&*l2.read().unwrap()) };
        let l1_len = l1.len();
        let l2_len = current_l2.length();
        let snapshot = stats.snapshot(l1_len, l2_len);

        sync_fast_path(
            &snapshot,
            &mut last_growth_events_seen,
            &mut last_shrink_events_seen,
            fast_path_growth_trigger,
            fast_path_shrink_trigger,
            &fast_path_shrink,
            &fast_path_growth_cfg,
            &l1,
            &current_l2,
            hard_limit,
            &stats,
            verbose,
        );

        if shrink.aggressiveness_level.level() == 0 {
            continue;
        }

        let idle = stats.time_since_last_get() >= shrink.idle_threshold;
        idle_rounds = if idle { idle_rounds + 1 } else { 0 };

        let underutilized = snapshot.utilization() <= shrink.min_util_before_shrink;
        underutil_rounds = if underutilized { underutil_rounds + 1 } else { 0 };

        if idle_rounds < shrink.min_idle_before_shrink || underutil_rounds < shrink.stable_underutil_rounds {
            continue;
        }

        if let Some(since) = stats.time_since_last_shrink() {
            if since < shrink.shrink_cooldown {
                continue;
            }
        }

        if stats.consecutive_shrinks() >= shrink.max_consecutive_shrinks {
            shrink_blocked.store(true, Ordering::SeqCst);
            if verbose {
                log::debug!("capacity controller: parking, max_consecutive_shrinks reached");
            }
            {
                let guard = wake_lock.lock().unwrap();
                drop(
                    wake.wait_while(guard, |_| {
                        shrink_blocked.load(Ordering::SeqCst) && !stop.load(Ordering::SeqCst)
                    })
                    .unwrap(),
                );
            }
            continue;
        }

        let current_cap = current_l2.capacity();
        let target_cap = (((current_cap as f64) * (1.0 - shrink.shrink_percent)).floor() as usize)
            .max(shrink.min_capacity);

        if target_cap >= current_cap {
            continue;
        }
        if l2_len > target_cap {
            // Shrink is blocked by live occupancy: the idle objects
            // currently sitting in L2 wouldn't fit in the smaller buffer.
            // Per policy, skip this tick rather than forcing a partial
            // shrink or evicting objects, and re-evaluate on the next one.
            if verbose {
                log::debug!(
                    "capacity controller: shrink blocked, l2_len={} exceeds target_cap={}",
                    l2_len,
                    target_cap
                );
            }
            continue;
        }

        let drained = current_l2.drain_up_to(l2_len);
        let new_l2 = Arc::new(RingBuffer::new(
            target_cap,
            ring_buffer_config.block,
            ring_buffer_config.read_timeout,
            ring_buffer_config.write_timeout,
        ));
        install_recycle_hook(&new_l2, &l1);
        let (written, write_err) = new_l2.write_many(drained);
        if write_err.is_some() && verbose {
            log::warn!(
                "capacity controller: only {}/{} items carried over during L2 shrink",
                written,
                l2_len
            );
        }

        current_l2.close();
        {
            let mut g = l2.write().unwrap();
            *g = new_l2;
        }
        stats.record_shrink(target_cap);
        idle_rounds = 0;
        underutil_rounds = 0;

        if verbose {
            log::debug!(
                "capacity controller: shrank L2 {} -> {}",
                current_cap,
                target_cap
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn sync_fast_path<T: Send + 'static>(
    snapshot: &crate::stats::PoolStatsSnapshot,
    last_growth_events_seen: &mut u64,
    last_shrink_events_seen: &mut u64,
    growth_trigger: u32,
    shrink_trigger: u32,
    fast_path_shrink: &ShrinkConfig,
    fast_path_growth: &crate::config::GrowthConfig,
    l1: &Arc<FastPath<T>>,
    l2: &Arc<RingBuffer<T>>,
    hard_limit: usize,
    stats: &Arc<PoolStatsInner>,
    verbose: bool,
) {
    let growth_delta = snapshot.total_growth_events.saturating_sub(*last_growth_events_seen);
    if growth_delta >= growth_trigger as u64 {
        *last_growth_events_seen = snapshot.total_growth_events;
        let current = l1.capacity();
        let target = compute_growth(current, current.max(1), fast_path_growth, hard_limit);
        if target > current {
            l1.resize(target);
            stats.record_l1_resize(target);
            if verbose {
                log::debug!("capacity controller: grew L1 {} -> {}", current, target);
            }
        }
    }

    let shrink_delta = snapshot.total_shrink_events.saturating_sub(*last_shrink_events_seen);
    if shrink_delta >= shrink_trigger as u64 {
        *last_shrink_events_seen = snapshot.total_shrink_events;
        let current = l1.capacity();
        let target = (((current as f64) * (1.0 - fast_path_shrink.shrink_percent)).floor() as usize)
            .max(fast_path_shrink.min_capacity);
        if target < current {
            let overflow = l1.resize(target);
            stats.record_l1_resize(target);
            if !overflow.is_empty() {
                let (_written, err) = l2.write_many(overflow);
                if err.is_some() && verbose {
                    log::warn!("capacity controller: dropped overflow while shrinking L1");
                }
            }
            if verbose {
                log::debug!("capacity controller: shrank L1 {} -> {}", current, target);
            }
        }
    }
}
