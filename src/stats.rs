// src/stats.rs
//! Statistics tracking for the pool: atomic hot counters plus a
//! mutex-guarded block for values that change less often and need
//! multi-field consistency.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Mutex-guarded counters that are read and written together, so a
/// snapshot never observes e.g. `current_capacity` from one shrink and
/// `last_shrink_time` from the next.
#[derive(Debug, Clone)]
struct ColdStats {
    peak_in_use: usize,
    total_shrink_events: u64,
    last_shrink_time: Option<Instant>,
    last_grow_time: Option<Instant>,
    current_capacity: usize,
    current_l1_capacity: usize,
}

/// Internal statistics store shared between the facade and the
/// controller.
pub(crate) struct PoolStatsInner {
    objects_in_use: AtomicUsize,
    total_gets: AtomicU64,
    total_growth_events: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    fast_return_hit: AtomicU64,
    fast_return_miss: AtomicU64,
    consecutive_shrinks: AtomicU32,
    last_get_time_nanos: AtomicU64,
    start: Instant,
    cold: Mutex<ColdStats>,
}

impl PoolStatsInner {
    pub(crate) fn new(initial_capacity: usize, initial_l1_capacity: usize) -> Self {
        Self {
            objects_in_use: AtomicUsize::new(0),
            total_gets: AtomicU64::new(0),
            total_growth_events: AtomicU64::new(0),
            l1_hits: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            fast_return_hit: AtomicU64::new(0),
            fast_return_miss: AtomicU64::new(0),
            consecutive_shrinks: AtomicU32::new(0),
            last_get_time_nanos: AtomicU64::new(0),
            start: Instant::now(),
            cold: Mutex::new(ColdStats {
                peak_in_use: 0,
                total_shrink_events: 0,
                last_shrink_time: None,
                last_grow_time: None,
                current_capacity: initial_capacity,
                current_l1_capacity: initial_l1_capacity,
            }),
        }
    }

    #[inline]
    fn now_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    pub(crate) fn record_get(&self) {
        self.total_gets.fetch_add(1, Ordering::Relaxed);
        self.last_get_time_nanos
            .store(self.now_nanos(), Ordering::Relaxed);
    }

    pub(crate) fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
        self.bump_in_use();
    }

    pub(crate) fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
        self.bump_in_use();
    }

    fn bump_in_use(&self) {
        let now = self.objects_in_use.fetch_add(1, Ordering::Relaxed) + 1;
        let mut cold = self.cold.lock().unwrap();
        if now > cold.peak_in_use {
            cold.peak_in_use = now;
        }
    }

    pub(crate) fn record_release(&self) {
        // Floor at 0: a release can never be observed before its matching
        // acquire under the pool's own call discipline, but saturating
        // avoids ever wrapping a usize on a logic bug instead of panicking
        // mid-release.
        let _ = self
            .objects_in_use
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub(crate) fn record_fast_return_hit(&self) {
        self.fast_return_hit.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fast_return_miss(&self) {
        self.fast_return_miss.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_growth(&self, new_capacity: usize) {
        self.total_growth_events.fetch_add(1, Ordering::Relaxed);
        let mut cold = self.cold.lock().unwrap();
        cold.current_capacity = new_capacity;
        cold.last_grow_time = Some(Instant::now());
    }

    pub(crate) fn record_l1_resize(&self, new_capacity: usize) {
        let mut cold = self.cold.lock().unwrap();
        cold.current_l1_capacity = new_capacity;
    }

    pub(crate) fn record_shrink(&self, new_capacity: usize) {
        let mut cold = self.cold.lock().unwrap();
        cold.total_shrink_events += 1;
        cold.current_capacity = new_capacity;
        cold.last_shrink_time = Some(Instant::now());
        self.consecutive_shrinks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn consecutive_shrinks(&self) -> u32 {
        self.consecutive_shrinks.load(Ordering::Relaxed)
    }

    pub(crate) fn decrement_consecutive_shrinks(&self) {
        let _ = self
            .consecutive_shrinks
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub(crate) fn objects_in_use(&self) -> usize {
        self.objects_in_use.load(Ordering::Relaxed)
    }

    pub(crate) fn total_gets(&self) -> u64 {
        self.total_gets.load(Ordering::Relaxed)
    }

    pub(crate) fn time_since_last_get(&self) -> Duration {
        let last = self.last_get_time_nanos.load(Ordering::Relaxed);
        if last == 0 {
            return Duration::from_secs(0);
        }
        let now = self.now_nanos();
        Duration::from_nanos(now.saturating_sub(last))
    }

    pub(crate) fn time_since_last_shrink(&self) -> Option<Duration> {
        self.cold
            .lock()
            .unwrap()
            .last_shrink_time
            .map(|t| t.elapsed())
    }

    pub(crate) fn current_capacity(&self) -> usize {
        self.cold.lock().unwrap().current_capacity
    }

    pub(crate) fn current_l1_capacity(&self) -> usize {
        self.cold.lock().unwrap().current_l1_capacity
    }

    /// Builds an external snapshot. `l1_len`/`l2_len` must be sampled by
    /// the caller (the facade) since the stats module has no view of
    /// either queue's contents.
    pub(crate) fn snapshot(&self, l1_len: usize, l2_len: usize) -> PoolStatsSnapshot {
        let cold = self.cold.lock().unwrap().clone();
        PoolStatsSnapshot {
            objects_in_use: self.objects_in_use(),
            total_gets: self.total_gets(),
            total_growth_events: self.total_growth_events.load(Ordering::Relaxed),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            fast_return_hit: self.fast_return_hit.load(Ordering::Relaxed),
            fast_return_miss: self.fast_return_miss.load(Ordering::Relaxed),
            peak_in_use: cold.peak_in_use,
            total_shrink_events: cold.total_shrink_events,
            consecutive_shrinks: self.consecutive_shrinks(),
            current_capacity: cold.current_capacity,
            current_l1_capacity: cold.current_l1_capacity,
            l1_len,
            l2_len,
        }
    }
}

/// An immutable point-in-time view of the pool's statistics.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatsSnapshot {
    /// Objects currently checked out by callers.
    pub objects_in_use: usize,
    /// Total successful `acquire()` calls since pool creation.
    pub total_gets: u64,
    /// Total L2 growth events.
    pub total_growth_events: u64,
    /// Acquires satisfied from L1.
    pub l1_hits: u64,
    /// Acquires satisfied from L2.
    pub l2_hits: u64,
    /// Releases that landed in L1.
    pub fast_return_hit: u64,
    /// Releases that had to fall back to L2.
    pub fast_return_miss: u64,
    /// Highest `objects_in_use` ever observed.
    pub peak_in_use: usize,
    /// Total L2 shrink events.
    pub total_shrink_events: u64,
    /// Shrinks since the last `acquire()`.
    pub consecutive_shrinks: u32,
    /// Current L2 capacity.
    pub current_capacity: usize,
    /// Current L1 capacity.
    pub current_l1_capacity: usize,
    /// L1 occupancy at snapshot time.
    pub l1_len: usize,
    /// L2 occupancy at snapshot time.
    pub l2_len: usize,
}

impl PoolStatsSnapshot {
    /// Fraction of acquires satisfied by L1 (0.0-100.0).
    pub fn l1_hit_rate(&self) -> f64 {
        if self.total_gets == 0 {
            return 0.0;
        }
        (self.l1_hits as f64 / self.total_gets as f64) * 100.0
    }

    /// Fraction of releases that landed in L1 rather than L2 (0.0-100.0).
    pub fn fast_return_hit_rate(&self) -> f64 {
        let total = self.fast_return_hit + self.fast_return_miss;
        if total == 0 {
            return 0.0;
        }
        (self.fast_return_hit as f64 / total as f64) * 100.0
    }

    /// `in_use / (in_use + L1.len + L2.len)`, the quantity the shrink
    /// controller compares against `min_util_before_shrink`.
    pub fn utilization(&self) -> f64 {
        let total = self.objects_in_use + self.l1_len + self.l2_len;
        if total == 0 {
            return 0.0;
        }
        self.objects_in_use as f64 / total as f64
    }

    /// `total_gets == fast_return_hit + fast_return_miss + objects_in_use`:
    /// every object ever handed out is either back in a tier or still
    /// checked out. Exposed here so tests and callers can check it
    /// directly.
    pub fn accounting_balanced(&self) -> bool {
        self.total_gets == self.fast_return_hit + self.fast_return_miss + self.objects_in_use as u64
    }
}
