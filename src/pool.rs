// src/pool.rs
//! The pool facade: ties the fast path, the ring buffer, and the
//! capacity controller together behind a single `acquire`/`release`
//! surface, and the RAII guard callers actually hold.
//!
//! `acquire` always tries L1 first and falls back to L2; `release`
//! routes to whichever tier actually needs the object back (see
//! `PoolInner::release_object`).

use crate::allocator::{Allocator, Cleaner, invoke_allocator, invoke_cleaner};
use crate::config::{PoolConfig, PoolConfigBuilder, compute_growth};
use crate::controller::{CapacityController, install_recycle_hook, unblock_shrink};
use crate::error::{PoolError, Result, RingBufferError};
use crate::fast_path::FastPath;
use crate::ring_buffer::RingBuffer;
use crate::stats::{PoolStatsInner, PoolStatsSnapshot};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Instant;

struct PoolInner<T> {
    allocator: Box<dyn Fn() -> Box<T> + Send + Sync>,
    cleaner: Box<dyn Fn(&mut T) + Send + Sync>,
    l1: Arc<FastPath<Box<T>>>,
    l2: Arc<RwLock<Arc<RingBuffer<Box<T>>>>>,
    stats: Arc<PoolStatsInner>,
    config: PoolConfig,
    closed: AtomicBool,
    controller: Mutex<Option<CapacityController>>,
    shrink_blocked: Arc<AtomicBool>,
    controller_wake_lock: Arc<Mutex<()>>,
    controller_wake: Arc<Condvar>,
}

impl<T: Send + 'static> PoolInner<T> {
    fn current_l2(&self) -> Arc<RingBuffer<Box<T>>> {
        Arc::clone(&self.l2.read().unwrap())
    }

    fn release_object(&self, mut object: Box<T>) -> Result<()> {
        let cleaner_result = invoke_cleaner(&*self.cleaner, &mut object);
        self.stats.record_release();
        cleaner_result?;

        let l2 = self.current_l2();

        // A reader already parked in `L2::get_one` only wakes on a write
        // to L2 itself; routing straight there lets this release serve it
        // instead of landing in L1 where nothing would notice it.
        if l2.blocked_readers() > 0 {
            self.stats.record_fast_return_miss();
            return match l2.write(object) {
                Ok(()) => Ok(()),
                // The buffer was replaced mid-flight (resize or close);
                // the object has nowhere to go this round and is
                // dropped rather than chased across the swap.
                Err(RingBufferError::Closed) => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        match self.l1.try_push(object) {
            Ok(()) => {
                self.stats.record_fast_return_hit();
                Ok(())
            }
            Err(object) => {
                self.stats.record_fast_return_miss();
                match l2.write(object) {
                    Ok(()) => Ok(()),
                    Err(RingBufferError::Closed) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Tops L1 back up from L2 once its occupancy drops to or below
    /// `refill_percent`, growing (and allocating into) L2 first if it
    /// doesn't have enough idle items on hand to reach the fill target.
    fn refill_l1(&self) -> Result<()> {
        let l1_cap = self.l1.capacity();
        if l1_cap == 0 {
            return Ok(());
        }
        let l1_len = self.l1.len();
        let occupancy_pct = l1_len as f64 / l1_cap as f64;
        if occupancy_pct > self.config.fast_path.refill_percent {
            return Ok(());
        }

        let fill_target = ((l1_cap as f64) * self.config.fast_path.fill_aggressiveness).floor() as usize;
        if fill_target <= l1_len {
            return Ok(());
        }
        let mut need = fill_target - l1_len;

        let l2 = self.current_l2();
        let moved = l2.drain_up_to(need.min(l2.length()));
        need -= moved.len();
        for item in moved {
            if let Err(item) = self.l1.try_push(item) {
                // L1 filled up from elsewhere while we were moving items;
                // put this one back rather than drop it.
                let _ = l2.write(item);
            }
        }

        for _ in 0..need {
            match self.try_allocate_new()? {
                Some(obj) => {
                    if self.l1.try_push(obj).is_err() {
                        break;
                    }
                }
                None => break,
            }
        }

        Ok(())
    }

    /// Checks the hard limit and, if the pool needs to grow L2 to make
    /// room for one more outstanding object, performs the grow. The
    /// check, the grow, and the caller's subsequent allocation all
    /// happen under the same L2 write lock so two racing callers can
    /// never both observe room under `hard_limit` and push the total
    /// over it: `in_use + L1.len + L2.len` never exceeds `hard_limit`.
    fn try_allocate_new(&self) -> Result<Option<Box<T>>> {
        let mut l2_guard = self.l2.write().unwrap();
        let current = Arc::clone(&l2_guard);
        let in_use = self.stats.objects_in_use();
        let total = in_use + self.l1.len() + current.length();
        if total >= self.config.basic.hard_limit {
            return Ok(None);
        }

        if in_use + 1 > current.capacity() {
            let new_cap = compute_growth(
                current.capacity(),
                self.config.basic.initial_capacity,
                &self.config.growth,
                self.config.basic.hard_limit,
            );
            if new_cap > current.capacity() {
                let drained = current.drain_up_to(current.length());
                let new_l2 = Arc::new(
                    RingBuffer::new(
                        new_cap,
                        self.config.ring_buffer.block,
                        self.config.ring_buffer.read_timeout,
                        self.config.ring_buffer.write_timeout,
                    )
                    .with_hook_attempts(self.config.fast_path.pre_read_block_hook_attempts),
                );
                install_recycle_hook(&new_l2, &self.l1);
                let (_written, _err) = new_l2.write_many(drained);
                current.close();
                *l2_guard = new_l2;
                self.stats.record_growth(new_cap);
            }
        }
        drop(l2_guard);

        Ok(Some(invoke_allocator(&*self.allocator)?))
    }
}

/// A generic, adaptive object pool.
///
/// Cheap to clone: every clone shares the same underlying fast path,
/// ring buffer, and capacity controller via `Arc`.
pub struct Pool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Pool<T> {
    /// Builds a pool with the default configuration.
    pub fn new<A, C>(allocator: A, cleaner: C) -> Result<Self>
    where
        A: Allocator<T> + 'static,
        C: Cleaner<T> + 'static,
    {
        Self::with_config(allocator, cleaner, PoolConfig::default())
    }

    /// Builds a pool with an explicit configuration (re-validated here,
    /// so a hand-assembled `PoolConfig` is as safe as one that went
    /// through [`PoolConfigBuilder`] already).
    pub fn with_config<A, C>(allocator: A, cleaner: C, config: PoolConfig) -> Result<Self>
    where
        A: Allocator<T> + 'static,
        C: Cleaner<T> + 'static,
    {
        let config = PoolConfigBuilder::from_config(config).build()?;
        let allocator: Box<dyn Fn() -> Box<T> + Send + Sync> = Box::new(allocator);
        let cleaner: Box<dyn Fn(&mut T) + Send + Sync> = Box::new(cleaner);

        let l1 = Arc::new(FastPath::new(config.fast_path.initial_size));
        let initial_l2 = Arc::new(
            RingBuffer::new(
                config.basic.initial_capacity,
                config.ring_buffer.block,
                config.ring_buffer.read_timeout,
                config.ring_buffer.write_timeout,
            )
            .with_hook_attempts(config.fast_path.pre_read_block_hook_attempts),
        );
        install_recycle_hook(&initial_l2, &l1);

        // Eagerly populate: fill L1 up to `initial_size * fill_aggressiveness`
        // (capped by `initial_capacity`), and put the remainder of
        // `initial_capacity` into L2, so the pool starts with real objects
        // on hand rather than empty shells.
        let l1_fill = (((config.fast_path.initial_size as f64) * config.fast_path.fill_aggressiveness)
            .floor() as usize)
            .min(config.basic.initial_capacity);
        for _ in 0..l1_fill {
            let obj = invoke_allocator(&*allocator)?;
            if l1.try_push(obj).is_err() {
                break;
            }
        }
        let l2_fill = config.basic.initial_capacity.saturating_sub(l1_fill);
        for _ in 0..l2_fill {
            let obj = invoke_allocator(&*allocator)?;
            initial_l2.write(obj)?;
        }

        let stats = Arc::new(PoolStatsInner::new(
            config.basic.initial_capacity,
            config.fast_path.initial_size,
        ));

        let l2 = Arc::new(RwLock::new(initial_l2));

        let shrink_blocked = Arc::new(AtomicBool::new(false));
        let controller_wake_lock = Arc::new(Mutex::new(()));
        let controller_wake = Arc::new(Condvar::new());

        let controller = CapacityController::spawn(
            config.shrink,
            config.fast_path.shrink,
            config.fast_path.growth_events_trigger,
            config.fast_path.shrink_events_trigger,
            config.ring_buffer,
            Arc::clone(&stats),
            Arc::clone(&l2),
            Arc::clone(&l1),
            config.basic.hard_limit,
            config.basic.verbose,
            Arc::clone(&shrink_blocked),
            Arc::clone(&controller_wake_lock),
            Arc::clone(&controller_wake),
        );

        let inner = Arc::new(PoolInner {
            allocator,
            cleaner,
            l1,
            l2,
            stats,
            config,
            closed: AtomicBool::new(false),
            controller: Mutex::new(Some(controller)),
            shrink_blocked,
            controller_wake_lock,
            controller_wake,
        });

        Ok(Self { inner })
    }

    /// Checks out an object, blocking if none is immediately available
    /// and the pool is already at `hard_limit` (per the configured L2
    /// blocking mode and timeout). Tries L1 first, then L2, allocating a
    /// fresh object (growing L2 first if needed) before ever blocking.
    pub fn acquire(&self) -> Result<PooledObject<T>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        self.unblock_shrink_if_parked();
        self.inner.stats.record_get();

        if let Some(obj) = self.inner.l1.try_pop() {
            self.inner.stats.record_l1_hit();
            return Ok(PooledObject::new(self, obj));
        }

        self.inner.refill_l1()?;
        if let Some(obj) = self.inner.l1.try_pop() {
            self.inner.stats.record_l1_hit();
            return Ok(PooledObject::new(self, obj));
        }

        self.acquire_slow()
    }

    /// Like [`acquire`](Self::acquire), but never blocks: if nothing is
    /// immediately available and the pool is at `hard_limit`, returns
    /// [`PoolError::HardLimitReached`] instead of waiting.
    pub fn try_acquire(&self) -> Result<PooledObject<T>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        self.unblock_shrink_if_parked();
        self.inner.stats.record_get();

        if let Some(obj) = self.inner.l1.try_pop() {
            self.inner.stats.record_l1_hit();
            return Ok(PooledObject::new(self, obj));
        }
        self.inner.refill_l1()?;
        if let Some(obj) = self.inner.l1.try_pop() {
            self.inner.stats.record_l1_hit();
            return Ok(PooledObject::new(self, obj));
        }
        if let Some(obj) = self.inner.current_l2().try_get_one() {
            self.inner.stats.record_l2_hit();
            return Ok(PooledObject::new(self, obj));
        }
        match self.inner.try_allocate_new()? {
            Some(obj) => {
                self.inner.stats.record_l2_hit();
                Ok(PooledObject::new(self, obj))
            }
            None => Err(PoolError::HardLimitReached),
        }
    }

    /// If the capacity controller is parked waiting on `consecutive_shrinks`
    /// to drop, clears the flag, wakes it, and decrements the counter.
    /// Called unconditionally at the top of every acquire.
    fn unblock_shrink_if_parked(&self) {
        if self.inner.shrink_blocked.load(Ordering::SeqCst) {
            unblock_shrink(
                &self.inner.shrink_blocked,
                &self.inner.controller_wake_lock,
                &self.inner.controller_wake,
            );
            self.inner.stats.decrement_consecutive_shrinks();
        }
    }

    fn acquire_slow(&self) -> Result<PooledObject<T>> {
        loop {
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(PoolError::Closed);
            }

            let l2 = self.inner.current_l2();
            if let Some(obj) = l2.try_get_one() {
                self.inner.stats.record_l2_hit();
                return Ok(PooledObject::new(self, obj));
            }

            if let Some(obj) = self.inner.try_allocate_new()? {
                self.inner.stats.record_l2_hit();
                return Ok(PooledObject::new(self, obj));
            }

            // At hard_limit with nothing idle: wait for a release, per L2's
            // configured blocking mode and timeout.
            match l2.get_one() {
                Ok(obj) => {
                    self.inner.stats.record_l2_hit();
                    return Ok(PooledObject::new(self, obj));
                }
                // `l2` was swapped out from under us (grown/shrunk, or the
                // pool is closing); loop back around to re-check against
                // the current buffer and the pool's closed flag.
                Err(RingBufferError::Closed) => continue,
                Err(RingBufferError::Empty) => return Err(PoolError::HardLimitReached),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// A point-in-time statistics snapshot.
    pub fn stats(&self) -> PoolStatsSnapshot {
        let l2 = self.inner.current_l2();
        self.inner.stats.snapshot(self.inner.l1.len(), l2.length())
    }

    /// Current L2 capacity.
    pub fn capacity(&self) -> usize {
        self.inner.current_l2().capacity()
    }

    /// Current L1 capacity.
    pub fn l1_capacity(&self) -> usize {
        self.inner.l1.capacity()
    }

    /// Threads currently parked waiting on an empty L2.
    pub fn blocked_readers(&self) -> usize {
        self.inner.current_l2().blocked_readers()
    }

    /// Threads currently parked waiting on a full L2.
    pub fn blocked_writers(&self) -> usize {
        self.inner.current_l2().blocked_writers()
    }

    /// `true` once [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Closes the pool: stops the capacity controller, waits (bounded by
    /// `ring_buffer.close_drain_timeout`, polling every
    /// `ring_buffer.close_poll_interval`) for outstanding objects to be
    /// released, then closes L2 and drops everything remaining in both
    /// tiers. Idempotent calls after the first return
    /// [`PoolError::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(PoolError::AlreadyClosed);
        }

        if let Some(mut controller) = self.inner.controller.lock().unwrap().take() {
            controller.stop();
        }

        let deadline = Instant::now() + self.inner.config.ring_buffer.close_drain_timeout;
        while self.inner.stats.objects_in_use() > 0 && Instant::now() < deadline {
            std::thread::sleep(self.inner.config.ring_buffer.close_poll_interval);
        }

        self.inner.current_l2().close();
        let _ = self.inner.l1.drain_all();
        Ok(())
    }
}

/// An object checked out of a [`Pool`].
///
/// Returned to the pool automatically on drop (errors during the
/// implicit return are logged, never panicked); call
/// [`release`](Self::release) instead to observe that outcome.
pub struct PooledObject<T: Send + 'static> {
    pool: Pool<T>,
    object: Option<Box<T>>,
}

impl<T: Send + 'static + std::fmt::Debug> std::fmt::Debug for PooledObject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledObject")
            .field("object", &self.object)
            .finish()
    }
}

impl<T: Send + 'static> PooledObject<T> {
    fn new(pool: &Pool<T>, object: Box<T>) -> Self {
        Self {
            pool: pool.clone(),
            object: Some(object),
        }
    }

    /// Returns the object to the pool, observing any error from the
    /// caller-supplied cleaner or from the ring buffer.
    pub fn release(mut self) -> Result<()> {
        let object = self.object.take().expect("PooledObject used after release");
        // `self.object` is now `None`, so the `Drop` impl that runs when
        // `self` goes out of scope at the end of this function is a no-op.
        self.pool.inner.release_object(object)
    }
}

impl<T: Send + 'static> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.object.as_ref().expect("PooledObject used after release")
    }
}

impl<T: Send + 'static> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.object.as_mut().expect("PooledObject used after release")
    }
}

impl<T: Send + 'static> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            if let Err(e) = self.pool.inner.release_object(object) {
                log::warn!("adapool: error returning object to pool on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfigBuilder;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn counting_allocator() -> (impl Fn() -> Box<u32> + Send + Sync + Clone, Arc<AtomicU32>) {
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        (move || Box::new(c.fetch_add(1, Ordering::SeqCst)), counter)
    }

    #[test]
    fn test_acquire_release_roundtrip() {
        let (alloc, _count) = counting_allocator();
        let pool = Pool::new(alloc, |_v: &mut u32| {}).unwrap();
        let obj = pool.acquire().unwrap();
        assert_eq!(pool.stats().objects_in_use, 1);
        drop(obj);
        assert_eq!(pool.stats().objects_in_use, 0);
    }

    #[test]
    fn test_cleaner_resets_value_between_uses() {
        let pool = Pool::new(|| Box::new(0u32), |v: &mut u32| *v = 0).unwrap();
        {
            let mut obj = pool.acquire().unwrap();
            *obj = 42;
        }
        let obj2 = pool.acquire().unwrap();
        assert_eq!(*obj2, 0);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let config = PoolConfigBuilder::new()
            .initial_capacity(2)
            .hard_limit(16)
            .build()
            .unwrap();
        let pool = Pool::with_config(|| Box::new(0u32), |_v: &mut u32| {}, config).unwrap();
        let held: Vec<_> = (0..5).map(|_| pool.acquire().unwrap()).collect();
        assert_eq!(pool.stats().objects_in_use, 5);
        assert!(pool.capacity() >= 5);
        drop(held);
    }

    #[test]
    fn test_hard_limit_enforced_non_blocking() {
        let config = PoolConfigBuilder::new()
            .initial_capacity(1)
            .hard_limit(1)
            .build()
            .unwrap();
        let pool = Pool::with_config(|| Box::new(0u32), |_v: &mut u32| {}, config).unwrap();
        let _obj = pool.acquire().unwrap();
        let err = pool.try_acquire().unwrap_err();
        assert_eq!(err, PoolError::HardLimitReached);
    }

    #[test]
    fn test_release_then_acquire_reuses_object() {
        let pool = Pool::new(|| Box::new(0u32), |_v: &mut u32| {}).unwrap();
        let obj = pool.acquire().unwrap();
        obj.release().unwrap();
        let snap = pool.stats();
        assert!(snap.fast_return_hit >= 1);
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_reuse() {
        let pool = Pool::new(|| Box::new(0u32), |_v: &mut u32| {}).unwrap();
        pool.close().unwrap();
        assert!(pool.is_closed());
        assert_eq!(pool.close().unwrap_err(), PoolError::AlreadyClosed);
        assert_eq!(pool.acquire().unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn test_allocator_panic_surfaces_as_error() {
        // Construction eagerly populates both tiers, so a panicking
        // allocator now surfaces here rather than on the first `acquire`.
        let err = Pool::new(|| -> Box<u32> { panic!("boom") }, |_v: &mut u32| {}).unwrap_err();
        assert!(matches!(err, PoolError::AllocatorPanicked(_)));
    }

    #[test]
    fn test_concurrent_acquire_release_under_hard_limit() {
        let config = PoolConfigBuilder::new()
            .initial_capacity(4)
            .hard_limit(8)
            .build()
            .unwrap();
        let pool = Pool::with_config(|| Box::new(0u32), |_v: &mut u32| {}, config).unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let obj = pool.acquire().unwrap();
                    std::thread::sleep(Duration::from_micros(10));
                    drop(obj);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let snap = pool.stats();
        assert_eq!(snap.objects_in_use, 0);
        assert!(snap.accounting_balanced());
    }
}
