// src/fast_path.rs
//! The fast path (L1): a bounded, lock-light queue sitting in front of
//! the ring buffer so the common acquire/release cycle under steady
//! load never has to touch L2's mutex.
//!
//! Backed by `crossbeam::queue::ArrayQueue`, generalized from a plain
//! unbounded `SegQueue` to a capacity-bounded queue since L1 has a
//! fixed, enforced size that the capacity controller resizes under a
//! lock rather than letting grow without bound.

use crossbeam::queue::ArrayQueue;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-light bounded queue used as the pool's L1 cache.
///
/// Reads and writes are lock-free against `ArrayQueue` itself; only a
/// resize (swapping the backing queue for one of a different capacity)
/// takes the write side of `resize_lock`. Everyday `try_push`/`try_pop`
/// take the read side, so concurrent fast-path traffic never blocks on
/// itself, only on a resize in progress.
pub struct FastPath<T> {
    queue: RwLock<ArrayQueue<T>>,
    // Approximate length counter, maintained alongside the queue so
    // callers can read occupancy without draining anything. Can read
    // briefly stale under contention; never used for anything that
    // requires exact accounting (that's `PoolStatsInner`'s job).
    approx_len: AtomicUsize,
}

impl<T> FastPath<T> {
    /// Creates an empty fast path with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: RwLock::new(ArrayQueue::new(capacity.max(1))),
            approx_len: AtomicUsize::new(0),
        }
    }

    /// Non-blocking push. `Err(item)` if L1 is at capacity.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let guard = self.queue.read().unwrap();
        match guard.push(item) {
            Ok(()) => {
                self.approx_len.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(item) => Err(item),
        }
    }

    /// Non-blocking pop. `None` if L1 is empty.
    pub fn try_pop(&self) -> Option<T> {
        let guard = self.queue.read().unwrap();
        let popped = guard.pop();
        if popped.is_some() {
            let _ = self
                .approx_len
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                    Some(v.saturating_sub(1))
                });
        }
        popped
    }

    /// Approximate current occupancy. May be briefly stale under
    /// concurrent pushes/pops; exact for a quiesced queue.
    pub fn len(&self) -> usize {
        self.approx_len.load(Ordering::Relaxed)
    }

    /// `true` if the fast path appears empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.queue.read().unwrap().capacity()
    }

    /// Resizes L1 to `new_capacity`, returning every item that didn't
    /// fit in the new queue (the caller — the pool facade — is
    /// responsible for spilling these into L2 so nothing is dropped).
    ///
    /// Takes the write side of the internal lock, so concurrent
    /// `try_push`/`try_pop` calls block for the (brief) duration of the
    /// drain-and-rebuild.
    pub fn resize(&self, new_capacity: usize) -> Vec<T> {
        let mut guard = self.queue.write().unwrap();
        let new_queue = ArrayQueue::new(new_capacity.max(1));
        let mut overflow = Vec::new();
        while let Some(item) = guard.pop() {
            if let Err(item) = new_queue.push(item) {
                overflow.push(item);
            }
        }
        *guard = new_queue;
        self.approx_len
            .store(guard.len(), Ordering::Relaxed);
        overflow
    }

    /// Drains every item currently in L1, for use during `close()`.
    pub fn drain_all(&self) -> Vec<T> {
        let guard = self.queue.read().unwrap();
        let mut out = Vec::with_capacity(guard.len());
        while let Some(item) = guard.pop() {
            out.push(item);
        }
        self.approx_len.store(0, Ordering::Relaxed);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_roundtrip() {
        let fp = FastPath::new(4);
        fp.try_push(1).unwrap();
        fp.try_push(2).unwrap();
        assert_eq!(fp.len(), 2);
        assert_eq!(fp.try_pop(), Some(1));
        assert_eq!(fp.try_pop(), Some(2));
        assert_eq!(fp.try_pop(), None);
    }

    #[test]
    fn test_push_rejected_when_full() {
        let fp = FastPath::new(1);
        fp.try_push(1).unwrap();
        assert_eq!(fp.try_push(2), Err(2));
    }

    #[test]
    fn test_resize_grow_preserves_items() {
        let fp = FastPath::new(2);
        fp.try_push(1).unwrap();
        fp.try_push(2).unwrap();
        let overflow = fp.resize(4);
        assert!(overflow.is_empty());
        assert_eq!(fp.capacity(), 4);
        assert_eq!(fp.len(), 2);
    }

    #[test]
    fn test_resize_shrink_returns_overflow() {
        let fp = FastPath::new(4);
        for i in 0..4 {
            fp.try_push(i).unwrap();
        }
        let overflow = fp.resize(2);
        assert_eq!(overflow.len(), 2);
        assert_eq!(fp.len(), 2);
        assert_eq!(fp.capacity(), 2);
    }

    #[test]
    fn test_drain_all() {
        let fp = FastPath::new(4);
        fp.try_push(1).unwrap();
        fp.try_push(2).unwrap();
        let drained = fp.drain_all();
        assert_eq!(drained, vec![1, 2]);
        assert!(fp.is_empty());
    }
}
