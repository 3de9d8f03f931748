// src/allocator.rs
//! Allocator/cleaner bindings: the caller-supplied construction and
//! reset logic plugged into the pool.
//!
//! The pool is generic in `T`; callers plug in construction and reset
//! logic via two function-shaped traits. Both are blanket-implemented
//! for any matching closure/fn, mirroring how the rest of this crate's
//! ambient callback surfaces (e.g. `RingBuffer::pre_read_block_hook`)
//! are expressed as plain `Fn` bounds rather than bespoke traits.

use crate::error::{PoolError, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Constructs a fresh `T`, handed out to the pool as a `Box<T>`.
///
/// Returning `Box<T>` rather than `T` is what gives every pooled value a
/// stable heap address for as long as it lives in the pool: the
/// allocator must return a reference, encoded here at the type level
/// rather than left as a runtime check.
pub trait Allocator<T>: Fn() -> Box<T> + Send + Sync {}
impl<T, F: Fn() -> Box<T> + Send + Sync> Allocator<T> for F {}

/// Resets an object's state before it becomes observable to the next
/// `acquire()`. Invoked exactly once per `release()`.
pub trait Cleaner<T>: Fn(&mut T) + Send + Sync {}
impl<T, F: Fn(&mut T) + Send + Sync> Cleaner<T> for F {}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Calls the allocator, converting a panic into [`PoolError::AllocatorPanicked`]
/// instead of unwinding into the pool's own lock-held call sites.
pub(crate) fn invoke_allocator<T>(alloc: &(dyn Fn() -> Box<T> + Send + Sync)) -> Result<Box<T>> {
    panic::catch_unwind(AssertUnwindSafe(alloc)).map_err(|payload| {
        PoolError::AllocatorPanicked(panic_message(payload))
    })
}

/// Calls the cleaner, converting a panic into [`PoolError::CleanerPanicked`].
///
/// A panic here is fatal to the `release()` call but not to the pool:
/// the caller sees the error, and the in-use counter has already been
/// decremented before this runs, so no double-decrement occurs
/// regardless of the outcome.
pub(crate) fn invoke_cleaner<T>(
    cleaner: &(dyn Fn(&mut T) + Send + Sync),
    object: &mut T,
) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(|| cleaner(object))).map_err(|payload| {
        PoolError::CleanerPanicked(panic_message(payload))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_panic_is_caught() {
        let alloc: Box<dyn Fn() -> Box<u32> + Send + Sync> =
            Box::new(|| panic!("allocator exploded"));
        let result = invoke_allocator(&*alloc);
        assert!(matches!(result, Err(PoolError::AllocatorPanicked(_))));
    }

    #[test]
    fn test_allocator_success() {
        let alloc: Box<dyn Fn() -> Box<u32> + Send + Sync> = Box::new(|| Box::new(7));
        let result = invoke_allocator(&*alloc).unwrap();
        assert_eq!(*result, 7);
    }

    #[test]
    fn test_cleaner_panic_is_caught() {
        let cleaner: Box<dyn Fn(&mut u32) + Send + Sync> = Box::new(|_v| panic!("cleaner exploded"));
        let mut value = 5u32;
        let result = invoke_cleaner(&*cleaner, &mut value);
        assert!(matches!(result, Err(PoolError::CleanerPanicked(_))));
    }

    #[test]
    fn test_cleaner_success_resets_value() {
        let cleaner: Box<dyn Fn(&mut u32) + Send + Sync> = Box::new(|v| *v = 0);
        let mut value = 42u32;
        invoke_cleaner(&*cleaner, &mut value).unwrap();
        assert_eq!(value, 0);
    }
}
