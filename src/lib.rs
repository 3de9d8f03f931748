// src/lib.rs
//! # adapool
//!
//! A generic, adaptive object pool for high-concurrency workloads.
//!
//! Features:
//! - A bounded, lock-light fast path (L1) in front of a blocking ring
//!   buffer (L2), so steady-state acquire/release traffic rarely touches
//!   a mutex
//! - A background capacity controller that grows on demand and shrinks
//!   idle capacity back during quiet periods
//! - Caller-supplied allocator/cleaner closures, with panics from either
//!   converted into errors instead of unwinding into the pool
//! - A validated configuration builder and an immutable statistics
//!   snapshot type
//!
//! ```
//! use adapool::prelude::*;
//!
//! let pool: Pool<Vec<u8>> = Pool::new(
//!     || Box::new(Vec::with_capacity(4096)),
//!     |buf: &mut Vec<u8>| buf.clear(),
//! ).unwrap();
//!
//! let mut buf = pool.acquire().unwrap();
//! buf.extend_from_slice(b"hello");
//! drop(buf); // returned to the pool automatically
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod config;
mod controller;
pub mod error;
pub mod fast_path;
pub mod pool;
pub mod ring_buffer;
pub mod stats;

pub use allocator::{Allocator, Cleaner};
pub use config::{
    AggressivenessLevel, BasicConfig, FastPathConfig, GrowthConfig, PoolConfig,
    PoolConfigBuilder, RingBufferConfig, ShrinkConfig, ShrinkPreset,
};
pub use error::{PoolError, Result, RingBufferError};
pub use pool::{Pool, PooledObject};
pub use stats::PoolStatsSnapshot;

/// Commonly used imports.
pub mod prelude {
    pub use crate::allocator::{Allocator, Cleaner};
    pub use crate::config::{PoolConfig, PoolConfigBuilder};
    pub use crate::error::{PoolError, Result};
    pub use crate::pool::{Pool, PooledObject};
    pub use crate::stats::PoolStatsSnapshot;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_pool_acquire_release_and_stats() {
        let pool: Pool<Vec<u8>> = Pool::new(
            || Box::new(Vec::with_capacity(64)),
            |buf: &mut Vec<u8>| buf.clear(),
        )
        .unwrap();

        let mut buffers = Vec::new();
        for i in 0..50u8 {
            let mut buf = pool.acquire().unwrap();
            buf.push(i);
            buffers.push(buf);
        }

        drop(buffers);

        let stats = pool.stats();
        assert!(stats.total_gets >= 50);
        assert_eq!(stats.objects_in_use, 0);
        assert!(stats.accounting_balanced());
    }

    #[test]
    fn test_pool_close_stops_further_acquires() {
        let pool: Pool<u32> = Pool::new(|| Box::new(0), |_v: &mut u32| {}).unwrap();
        let obj = pool.acquire().unwrap();
        drop(obj);
        pool.close().unwrap();
        assert!(pool.acquire().is_err());
    }
}
