// src/error.rs
//! Error types for the pool, with the same advanced conversion support
//! the rest of this crate's ambient stack relies on.

use std::fmt;
use std::time::Duration;

/// Transient failures surfaced by the ring buffer (L2).
///
/// None of these set the ring buffer's terminal state; see
/// [`PoolError::Closed`] for the terminal case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    /// Write attempted against a full buffer in non-blocking mode.
    Full,
    /// Read attempted against an empty buffer in non-blocking mode.
    Empty,
    /// A blocking operation's configured timeout elapsed before progress.
    DeadlineExceeded,
    /// The ring buffer has been closed; this is terminal.
    Closed,
    /// A refill or spill had no items available to move.
    NoItemsToMove,
}

impl fmt::Display for RingBufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "ring buffer is full"),
            Self::Empty => write!(f, "ring buffer is empty"),
            Self::DeadlineExceeded => write!(f, "ring buffer operation timed out"),
            Self::Closed => write!(f, "ring buffer is closed"),
            Self::NoItemsToMove => write!(f, "no items available to move"),
        }
    }
}

impl std::error::Error for RingBufferError {}

/// Errors returned by the pool's public operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A configuration value failed validation (see `PoolConfigBuilder::build`).
    InvalidConfig(String),
    /// Reserved for allocators implemented via the runtime-asserted escape
    /// hatch; the safe `Allocator<T>` binding returns `Box<T>` and cannot
    /// produce this error, since a by-value return is unrepresentable.
    AllocatorMustReturnReference,
    /// The pool has been closed; no further objects will be issued or accepted.
    Closed,
    /// `close()` was called on a pool that was already closed.
    AlreadyClosed,
    /// A blocking operation's configured timeout elapsed.
    DeadlineExceeded,
    /// Growth was requested but the pool is already at `hard_limit`.
    HardLimitReached,
    /// The ring buffer reported a failure.
    RingBufferFailed(RingBufferError),
    /// `release()` was called with a null/already-released object.
    NilObject,
    /// The caller-supplied allocator panicked during construction.
    AllocatorPanicked(String),
    /// The caller-supplied cleaner panicked during `release()`.
    CleanerPanicked(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid pool configuration: {}", msg),
            Self::AllocatorMustReturnReference => {
                write!(f, "allocator must return a heap-addressable reference")
            }
            Self::Closed => write!(f, "pool is closed"),
            Self::AlreadyClosed => write!(f, "pool is already closed"),
            Self::DeadlineExceeded => write!(f, "operation timed out"),
            Self::HardLimitReached => write!(f, "pool hard limit reached"),
            Self::RingBufferFailed(e) => write!(f, "ring buffer failed: {}", e),
            Self::NilObject => write!(f, "attempted to release a nil object"),
            Self::AllocatorPanicked(msg) => write!(f, "allocator panicked: {}", msg),
            Self::CleanerPanicked(msg) => write!(f, "cleaner panicked: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<RingBufferError> for PoolError {
    fn from(err: RingBufferError) -> Self {
        match err {
            RingBufferError::Closed => PoolError::Closed,
            RingBufferError::DeadlineExceeded => PoolError::DeadlineExceeded,
            other => PoolError::RingBufferFailed(other),
        }
    }
}

/// Convert `PoolError` to `std::io::Error`.
impl From<PoolError> for std::io::Error {
    fn from(err: PoolError) -> Self {
        use std::io::ErrorKind;
        match err {
            PoolError::Closed | PoolError::AlreadyClosed => {
                std::io::Error::new(ErrorKind::NotConnected, err)
            }
            PoolError::DeadlineExceeded => std::io::Error::new(ErrorKind::TimedOut, err),
            PoolError::HardLimitReached => {
                std::io::Error::new(ErrorKind::OutOfMemory, err)
            }
            PoolError::NilObject | PoolError::InvalidConfig(_) => {
                std::io::Error::new(ErrorKind::InvalidInput, err)
            }
            _ => std::io::Error::other(err),
        }
    }
}

/// Convert `PoolError` to `anyhow::Error`.
#[cfg(feature = "anyhow")]
impl From<PoolError> for anyhow::Error {
    fn from(err: PoolError) -> Self {
        anyhow::anyhow!("{}", err)
    }
}

/// Allow using `?` to convert an `anyhow::Error` back into a `PoolError`.
#[cfg(feature = "anyhow")]
impl From<anyhow::Error> for PoolError {
    fn from(err: anyhow::Error) -> Self {
        PoolError::InvalidConfig(err.to_string())
    }
}

/// Result type alias used throughout the pool.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Extension trait for converting pool results into other error domains.
pub trait ResultExt<T> {
    /// Convert to `anyhow::Result`.
    #[cfg(feature = "anyhow")]
    fn into_anyhow(self) -> anyhow::Result<T>;

    /// Convert to `std::io::Result`.
    fn into_io(self) -> std::io::Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    #[cfg(feature = "anyhow")]
    fn into_anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| e.into())
    }

    fn into_io(self) -> std::io::Result<T> {
        self.map_err(|e| e.into())
    }
}

/// Describes what kind of deadline a blocking call exceeded, purely for
/// log messages — not part of the public error surface.
pub(crate) fn timeout_context(op: &str, timeout: Duration) -> String {
    format!("{op} exceeded its {timeout:?} deadline")
}

/// Convenience macro for converting pool operations to any `Result` type.
///
/// Requires an explicit target error type as the second argument so the
/// conversion is unambiguous.
///
/// # Example
/// ```ignore
/// use adapool::prelude::*;
/// use adapool::pool_op;
///
/// fn handler_function(pool: &Pool<Vec<u8>>) -> anyhow::Result<()> {
///     let obj = pool_op!(pool.acquire(), anyhow::Error)?;
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! pool_op {
    ($expr:expr, $target:ty) => {
        $expr.map_err(|e: $crate::PoolError| -> $target { e.into() })
    };
    ($expr:expr) => {
        $expr.map_err(|e: $crate::PoolError| -> std::io::Error { e.into() })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_io() {
        let err = PoolError::DeadlineExceeded;
        let io_err: std::io::Error = err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_ring_buffer_error_into_pool_error() {
        let err: PoolError = RingBufferError::Full.into();
        assert_eq!(err, PoolError::RingBufferFailed(RingBufferError::Full));

        let closed: PoolError = RingBufferError::Closed.into();
        assert_eq!(closed, PoolError::Closed);
    }

    #[test]
    fn test_result_ext() {
        let result: Result<u32> = Ok(42);
        assert_eq!(result.into_io().unwrap(), 42);
    }

    #[cfg(feature = "anyhow")]
    #[test]
    fn test_anyhow_conversion() {
        let err = PoolError::NilObject;
        let anyhow_err: anyhow::Error = err.into();
        assert!(anyhow_err.to_string().contains("nil object"));
    }
}
