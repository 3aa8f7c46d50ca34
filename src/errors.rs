//! Error types for the object pool

use crate::counter::WaitError;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    Configuration(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Pooled object was already returned to the pool")]
    UseAfterReturn,
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Why an object was not taken back by the pool
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("an equal object is already in the pool")]
    Duplicate,

    #[error("the pool is at capacity")]
    Full,

    #[error("timed out waiting for a free slot")]
    Timeout,

    #[error("cancelled while waiting for a free slot")]
    Cancelled,
}

impl From<WaitError> for RejectReason {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout => RejectReason::Timeout,
            WaitError::Cancelled => RejectReason::Cancelled,
        }
    }
}

/// A failed return: the object comes back to the caller together with the
/// reason, so it can be retried or discarded deliberately.
///
/// # Examples
///
/// ```
/// use esox_concurrentpool::{ConcurrentObjectPool, PoolConfiguration, RejectReason};
/// use std::time::Duration;
///
/// let pool = ConcurrentObjectPool::new(
///     PoolConfiguration::new().with_initial_items(vec![1, 2]),
/// ).unwrap();
///
/// let rejected = pool.return_object(2, Some(Duration::ZERO), None).unwrap_err();
/// assert_eq!(rejected.reason(), RejectReason::Duplicate);
/// assert_eq!(rejected.into_inner(), 2);
/// ```
pub struct Rejected<T> {
    item: T,
    reason: RejectReason,
}

impl<T> Rejected<T> {
    pub(crate) fn new(item: T, reason: RejectReason) -> Self {
        Self { item, reason }
    }

    pub fn reason(&self) -> RejectReason {
        self.reason
    }

    /// Take the object back
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object was not returned to the pool: {}", self.reason)
    }
}

impl<T> std::error::Error for Rejected<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}
