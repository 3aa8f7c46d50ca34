//! # EsoxSolutions.ConcurrentObjectPool
//!
//! Bounded, thread-safe object pool with blocking and async checkout,
//! timeouts and cooperative cancellation.
//!
//! ## Features
//!
//! - Capacity-bounded pool coordinated by two slot counters, no global lock
//! - Blocking (`get_object`) and async (`get_object_async`) checkout and return
//! - Timeouts: `None` waits forever, `Some(Duration::ZERO)` never blocks
//! - Cancellation through [`CancellationToken`], in both modes
//! - On-demand creation with a factory when the pool runs dry
//! - Single-use checkout handles, returned explicitly or on drop
//! - Duplicate rejection on return
//! - Observer hooks on add and get
//! - Metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_concurrentpool::{ConcurrentObjectPool, PoolConfiguration};
//! use std::time::Duration;
//!
//! let pool = ConcurrentObjectPool::new(
//!     PoolConfiguration::new()
//!         .with_capacity(4)
//!         .with_initial_items(vec![1, 2, 3]),
//! )
//! .unwrap();
//!
//! {
//!     let obj = pool.get_object(Some(Duration::from_secs(1)), None).unwrap();
//!     println!("Got: {}", *obj);
//!     // Object automatically returned when `obj` goes out of scope
//! }
//! assert_eq!(pool.available_count(), 3);
//! ```

mod config;
mod container;
mod counter;
mod errors;
mod hooks;
mod metrics;
mod pool;

pub use config::{Factory, PoolConfiguration};
pub use errors::{PoolError, PoolResult, RejectReason, Rejected};
pub use hooks::Hook;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{ConcurrentObjectPool, PooledObject};
pub use tokio_util::sync::CancellationToken;
