//! # drip-limit
//!
//! `drip-limit` provides a lock-free leaky bucket rate limiter, plus a small
//! timing probe for measuring the wall-clock and CPU cost of a unit of work.
//!
//! ## Core Philosophy
//!
//! Every admitted call pours a fixed cost (expressed as time) into a virtual bucket
//! which drains at one second per second. A call is admitted only if the bucket would
//! not overflow its capacity. The only state is the instant at which the bucket will
//! next be empty, so a decision is O(1) and needs no background draining.
//!
//! ## Key Concepts
//!
//! * **Lock-Free**: The bucket level is a single `AtomicU64` updated by a
//!   Compare-And-Swap loop, so a shared limiter never admits more than its capacity.
//! * **Fail Fast**: A rejected call returns immediately with hints about how long to
//!   wait. Nothing sleeps and nothing is queued.
//! * **Strategy Trait**: A unified interface the `tower-drip` middleware builds on.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use drip_limit::Attempt;
//! use drip_limit::BucketConfig;
//! use drip_limit::LeakyBucket;
//!
//! let config = BucketConfig::new(Duration::from_secs(3), Duration::from_secs(30));
//! let bucket = LeakyBucket::new(config).unwrap();
//!
//! match bucket.attempt(|x: u32| x * 2, 21) {
//!     Ok(answer) => assert_eq!(answer, 42),
//!     Err(exceeded) => println!("try again in {:?}", exceeded.min_wait),
//! }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod attempt;
mod config;
mod error;
mod leaky_bucket;
mod probe;

pub use attempt::Attempt;
pub use attempt::RateLimited;
pub use config::BucketConfig;
pub use error::AttemptError;
pub use error::ConfigError;
pub use error::RateLimitExceeded;
pub use leaky_bucket::LeakyBucket;
pub use probe::Stopwatch;
pub use probe::Timed;
pub use probe::TimingProbe;
pub use probe::process_cpu_time;

/// Reasons why a request might be rejected by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Admitting the request would overflow the bucket.
    Overloaded {
        /// Time until enough has drained to admit one more call.
        min_wait: Duration,
        /// Time until the bucket is completely empty.
        max_wait: Duration,
    },
}

/// The core trait for rate-limiting algorithms.
///
/// Strategies must be `Send` and `Sync` to allow sharing across thread boundaries
/// via `Arc`.
pub trait Strategy: Debug {
    /// Attempts to process a single request.
    ///
    /// This method is non-blocking and uses atomic operations to update
    /// internal state.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the rate limit has been reached.
    fn process(&self) -> ControlFlow<Reason>;
}
