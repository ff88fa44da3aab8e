use std::ops::ControlFlow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;
use tracing::debug;
use tracing::trace;

use crate::BucketConfig;
use crate::ConfigError;
use crate::Reason;
use crate::Strategy;

/// Leaky bucket ("transaction rate") limiter.
///
/// Each admitted call adds `cost_per_call` to the bucket, which drains at one
/// nanosecond per nanosecond. A call is admitted only if the outstanding cost after
/// adding it stays within `max_cost`.
#[derive(Debug)]
pub struct LeakyBucket {
    /// When the bucket will be empty, in nanoseconds from `anchor`.
    empty_time: AtomicU64,
    cost_per_call_ns: u64,
    max_cost_ns: u64,
    config: BucketConfig,
    clock: Clock,
    /// A fixed point in time (TSC tick) to calculate deltas from.
    anchor: Instant,
}

impl Default for LeakyBucket {
    fn default() -> Self {
        Self::from_valid(BucketConfig::default(), Clock::new())
    }
}

impl LeakyBucket {
    /// Creates a new, empty `LeakyBucket`.
    ///
    /// # Errors
    ///
    /// Fails if `cost_per_call` is zero or larger than `max_cost`.
    pub fn new(config: BucketConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Clock::new())
    }

    /// Creates a new, empty `LeakyBucket` driven by `clock`.
    ///
    /// # Errors
    ///
    /// Fails if `cost_per_call` is zero or larger than `max_cost`.
    pub fn with_clock(config: BucketConfig, clock: Clock) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(
            cost_per_call = ?config.cost_per_call,
            max_cost = ?config.max_cost,
            "Creating leaky bucket"
        );
        Ok(Self::from_valid(config, clock))
    }

    fn from_valid(config: BucketConfig, clock: Clock) -> Self {
        let anchor = clock.now();
        Self {
            empty_time: AtomicU64::new(0),
            cost_per_call_ns: saturating_nanos(config.cost_per_call),
            max_cost_ns: saturating_nanos(config.max_cost),
            config,
            clock,
            anchor,
        }
    }

    pub fn config(&self) -> BucketConfig {
        self.config
    }

    pub fn cost_per_call(&self) -> Duration {
        self.config.cost_per_call
    }

    pub fn max_cost(&self) -> Duration {
        self.config.max_cost
    }

    /// Cost currently held in the bucket, i.e. how long until it is empty.
    pub fn level(&self) -> Duration {
        let now = self.now_ns();
        let empty_time = self.empty_time.load(Ordering::Acquire);
        Duration::from_nanos(empty_time.saturating_sub(now))
    }

    #[inline]
    fn now_ns(&self) -> u64 {
        saturating_nanos(self.clock.now().duration_since(self.anchor))
    }
}

impl Strategy for LeakyBucket {
    #[inline]
    fn process(&self) -> ControlFlow<Reason> {
        let now = self.now_ns();

        loop {
            let empty_time = self.empty_time.load(Ordering::Acquire);

            // Idle time is not banked beyond the present.
            let drained_at = empty_time.max(now);
            let next_empty_time = drained_at.saturating_add(self.cost_per_call_ns);

            if next_empty_time - now > self.max_cost_ns {
                // Only reachable while the bucket is still draining, so
                // drained_at == empty_time and the stored state is left alone.
                let min_wait = Duration::from_nanos(next_empty_time - self.max_cost_ns - now);
                let max_wait = Duration::from_nanos(drained_at - now);
                debug!(?min_wait, ?max_wait, "Rate limit exceeded");
                return ControlFlow::Break(Reason::Overloaded { min_wait, max_wait });
            }

            if self
                .empty_time
                .compare_exchange_weak(
                    empty_time,
                    next_empty_time,
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                trace!(level_ns = next_empty_time - now, "Call admitted");
                return ControlFlow::Continue(());
            }
        }
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
