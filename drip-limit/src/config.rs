use std::num::NonZeroU32;
use std::time::Duration;

use crate::ConfigError;

const DEFAULT_COST_PER_CALL: Duration = Duration::from_secs(3);
const DEFAULT_MAX_COST: Duration = Duration::from_secs(30);

/// Parameters of a [`LeakyBucket`](crate::LeakyBucket).
///
/// Both values are expressed as time. `cost_per_call` fixes the long run rate at
/// one call per `cost_per_call`; `max_cost` is how much unspent cost the bucket can
/// hold, which bounds the size of a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub cost_per_call: Duration,
    pub max_cost: Duration,
}

impl Default for BucketConfig {
    /// Three seconds per call, with room for a burst of ten.
    fn default() -> Self {
        Self {
            cost_per_call: DEFAULT_COST_PER_CALL,
            max_cost: DEFAULT_MAX_COST,
        }
    }
}

impl BucketConfig {
    pub fn new(cost_per_call: Duration, max_cost: Duration) -> Self {
        Self {
            cost_per_call,
            max_cost,
        }
    }

    /// Build a config from costs given in (fractional) seconds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSeconds` for negative, NaN or overflowing values.
    pub fn from_secs_f64(cost_per_call: f64, max_cost: f64) -> Result<Self, ConfigError> {
        let secs = |value: f64| {
            Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidSeconds(value))
        };
        Ok(Self::new(secs(cost_per_call)?, secs(max_cost)?))
    }

    /// Allow `calls` per `period`, all of which may arrive in a single burst.
    ///
    /// For example, 2500 calls per day costs 34.56 seconds per call with a capacity
    /// of a whole day.
    pub fn per_period(calls: NonZeroU32, period: Duration) -> Self {
        Self::new(period / calls.get(), period)
    }

    /// Check the config could ever admit a call.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ZeroCost` or `ConfigError::CostExceedsCapacity`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cost_per_call.is_zero() {
            return Err(ConfigError::ZeroCost);
        }
        if self.cost_per_call > self.max_cost {
            return Err(ConfigError::CostExceedsCapacity {
                cost_per_call: self.cost_per_call,
                max_cost: self.max_cost,
            });
        }
        Ok(())
    }

    /// How many calls an empty bucket admits back to back.
    pub fn burst(&self) -> u64 {
        if self.cost_per_call.is_zero() {
            return 0;
        }
        (self.max_cost.as_nanos() / self.cost_per_call.as_nanos()) as u64
    }
}
