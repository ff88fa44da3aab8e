use std::time::Duration;

use crate::Reason;

/// Problems detected while building a limiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A single call would overflow an empty bucket, so no call could ever be admitted.
    #[error("max_cost {max_cost:?} < cost_per_call {cost_per_call:?}, so no call can ever be admitted")]
    CostExceedsCapacity {
        cost_per_call: Duration,
        max_cost: Duration,
    },

    /// Calls must cost something, otherwise nothing is being limited.
    #[error("cost_per_call must be greater than zero")]
    ZeroCost,

    /// A cost given in seconds was negative, NaN or too large to represent.
    #[error("{0} is not a valid number of seconds")]
    InvalidSeconds(f64),
}

/// A call was rejected because the bucket is full.
///
/// This is an expected outcome, not a fault. The waits are advisory and measured
/// from the moment the call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Rate Limit Exceeded; retry in {min_wait:?}, idle in {max_wait:?}")]
pub struct RateLimitExceeded {
    /// Time until the bucket has drained enough to admit one call.
    pub min_wait: Duration,
    /// Time until the bucket is completely empty.
    pub max_wait: Duration,
}

impl RateLimitExceeded {
    /// The human readable summary carried by every rejection.
    pub fn message(&self) -> &'static str {
        "Rate Limit Exceeded"
    }
}

impl From<Reason> for RateLimitExceeded {
    fn from(reason: Reason) -> Self {
        let Reason::Overloaded { min_wait, max_wait } = reason;
        Self { min_wait, max_wait }
    }
}

/// Outcome of a rate limited, fallible operation.
///
/// Keeps the limiter's own rejection apart from whatever the operation returned, so
/// callers can retry on [`AttemptError::RateLimited`] without swallowing real failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptError<E> {
    /// The limiter refused the call; the operation never ran.
    #[error(transparent)]
    RateLimited(RateLimitExceeded),

    /// The operation ran and failed. The error is exactly what it returned.
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> AttemptError<E> {
    /// The rejection, if the limiter refused the call.
    pub fn rate_limited(&self) -> Option<&RateLimitExceeded> {
        match self {
            Self::RateLimited(exceeded) => Some(exceeded),
            Self::Operation(_) => None,
        }
    }

    /// Recover the operation's own error, if it ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::RateLimited(_) => None,
            Self::Operation(err) => Some(err),
        }
    }
}

impl<E> From<RateLimitExceeded> for AttemptError<E> {
    fn from(exceeded: RateLimitExceeded) -> Self {
        Self::RateLimited(exceeded)
    }
}
