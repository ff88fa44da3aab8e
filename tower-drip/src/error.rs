use std::time::Duration;

use drip_limit::RateLimitExceeded;
use drip_limit::Reason;

/// Errors produced by the Tower Drip middleware.
///
/// Errors from the wrapped service are never converted into a `DripError`; they
/// reach the caller as the same `BoxError` the inner service returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DripError {
    /// The request was rejected because the bucket is full.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header derived from `min_wait`.
    #[error("Rate Limit Exceeded; retry in {min_wait:?}, idle in {max_wait:?}")]
    RateLimited {
        /// Time until one more request could be admitted.
        min_wait: Duration,
        /// Time until the bucket is completely empty.
        max_wait: Duration,
    },
}

impl From<Reason> for DripError {
    fn from(reason: Reason) -> Self {
        let Reason::Overloaded { min_wait, max_wait } = reason;
        Self::RateLimited { min_wait, max_wait }
    }
}

impl From<RateLimitExceeded> for DripError {
    fn from(exceeded: RateLimitExceeded) -> Self {
        Self::RateLimited {
            min_wait: exceeded.min_wait,
            max_wait: exceeded.max_wait,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for DripError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let msg = self.to_string();
        match self {
            Self::RateLimited { min_wait, .. } => {
                // Round up so clients never come back early.
                let mut secs = min_wait.as_secs();
                if min_wait.subsec_nanos() > 0 {
                    secs += 1;
                }
                let val = axum::http::HeaderValue::from(secs.max(1));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, msg).into_response();
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, val);
                response
            }
        }
    }
}
