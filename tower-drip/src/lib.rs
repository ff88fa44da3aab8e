//! # Tower Drip
//!
//! `tower-drip` puts the [`drip_limit`] leaky bucket in front of any
//! [Tower](https://github.com/tower-rs/tower) service.
//!
//! ## Fail Fast
//! [`RateLimitLayer`] never waits for capacity. When the [`drip_limit::Strategy`]
//! rejects a request, `poll_ready` resolves straight away with
//! [`DripError::RateLimited`], which carries the same `min_wait`/`max_wait` hints
//! as [`drip_limit::RateLimitExceeded`]. Retrying, queuing or reporting the
//! rejection upstream is up to the caller.
//!
//! Errors returned by the inner service pass through unchanged, so a downcast to
//! [`DripError`] only ever matches the limiter's own rejections.
//!
//! ## Timing
//! [`TimingLayer`] measures the wall and CPU time of each call with a
//! [`drip_limit::TimingProbe`] and turns responses into [`drip_limit::Timed`]
//! records.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`DripError`], converting rejections into
//!   `429 Too Many Requests` with a `Retry-After` header.

mod error;
mod layer;
mod service;
mod timing_layer;
mod timing_service;
mod utils;

#[cfg(test)]
mod tests;

pub use error::DripError;
pub use layer::RateLimitLayer;
pub use service::RateLimitService;
pub use timing_layer::TimingLayer;
pub use timing_service::ResponseFuture as TimingFuture;
pub use timing_service::TimingService;
pub use utils::ServiceBuilderExt;
pub use utils::make_limited_svc;
