use std::ops::ControlFlow;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tower::BoxError;
use tower::Service;
use tracing::debug;

use drip_limit::Strategy;

use crate::error::DripError;

#[derive(Clone, Debug)]
struct RateLimitServiceMetrics {
    admitted: Counter<u64>,
    rejected: Counter<u64>,
}

/// Gates an inner service with a [`Strategy`].
///
/// Rejections are reported straight away from `poll_ready` as
/// [`DripError::RateLimited`]; the service never sleeps or queues waiting for
/// capacity. Inner service errors are passed through untouched.
#[derive(Debug)]
pub struct RateLimitService<L, S>
where
    L: ?Sized,
{
    inner: S,
    limiter: Arc<L>,
    permit_acquired: bool,
    instruments: RateLimitServiceMetrics,
}

// Manually implement Clone so that L does not need to be Clone
impl<L, S> Clone for RateLimitService<L, S>
where
    L: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            // A permit belongs to the instance that acquired it
            permit_acquired: false,
            instruments: self.instruments.clone(),
        }
    }
}

impl<L, S, Req> Service<Req> for RateLimitService<L, S>
where
    L: Strategy + ?Sized + Send + Sync + 'static,
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // 1. Check inner service readiness FIRST to avoid charging the bucket
        // for requests that cannot be sent yet
        match self.inner.poll_ready(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }

        // 2. Ask the strategy if we don't have a permit yet
        if !self.permit_acquired {
            let strategy = std::any::type_name::<L>();
            match self.limiter.process() {
                ControlFlow::Continue(_) => {
                    self.permit_acquired = true;
                    self.instruments
                        .admitted
                        .add(1, &[KeyValue::new("strategy", strategy)]);
                }
                ControlFlow::Break(reason) => {
                    self.instruments
                        .rejected
                        .add(1, &[KeyValue::new("strategy", strategy)]);
                    let err = DripError::from(reason);
                    debug!(%err, "Request rejected");
                    return Poll::Ready(Err(Box::new(err)));
                }
            }
        }

        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self.permit_acquired = false;
        self.inner.call(req)
    }
}

impl<L, S> RateLimitService<L, S>
where
    L: ?Sized,
{
    pub fn new(inner: S, limiter: Arc<L>) -> Self {
        let meter = global::meter("rate_limit_service");
        let instruments = RateLimitServiceMetrics {
            admitted: meter.u64_counter("admitted").build(),
            rejected: meter.u64_counter("rejected").build(),
        };

        Self {
            inner,
            limiter,
            permit_acquired: false,
            instruments,
        }
    }

    pub fn limiter(&self) -> &Arc<L> {
        &self.limiter
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}
