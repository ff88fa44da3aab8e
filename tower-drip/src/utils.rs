use std::sync::Arc;

use drip_limit::Strategy;
use drip_limit::TimingProbe;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::layer::util::Stack;
use tower::util::BoxCloneSyncService;

use crate::RateLimitLayer;
use crate::TimingLayer;

/// Rate limit a service and erase its type.
pub fn make_limited_svc<S, V, Req, Resp>(
    strategy: Arc<S>,
    svc: V,
) -> BoxCloneSyncService<Req, Resp, BoxError>
where
    S: Strategy + Send + Sync + 'static,
    Req: Send + 'static,
    V: Service<Req, Response = Resp, Error = BoxError> + Clone + Send + Sync + 'static,
    <V as Service<Req>>::Future: Send,
{
    BoxCloneSyncService::new(
        ServiceBuilder::new()
            .layer(RateLimitLayer::new(strategy))
            .service(svc),
    )
}

/// Service Builder Extension with additional useful functions for tower::ServiceBuilder.
pub trait ServiceBuilderExt<L> {
    /// Add a fail-fast rate limiting layer
    fn leaky_rate_limit(
        self,
        limiter: Arc<dyn Strategy + Send + Sync + 'static>,
    ) -> ServiceBuilder<Stack<RateLimitLayer<dyn Strategy + Send + Sync + 'static>, L>>;

    /// Add a timing layer
    fn timed(self, probe: TimingProbe) -> ServiceBuilder<Stack<TimingLayer, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn leaky_rate_limit(
        self,
        limiter: Arc<dyn Strategy + Send + Sync + 'static>,
    ) -> ServiceBuilder<Stack<RateLimitLayer<dyn Strategy + Send + Sync + 'static>, L>> {
        self.layer(RateLimitLayer::new(limiter))
    }

    fn timed(self, probe: TimingProbe) -> ServiceBuilder<Stack<TimingLayer, L>> {
        self.layer(TimingLayer::new(probe))
    }
}
