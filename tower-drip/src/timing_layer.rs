use drip_limit::TimingProbe;
use tower::Layer;

use crate::timing_service::TimingService;

/// Wraps services in a [`TimingService`].
#[derive(Clone, Debug, Default)]
pub struct TimingLayer {
    probe: TimingProbe,
}

impl TimingLayer {
    pub fn new(probe: TimingProbe) -> Self {
        Self { probe }
    }
}

impl<S> Layer<S> for TimingLayer {
    type Service = TimingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimingService::new(inner, self.probe.clone())
    }
}
