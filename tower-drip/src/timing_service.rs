use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::task::ready;

use drip_limit::Stopwatch;
use drip_limit::Timed;
use drip_limit::TimingProbe;
use pin_project_lite::pin_project;
use tower::Service;

/// Times each call to the inner service with a [`TimingProbe`].
///
/// Responses become [`Timed`] records. Errors from the inner service are returned
/// as they are, without timing information.
#[derive(Clone, Debug)]
pub struct TimingService<S> {
    inner: S,
    probe: TimingProbe,
}

pin_project! {
    /// A future that measures the inner service future.
    pub struct ResponseFuture<F, Req> {
        #[pin]
        inner: F,
        stopwatch: Stopwatch,
        args: Option<Req>,
        include_output: bool,
    }
}

impl<F, Req, T, E> Future for ResponseFuture<F, Req>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<Timed<Req, T>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let response = match ready!(this.inner.poll(cx)) {
            Ok(response) => response,
            Err(err) => return Poll::Ready(Err(err)),
        };
        let (run_time, run_clock) = this.stopwatch.stop();

        Poll::Ready(Ok(Timed {
            run_time,
            run_clock,
            args: this.args.take(),
            output: this.include_output.then_some(response),
        }))
    }
}

impl<S, Req> Service<Req> for TimingService<S>
where
    S: Service<Req>,
    Req: Clone,
{
    type Response = Timed<Req, S::Response>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, Req>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let args = self.probe.includes_input().then(|| req.clone());
        let stopwatch = self.probe.start();

        ResponseFuture {
            inner: self.inner.call(req),
            stopwatch,
            args,
            include_output: self.probe.includes_output(),
        }
    }
}

impl<S> TimingService<S> {
    pub fn new(inner: S, probe: TimingProbe) -> Self {
        Self { inner, probe }
    }
}
