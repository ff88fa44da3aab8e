use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use drip_limit::BucketConfig;
use drip_limit::LeakyBucket;
use drip_limit::Reason;
use drip_limit::Strategy;
use drip_limit::TimingProbe;
use quanta::Clock;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower::service_fn;

use super::*;

use futures::future::Ready;
use futures::future::ready;

#[derive(Clone, Debug)]
struct MockService {
    pub count: Arc<AtomicUsize>,
}

impl Service<()> for MockService {
    type Response = ();
    type Error = BoxError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        self.count.fetch_add(1, Ordering::SeqCst);
        ready(Ok(()))
    }
}

// A service that is never ready
#[derive(Clone, Debug)]
struct StalledService;

impl Service<()> for StalledService {
    type Response = ();
    type Error = BoxError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        ready(Ok(()))
    }
}

// A mock strategy that blocks exactly once, then allows everything
#[derive(Debug)]
struct InstantRecoveryStrategy {
    already_blocked: AtomicBool,
}

impl Strategy for InstantRecoveryStrategy {
    fn process(&self) -> ControlFlow<Reason> {
        if self.already_blocked.swap(true, Ordering::SeqCst) {
            ControlFlow::Continue(())
        } else {
            // Hint an immediate recovery
            ControlFlow::Break(Reason::Overloaded {
                min_wait: Duration::ZERO,
                max_wait: Duration::ZERO,
            })
        }
    }
}

fn mock_service() -> (MockService, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (
        MockService {
            count: count.clone(),
        },
        count,
    )
}

fn mock_bucket(cost_ms: u64, max_ms: u64) -> (Arc<LeakyBucket>, Arc<quanta::Mock>) {
    let (clock, mock) = Clock::mock();
    let config = BucketConfig::new(
        Duration::from_millis(cost_ms),
        Duration::from_millis(max_ms),
    );
    (
        Arc::new(LeakyBucket::with_clock(config, clock).unwrap()),
        mock,
    )
}

fn rate_limited(err: &BoxError) -> Option<DripError> {
    err.downcast_ref::<DripError>().cloned()
}

#[tokio::test]
async fn test_poll_ready_fails_fast() {
    let (bucket, mock) = mock_bucket(50, 100);
    let (svc, count) = mock_service();
    let mut service = RateLimitService::new(svc, bucket);

    service.ready().await.unwrap().call(()).await.unwrap();
    service.ready().await.unwrap().call(()).await.unwrap();

    // The bucket is full: readiness resolves at once with the hints
    let err = match futures::poll!(service.ready()) {
        Poll::Ready(Err(err)) => err,
        _ => panic!("Should be rejected without waiting"),
    };
    assert_eq!(
        rate_limited(&err),
        Some(DripError::RateLimited {
            min_wait: Duration::from_millis(50),
            max_wait: Duration::from_millis(100),
        })
    );
    assert_eq!(count.load(Ordering::SeqCst), 2);

    // Drain for min_wait and it admits again
    mock.increment(Duration::from_millis(50));
    service.ready().await.expect("Should recover");
    service.call(()).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_layer_integration() {
    let limiter = LeakyBucket::new(BucketConfig::new(
        Duration::from_millis(10),
        Duration::from_secs(1),
    ))
    .unwrap();

    let (svc, count) = mock_service();
    let mut service = tower::ServiceBuilder::new()
        .layer(RateLimitLayer::new(Arc::new(limiter)))
        .service(svc);

    // Verify it handles a basic request
    service.ready().await.unwrap().call(()).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shared_state_across_clones() {
    let (bucket, _mock) = mock_bucket(10_000, 10_000);
    let layer = RateLimitLayer::new(bucket);

    let (svc, _) = mock_service();
    let mut svc1 = layer.layer(svc.clone());
    let mut svc2 = layer.layer(svc);

    svc1.ready().await.unwrap().call(()).await.unwrap();

    // svc2 should now be rejected because svc1 filled the bucket
    let err = svc2.ready().await.unwrap_err();
    assert!(rate_limited(&err).is_some());
}

#[tokio::test]
async fn test_permit_is_not_charged_twice() {
    let (bucket, _mock) = mock_bucket(100, 200);
    let (svc, _) = mock_service();
    let mut service = RateLimitService::new(svc, bucket.clone());

    // Polling readiness repeatedly holds on to the first permit
    for _ in 0..5 {
        service.ready().await.unwrap();
    }
    assert_eq!(bucket.level(), Duration::from_millis(100));

    service.call(()).await.unwrap();
    service.ready().await.unwrap();
    assert_eq!(bucket.level(), Duration::from_millis(200));
}

#[tokio::test]
async fn test_unready_inner_service_does_not_charge() {
    let (bucket, _mock) = mock_bucket(100, 200);
    let mut service = RateLimitService::new(StalledService, bucket.clone());

    assert!(futures::poll!(service.ready()).is_pending());
    assert_eq!(bucket.level(), Duration::ZERO);
}

#[tokio::test]
async fn test_inner_errors_pass_through() {
    let (bucket, _mock) = mock_bucket(1, 1_000);
    let failing = service_fn(|_req: ()| async {
        Err::<(), BoxError>(Box::new(std::io::Error::other("disk on fire")))
    });
    let mut service = RateLimitLayer::new(bucket).layer(failing);

    let err = service.ready().await.unwrap().call(()).await.unwrap_err();
    assert!(rate_limited(&err).is_none());
    let io = err.downcast_ref::<std::io::Error>().expect("inner error kept");
    assert_eq!(io.to_string(), "disk on fire");
}

#[tokio::test]
async fn test_concurrent_hammer() {
    let capacity = 50;
    let (bucket, _mock) = mock_bucket(10, 10 * capacity as u64);

    let (mock, mock_count) = mock_service();
    let service = RateLimitService::new(mock, bucket);

    let mut handles = vec![];
    for _ in 0..100 {
        let mut svc = service.clone();
        handles.push(tokio::spawn(async move {
            svc.ready().await?;
            svc.call(()).await
        }));
    }

    let mut completed = 0;
    let mut rejected = 0;
    for h in handles {
        match h.await.expect("Task panicked") {
            Ok(()) => completed += 1,
            Err(err) => {
                assert!(rate_limited(&err).is_some(), "unexpected error: {err}");
                rejected += 1;
            }
        }
    }

    // Nothing waits, so every task finishes and exactly 'capacity' get through
    assert_eq!(
        mock_count.load(Ordering::SeqCst),
        capacity,
        "Limiter allowed more/less than capacity under pressure"
    );
    assert_eq!(completed, capacity);
    assert_eq!(rejected, 100 - capacity);
}

#[tokio::test]
async fn test_immediate_recovery() {
    let strategy = Arc::new(InstantRecoveryStrategy {
        already_blocked: AtomicBool::new(false),
    });
    let (mock, _) = mock_service();
    let mut service = RateLimitService::new(mock, strategy);

    // 1. The first poll sees the 'Break' and reports it, even with a 0ms hint
    let err = service.ready().await.unwrap_err();
    assert_eq!(
        rate_limited(&err),
        Some(DripError::RateLimited {
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        })
    );

    // 2. The caller retries and gets through
    service.ready().await.expect("Should recover on retry");
    service.call(()).await.unwrap();
}

#[tokio::test]
async fn test_timing_layer_records_calls() {
    let (clock, mock) = Clock::mock();
    let probe = TimingProbe::new(true, true).with_clock(clock);

    let svc = service_fn(move |req: u32| {
        let mock = mock.clone();
        async move {
            mock.increment(Duration::from_millis(40));
            Ok::<_, BoxError>(req * 2)
        }
    });
    let mut service = TimingLayer::new(probe).layer(svc);

    let timed = service.ready().await.unwrap().call(21).await.unwrap();
    assert_eq!(timed.run_time, Duration::from_millis(40));
    assert_eq!(timed.args, Some(21));
    assert_eq!(timed.output, Some(42));
}

#[tokio::test]
async fn test_timing_layer_passes_errors_through() {
    let svc = service_fn(|_req: ()| async { Err::<(), &'static str>("nope") });
    let mut service = TimingLayer::default().layer(svc);

    let err = service.ready().await.unwrap().call(()).await.unwrap_err();
    assert_eq!(err, "nope");
}

#[tokio::test]
async fn test_builder_extension_stack() {
    let (bucket, _mock) = mock_bucket(500, 1_000);
    let limiter: Arc<dyn Strategy + Send + Sync> = bucket;

    let mut service = ServiceBuilder::new()
        .leaky_rate_limit(limiter)
        .timed(TimingProbe::new(false, true))
        .service(service_fn(|name: &'static str| async move {
            Ok::<_, BoxError>(format!("hello {name}"))
        }));

    for _ in 0..2 {
        let timed = service.ready().await.unwrap().call("drip").await.unwrap();
        assert_eq!(timed.output.as_deref(), Some("hello drip"));
        assert_eq!(timed.args, None);
    }
    let err = service.ready().await.unwrap_err();
    assert!(rate_limited(&err).is_some());
}

#[tokio::test]
async fn test_boxed_limited_service() {
    let (bucket, _mock) = mock_bucket(1_000, 3_000);
    let (svc, count) = mock_service();
    let service = make_limited_svc(bucket, svc);

    let mut results = vec![];
    for _ in 0..5 {
        let mut s = service.clone();
        results.push(match s.ready().await {
            Ok(ready_svc) => ready_svc.call(()).await,
            Err(err) => Err(err),
        });
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(count.load(Ordering::SeqCst), 3);
}
