use axum::{
    Router, error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse,
    routing::get,
};
use drip_limit::{BucketConfig, LeakyBucket};
use std::sync::Arc;
use std::time::Duration;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_drip::{DripError, RateLimitLayer};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Setup Strategy: one request every 100ms, bursts of up to 10
    let config = BucketConfig::new(Duration::from_millis(100), Duration::from_secs(1));
    let bucket = Arc::new(LeakyBucket::new(config)?);

    // 2. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Drip!" }))
        .layer(
            ServiceBuilder::new()
                // 1. The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_drip_error))
                // 2. The middle layer: rejects with DripError when the bucket is full
                .layer(RateLimitLayer::new(bucket))
                // 3. Converts the Route's Infallible to BoxError
                // so that RateLimitLayer is happy wrapping it.
                .map_err(BoxError::from),
        );

    // 3. Serve
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    println!("📡 Listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await?;
    Ok(())
}

/// The signature must match BoxError -> IntoResponse
async fn handle_drip_error(err: BoxError) -> impl IntoResponse {
    if let Some(drip_err) = err.downcast_ref::<DripError>() {
        drip_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
