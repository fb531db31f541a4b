//! Gateway middleware

pub mod auth;
pub mod rate_limit;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use studybuddy_common::metrics::RequestMetrics;

/// Record request count and latency per route template.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let tracker = RequestMetrics::start(request.method().as_str(), &path);

    let response = next.run(request).await;
    tracker.finish(response.status().as_u16());
    response
}
