//! Request tracing and metrics for every route.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::metrics::{HttpLabels, HttpLabelsWithStatus, HttpMethod, Metrics};

/// Records count, latency, and in-flight gauge per route template.
///
/// The matched route (`/api/v1/buckets/{bucket}/metadata`) is used as the
/// endpoint label rather than the raw path, so label cardinality stays
/// bounded.
pub async fn track_requests(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = HttpMethod::from(request.method());
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let path = request.uri().path().to_string();

    metrics.http_requests_in_flight.inc();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();
    metrics.http_requests_in_flight.dec();

    let status = response.status().as_u16();
    metrics
        .http_request_duration_seconds
        .get_or_create(&HttpLabels {
            method: method.clone(),
            endpoint: endpoint.clone(),
        })
        .observe(elapsed.as_secs_f64());
    metrics
        .http_requests_total
        .get_or_create(&HttpLabelsWithStatus {
            method,
            endpoint,
            status,
        })
        .inc();

    tracing::debug!(%path, status, elapsed_ms = elapsed.as_millis() as u64, "request served");
    response
}
