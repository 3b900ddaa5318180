//! HTTP route handlers for the query server.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::Map;
use tokio_util::sync::CancellationToken;

use super::metrics::Metrics;
use super::request::{AfterParams, RangeParams};
use super::response::{ApiResponse, ServerInfo};
use crate::model::{BucketId, Tag};
use crate::query::{BucketInfo, QueryEngine, QueryResponse, TagRecord};
use crate::tags::TagStart;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub query: QueryEngine,
    pub metrics: Arc<Metrics>,
    pub info: Arc<ServerInfo>,
    /// Fires once the pipeline has stopped; readiness fails from then on.
    pub stopped: CancellationToken,
}

/// Handle GET /api/v1/buckets
pub async fn handle_list_buckets(
    State(state): State<AppState>,
    Query(params): Query<AfterParams>,
) -> ApiResponse<Vec<BucketInfo>> {
    state.query.list_buckets(params.after).await.into()
}

/// Handle GET /api/v1/buckets/{bucket}/metadata
pub async fn handle_bucket_metadata(
    State(state): State<AppState>,
    Path(bucket): Path<BucketId>,
) -> ApiResponse<Vec<String>> {
    state.query.bucket_metadata(bucket).await.into()
}

/// Handle GET /api/v1/tags
pub async fn handle_tags(
    State(state): State<AppState>,
    Query(params): Query<AfterParams>,
) -> ApiResponse<BTreeMap<Tag, TagStart>> {
    state.query.tags(params.after).await.into()
}

/// Handle GET /api/v1/tags/{tag}/buckets/{bucket}
pub async fn handle_tag_range(
    State(state): State<AppState>,
    Path((tag, bucket)): Path<(String, BucketId)>,
    Query(params): Query<RangeParams>,
) -> ApiResponse<Vec<TagRecord>> {
    let (start, end) = params.bounds();
    state
        .query
        .tag_data_range(&tag, bucket, start, end, false)
        .await
        .into()
}

/// Handle GET /api/v1/tags/{tag}/buckets/{bucket}/json
///
/// Same as the raw range, with structured fields decoded.
pub async fn handle_tag_range_json(
    State(state): State<AppState>,
    Path((tag, bucket)): Path<(String, BucketId)>,
    Query(params): Query<RangeParams>,
) -> ApiResponse<Vec<TagRecord>> {
    let (start, end) = params.bounds();
    state
        .query
        .tag_data_range(&tag, bucket, start, end, true)
        .await
        .into()
}

/// Handle GET /api/v1/info
pub async fn handle_info(State(state): State<AppState>) -> ApiResponse<ServerInfo> {
    ApiResponse(QueryResponse {
        payload: state.info.as_ref().clone(),
        errors: Vec::new(),
        meta: Map::new(),
    })
}

/// Handle GET /metrics
pub async fn handle_metrics(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

/// Handle GET /-/healthy
pub async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Handle GET /-/ready
pub async fn handle_ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.stopped.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "stopping")
    } else {
        (StatusCode::OK, "OK")
    }
}
