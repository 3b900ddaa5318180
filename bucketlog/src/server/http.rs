//! HTTP server for the bucketlog query surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use super::handlers::{
    AppState, handle_bucket_metadata, handle_healthy, handle_info, handle_list_buckets,
    handle_metrics, handle_ready, handle_tag_range, handle_tag_range_json, handle_tags,
};
use super::metrics::Metrics;
use super::middleware::track_requests;
use super::response::ServerInfo;
use crate::config::HttpConfig;
use crate::error::Result;
use crate::metrics::IngestMetrics;
use crate::query::QueryEngine;

/// Builds the router with every route and the request middleware.
pub fn build_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    Router::new()
        .route("/api/v1/buckets", get(handle_list_buckets))
        .route("/api/v1/buckets/{bucket}/metadata", get(handle_bucket_metadata))
        .route("/api/v1/tags", get(handle_tags))
        .route("/api/v1/tags/{tag}/buckets/{bucket}", get(handle_tag_range))
        .route("/api/v1/tags/{tag}/buckets/{bucket}/json", get(handle_tag_range_json))
        .route("/api/v1/info", get(handle_info))
        .route("/metrics", get(handle_metrics))
        .route("/-/healthy", get(handle_healthy))
        .route("/-/ready", get(handle_ready))
        .layer(from_fn_with_state(metrics, track_requests))
        .with_state(state)
}

/// HTTP server for the query surface.
pub struct QueryServer {
    query: QueryEngine,
    ingest_metrics: IngestMetrics,
    config: HttpConfig,
    bucket_width_secs: u64,
    shutdown: CancellationToken,
}

impl QueryServer {
    /// Create a new query server that stops when `shutdown` fires.
    pub fn new(
        query: QueryEngine,
        ingest_metrics: IngestMetrics,
        config: HttpConfig,
        bucket_width_secs: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            query,
            ingest_metrics,
            config,
            bucket_width_secs,
            shutdown,
        }
    }

    /// Run the HTTP server until the shutdown token fires.
    pub async fn run(self) -> Result<()> {
        let metrics = Arc::new(Metrics::with_ingest(&self.ingest_metrics));
        let state = AppState {
            query: self.query,
            metrics,
            info: Arc::new(ServerInfo::new(self.bucket_width_secs)),
            stopped: self.shutdown.clone(),
        };
        let app = build_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        tracing::info!("Starting bucketlog HTTP server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(self.shutdown.cancelled_owned())
            .await?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}
