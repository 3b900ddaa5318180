//! HTTP response types for the query server.

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::query::QueryResponse;

/// API version reported by `/api/v1/info`.
pub const API_VERSION: &str = "v1";

/// Payload of `/api/v1/info`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub api: String,
    pub host: String,
    pub started: String,
    pub bucket_width_secs: u64,
}

impl ServerInfo {
    pub fn new(bucket_width_secs: u64) -> Self {
        Self {
            api: API_VERSION.to_string(),
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            started: chrono::Utc::now().to_rfc3339(),
            bucket_width_secs,
        }
    }
}

/// JSON envelope response. Always HTTP 200; problems travel in `errors`.
pub struct ApiResponse<T>(pub QueryResponse<T>);

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

impl<T> From<QueryResponse<T>> for ApiResponse<T> {
    fn from(response: QueryResponse<T>) -> Self {
        ApiResponse(response)
    }
}
