//! HTTP endpoint handlers.
//!
//! - `health`: liveness, readiness and Prometheus metrics
//! - `recommend`: dish recommendation and cluster diagnostics

pub mod health;
pub mod recommend;

use axum::Json;
use axum::response::IntoResponse;
use serde_json::json;

use super::error::ServerError;

/// Service name, version and the endpoint list.
pub async fn api_info() -> impl IntoResponse {
    Json(json!({
        "name": "dishrec",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/api/v1/recommend",
            "/api/v1/clusters",
            "/health",
            "/ready",
            "/metrics"
        ]
    }))
}

pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
