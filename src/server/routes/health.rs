use std::sync::Arc;
use std::time::SystemTime;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use serde_json::json;

use crate::server::state::AppState;

static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Liveness: 200 whenever the process is serving.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "dishrec",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness. The engine is fully built before the listener binds, so this
/// reports what is loaded; clusters without records are listed because draws
/// landing on them answer 503.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = &state.engine;
    let empty_clusters: Vec<usize> = engine
        .cluster_summaries()
        .into_iter()
        .filter(|summary| summary.size == 0)
        .map(|summary| summary.id)
        .collect();
    let status = if empty_clusters.is_empty() {
        "ready"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "service": "dishrec",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "catalog": { "records": engine.catalog().size(), "dimension": engine.catalog().dimension() },
            "clusters": { "total": engine.assigner().num_clusters(), "empty": empty_clusters },
        }
    }))
}

/// Prometheus text exposition; empty when no recorder is installed.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
