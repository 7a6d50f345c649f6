use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::catalog::DishMetadata;
use crate::engine::{ClusterSummary, Recommendation};
use crate::server::error::{ServerError, ServerResult};
use crate::server::state::AppState;

pub const CLUSTER_HEADER: HeaderName = HeaderName::from_static("x-dishrec-cluster");
pub const FALLBACK_HEADER: HeaderName = HeaderName::from_static("x-dishrec-fallback-query");

/// Query texts, either as a bare JSON array or wrapped in an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecommendRequest {
    Texts(Vec<String>),
    Wrapped { texts: Vec<String> },
}

impl RecommendRequest {
    pub fn into_texts(self) -> Vec<String> {
        match self {
            RecommendRequest::Texts(texts) | RecommendRequest::Wrapped { texts } => texts,
        }
    }
}

/// Dish fields under the column names the first clients read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyDish {
    pub name: String,
    pub description: String,
    pub image: String,
    pub ingredients: String,
    pub category: String,
}

impl From<DishMetadata> for LegacyDish {
    fn from(meta: DishMetadata) -> Self {
        Self {
            name: meta.name,
            description: meta.description,
            image: meta.image_url,
            ingredients: meta.ingredients,
            category: meta.category,
        }
    }
}

/// Recommend one dish for the given texts.
///
/// Responds with the dish metadata object. The drawn cluster and whether the
/// fallback query vector was used are reported in `x-dishrec-cluster` and
/// `x-dishrec-fallback-query`.
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> ServerResult<Response> {
    let recommendation = run(&state, payload).await?;
    let headers = recommendation_headers(&recommendation);
    Ok((headers, Json(recommendation.metadata)).into_response())
}

/// Same pipeline as [`recommend`], answered with a [`LegacyDish`] body.
pub async fn recommend_legacy(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> ServerResult<Response> {
    let recommendation = run(&state, payload).await?;
    let headers = recommendation_headers(&recommendation);
    Ok((headers, Json(LegacyDish::from(recommendation.metadata))).into_response())
}

async fn run(
    state: &AppState,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> ServerResult<Recommendation> {
    let Json(request) = payload.map_err(|rejection| {
        let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(state.config.server.max_body_size_kb)
        } else {
            ServerError::BadRequest(rejection.body_text())
        };
        record_error(&err);
        err
    })?;
    let texts = request.into_texts();

    let start = Instant::now();
    let engine = Arc::clone(&state.engine);
    // Embedding may block on network I/O.
    let outcome = tokio::task::spawn_blocking(move || engine.recommend(texts.as_slice())).await?;
    metrics::histogram!("dishrec_recommendation_seconds").record(start.elapsed().as_secs_f64());

    let recommendation = outcome.map_err(|err| {
        let err = ServerError::from(err);
        record_error(&err);
        err
    })?;
    record_success(&recommendation);
    Ok(recommendation)
}

fn record_error(err: &ServerError) {
    metrics::counter!("dishrec_recommendation_errors_total", "code" => err.error_code())
        .increment(1);
}

fn record_success(recommendation: &Recommendation) {
    metrics::counter!(
        "dishrec_recommendations_total",
        "cluster" => recommendation.cluster.to_string()
    )
    .increment(1);
    if recommendation.used_fallback_query {
        metrics::counter!("dishrec_fallback_queries_total").increment(1);
    }
}

fn recommendation_headers(recommendation: &Recommendation) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CLUSTER_HEADER, HeaderValue::from(recommendation.cluster));
    headers.insert(
        FALLBACK_HEADER,
        HeaderValue::from_static(if recommendation.used_fallback_query {
            "true"
        } else {
            "false"
        }),
    );
    headers
}

#[derive(Debug, Serialize)]
pub struct ClustersResponse {
    pub total_records: usize,
    pub clusters: Vec<ClusterSummary>,
}

/// Cluster ids with their sizes and draw weights.
pub async fn list_clusters(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ClustersResponse {
        total_records: state.engine.catalog().size(),
        clusters: state.engine.cluster_summaries(),
    })
}
