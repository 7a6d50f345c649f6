use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterError;
use crate::engine::RecommendError;
use crate::index::IndexError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: max {0}KB allowed")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Recommend(#[from] RecommendError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,

    #[error("Request timeout")]
    Timeout,
}

/// API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Recommend(err) => match err {
                RecommendError::EmptyQuery => StatusCode::BAD_REQUEST,
                RecommendError::EmbeddingFailure { .. } => StatusCode::BAD_GATEWAY,
                RecommendError::RecommendationUnavailable { .. }
                | RecommendError::Index(IndexError::EmptyCluster(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                RecommendError::Cluster(ClusterError::DimensionMismatch { .. })
                | RecommendError::Index(IndexError::DimensionMismatch { .. }) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "BAD_REQUEST",
            StatusCode::NOT_FOUND => "NOT_FOUND",
            StatusCode::REQUEST_TIMEOUT => "REQUEST_TIMEOUT",
            StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
            StatusCode::BAD_GATEWAY => "EMBEDDING_FAILURE",
            StatusCode::SERVICE_UNAVAILABLE => "RECOMMENDATION_UNAVAILABLE",
            StatusCode::UNPROCESSABLE_ENTITY => "DIMENSION_MISMATCH",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("recommendation task failed: {err}"))
    }
}
