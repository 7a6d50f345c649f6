//! Text-to-vector collaborators.
//!
//! The recommendation core only needs `embed(text) -> Vec<f32>`. Two
//! implementations ship with the crate: a deterministic hash-based
//! [`StubEmbedder`] for tests and offline demos, and (feature
//! `api-embedder`) an [`ApiEmbedder`] that calls a remote inference endpoint.

#[cfg(feature = "api-embedder")]
mod api;
mod normalize;
mod stub;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "api-embedder")]
pub use api::ApiEmbedder;
pub use normalize::l2_normalize_in_place;
pub use stub::StubEmbedder;

/// Errors surfaced by an [`Embedder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbedderError {
    /// Configuration is inconsistent (e.g. `api` mode without a URL).
    #[error("invalid embedder config: {0}")]
    InvalidConfig(String),
    /// Transport failure talking to the embedding service.
    #[error("embedding request failed: {0}")]
    Request(String),
    /// The service answered with something that is not an embedding.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    /// The vector does not have the catalog dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Opaque text -> fixed-length vector function.
///
/// Implementations may block on I/O; callers must not hold locks across
/// `embed`.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Label surfaced in logs.
    fn model_name(&self) -> &str;
}

/// Which embedder the service runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderMode {
    /// Deterministic hash-derived vectors.
    #[default]
    Stub,
    /// Remote HTTP inference endpoint.
    Api,
}

/// Request/response shape spoken by a remote embedding endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiProvider {
    HuggingFace,
    OpenAI,
    Custom,
}

impl ApiProvider {
    /// Parse a configured provider hint. `None` means `custom`.
    pub fn from_hint(hint: Option<&str>) -> Result<Self, EmbedderError> {
        let Some(hint) = hint else {
            return Ok(ApiProvider::Custom);
        };
        match hint.to_ascii_lowercase().as_str() {
            "hf" | "huggingface" => Ok(ApiProvider::HuggingFace),
            "openai" | "gpt" => Ok(ApiProvider::OpenAI),
            "custom" => Ok(ApiProvider::Custom),
            other => Err(EmbedderError::InvalidConfig(format!(
                "unknown embedder.api_provider {other:?} (expected hf, openai or custom)"
            ))),
        }
    }
}

/// Runtime configuration for the embedding collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub mode: EmbedderMode,
    /// Output dimension `F`. Must equal the catalog dimension.
    pub dimension: usize,
    /// Friendly label; also sent as `model` to OpenAI-style providers.
    pub model_name: String,
    /// Inference endpoint when `mode` is `api`.
    pub api_url: Option<String>,
    /// Authorization header value (e.g. `"Bearer hf_xxx"`).
    pub api_auth_header: Option<String>,
    /// Remote provider hint: `"hf"`, `"openai"`, or `"custom"` (default).
    pub api_provider: Option<String>,
    pub api_timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            mode: EmbedderMode::Stub,
            dimension: 384,
            model_name: "all-MiniLM-L6-v2".into(),
            api_url: None,
            api_auth_header: None,
            api_provider: None,
            api_timeout_secs: 30,
        }
    }
}

impl EmbedderConfig {
    pub fn validate(&self) -> Result<(), EmbedderError> {
        if self.dimension == 0 {
            return Err(EmbedderError::InvalidConfig(
                "embedder.dimension must be >= 1".into(),
            ));
        }
        if self.mode == EmbedderMode::Api && self.api_url.is_none() {
            return Err(EmbedderError::InvalidConfig(
                "embedder.api_url is required for api mode".into(),
            ));
        }
        ApiProvider::from_hint(self.api_provider.as_deref())?;
        Ok(())
    }
}

/// Construct the embedder selected by `cfg`.
pub fn build_embedder(cfg: &EmbedderConfig) -> Result<Arc<dyn Embedder>, EmbedderError> {
    cfg.validate()?;
    match cfg.mode {
        EmbedderMode::Stub => Ok(Arc::new(StubEmbedder::new(
            cfg.dimension,
            cfg.model_name.clone(),
        ))),
        #[cfg(feature = "api-embedder")]
        EmbedderMode::Api => Ok(Arc::new(ApiEmbedder::from_config(cfg)?)),
        #[cfg(not(feature = "api-embedder"))]
        EmbedderMode::Api => Err(EmbedderError::InvalidConfig(
            "built without the `api-embedder` feature".into(),
        )),
    }
}
