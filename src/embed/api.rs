use std::time::Duration;

use serde_json::{Value, json};
use ureq::{Agent, AgentBuilder};

use super::{ApiProvider, Embedder, EmbedderConfig, EmbedderError};

/// Synchronous client for a remote sentence-embedding endpoint.
///
/// Supports the HuggingFace inference API (`{"inputs": ...}`), the OpenAI
/// embeddings API (`{"input": ..., "model": ...}`) and a custom
/// `{"text": ...}` shape answered with `{"embedding": [...]}`.
pub struct ApiEmbedder {
    agent: Agent,
    url: String,
    auth_header: Option<String>,
    provider: ApiProvider,
    model_name: String,
}

impl ApiEmbedder {
    pub fn from_config(cfg: &EmbedderConfig) -> Result<Self, EmbedderError> {
        let url = cfg.api_url.clone().ok_or_else(|| {
            EmbedderError::InvalidConfig("api_url is required for api mode".into())
        })?;
        let agent = AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.api_timeout_secs))
            .build();
        Ok(Self {
            agent,
            url,
            auth_header: cfg.api_auth_header.clone(),
            provider: ApiProvider::from_hint(cfg.api_provider.as_deref())?,
            model_name: cfg.model_name.clone(),
        })
    }

    fn payload(&self, text: &str) -> Value {
        match self.provider {
            ApiProvider::HuggingFace => json!({ "inputs": text }),
            ApiProvider::OpenAI => json!({ "input": text, "model": self.model_name }),
            ApiProvider::Custom => json!({ "text": text }),
        }
    }

    fn send(&self, payload: Value) -> Result<Value, EmbedderError> {
        let mut request = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json");
        if let Some(header) = self.auth_header.as_deref() {
            request = request.set("Authorization", header);
        }

        let response = request
            .send_string(&payload.to_string())
            .map_err(|e| EmbedderError::Request(e.to_string()))?;
        let body = response
            .into_string()
            .map_err(|e| EmbedderError::Request(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| EmbedderError::InvalidResponse(e.to_string()))
    }
}

impl Embedder for ApiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let response = self.send(self.payload(text))?;
        let mut vectors = parse_embeddings_from_value(response)?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            0 => Err(EmbedderError::InvalidResponse(
                "response did not contain an embedding".into(),
            )),
            n => Err(EmbedderError::InvalidResponse(format!(
                "expected one embedding, got {n}"
            ))),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn parse_embeddings_from_value(value: Value) -> Result<Vec<Vec<f32>>, EmbedderError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embedding) = map.remove("embedding") {
                return parse_embedding_vector(embedding).map(|v| vec![v]);
            }
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_embedding_collection(embeddings);
            }
            if let Some(Value::Array(items)) = map.remove("data") {
                return items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(mut obj) => obj
                            .remove("embedding")
                            .ok_or_else(|| {
                                EmbedderError::InvalidResponse(
                                    "missing `embedding` field in data item".into(),
                                )
                            })
                            .and_then(parse_embedding_vector),
                        _ => Err(EmbedderError::InvalidResponse(
                            "unexpected entry inside `data` array".into(),
                        )),
                    })
                    .collect();
            }
            Err(EmbedderError::InvalidResponse(
                "unsupported response shape".into(),
            ))
        }
        other => parse_embedding_collection(other),
    }
}

fn parse_embedding_collection(value: Value) -> Result<Vec<Vec<f32>>, EmbedderError> {
    match value {
        Value::Array(items) if items.iter().all(|item| matches!(item, Value::Array(_))) => {
            items.into_iter().map(parse_embedding_vector).collect()
        }
        other => parse_embedding_vector(other).map(|v| vec![v]),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, EmbedderError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num.as_f64().map(|f| f as f32).ok_or_else(|| {
                    EmbedderError::InvalidResponse("non-finite embedding value".into())
                }),
                other => Err(EmbedderError::InvalidResponse(format!(
                    "embedding entries must be numbers, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(EmbedderError::InvalidResponse(format!(
            "embedding vector must be an array, got {other:?}"
        ))),
    }
}
