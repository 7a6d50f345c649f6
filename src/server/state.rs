use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::AppConfig;
use crate::embed::build_embedder;
use crate::engine::RecommendationEngine;
use crate::source::load_engine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Immutable after start-up; handlers only ever read it.
    pub engine: Arc<RecommendationEngine>,

    /// Present when a Prometheus recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: AppConfig, engine: RecommendationEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            metrics: None,
        }
    }

    /// Build the embedder, load the data files and precompute every index.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let embedder = build_embedder(&config.embedder).context("building embedder")?;
        let engine = load_engine(
            &config.data.catalog_path,
            &config.data.model_path,
            config.engine.clone(),
            embedder,
        )
        .context("loading recommendation data")?;

        let dimension = engine.catalog().dimension();
        anyhow::ensure!(
            dimension == config.embedder.dimension,
            "embedder.dimension is {} but catalog vectors have {} components",
            config.embedder.dimension,
            dimension
        );

        Ok(Self::new(config, engine))
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
