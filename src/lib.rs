//! Cluster-stratified dish recommendation.
//!
//! A static catalog of dish embeddings is partitioned by a fitted cluster
//! model. Each request draws a cluster from a biased distribution, builds a
//! query vector from the caller's texts that fall into that cluster, and
//! returns one of the nearest dishes inside it.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dishrec::{EngineConfig, StubEmbedder, load_engine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = load_engine(
//!     "data/catalog.json",
//!     "data/clusters.json",
//!     EngineConfig::default(),
//!     Arc::new(StubEmbedder::new(384, "stub")),
//! )?;
//! let dish = engine.recommend(&["chocolate", "strawberries"])?;
//! println!("{} ({})", dish.metadata.name, dish.metadata.image_url);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod embed;
pub mod engine;
pub mod index;
#[cfg(feature = "server")]
pub mod server;
pub mod source;

pub use catalog::{CatalogError, CatalogRecord, DishMetadata, RecordId, VectorCatalog};
pub use cluster::{ClusterAssigner, ClusterAssignment, ClusterError, ClusterId, DistanceMetric};
pub use config::{AppConfig, ConfigLoadError, DataConfig, ServerConfig};
#[cfg(feature = "api-embedder")]
pub use embed::ApiEmbedder;
pub use embed::{
    ApiProvider, Embedder, EmbedderConfig, EmbedderError, EmbedderMode, StubEmbedder,
    build_embedder, l2_normalize_in_place,
};
pub use engine::{
    ClusterPolicy, ClusterSummary, EngineConfig, QueryFallback, Recommendation, RecommendError,
    RecommendationEngine,
};
pub use index::{
    ClusterIndex, ClusterIndexArena, ClusterIndexBuilder, DEFAULT_PARALLEL_SCAN_THRESHOLD,
    IndexError, SearchHit,
};
pub use source::{
    CatalogEntry, ClusterModel, SourceError, load_catalog, load_cluster_model, load_engine,
};
