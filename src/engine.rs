//! Request-time recommendation pipeline.
//!
//! Each request runs four steps against shared, read-only state:
//!
//! 1. draw a cluster from a biased distribution ([`ClusterPolicy`]),
//! 2. embed every input text, normalise it, classify it, and average the
//!    vectors that landed in the drawn cluster,
//! 3. search that cluster's precomputed index for the `top_k` nearest dishes,
//! 4. pick one of the candidates uniformly at random.
//!
//! The random source is injected per call, so tests can pin outcomes with a
//! seeded RNG while the service uses the thread-local one. No step mutates
//! shared state and no lock is taken, so requests run in parallel freely.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, DishMetadata, RecordId, VectorCatalog};
use crate::cluster::{ClusterAssigner, ClusterAssignment, ClusterError, ClusterId, DistanceMetric};
use crate::embed::{Embedder, EmbedderError, l2_normalize_in_place};
use crate::index::{
    ClusterIndexArena, ClusterIndexBuilder, DEFAULT_PARALLEL_SCAN_THRESHOLD, IndexError,
};

/// Errors produced while serving a recommendation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecommendError {
    #[error("at least one query text is required")]
    EmptyQuery,
    #[error("no recommendation available: cluster {cluster} has no catalog records")]
    RecommendationUnavailable { cluster: ClusterId },
    #[error("embedding failed for query text {index}: {source}")]
    EmbeddingFailure {
        index: usize,
        #[source]
        source: EmbedderError,
    },
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Representative used when no query text falls into the drawn cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryFallback {
    /// The all-zero vector.
    #[default]
    Zero,
    /// The drawn cluster's centroid.
    Centroid,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Probability of drawing cluster 0. The remaining mass is split evenly
    /// across the other clusters.
    pub cluster_bias: f64,
    /// Candidates retrieved before the random pick.
    pub top_k: usize,
    /// Distance the cluster model was trained with; ranking uses the same.
    pub metric: DistanceMetric,
    pub query_fallback: QueryFallback,
    /// Cluster size at which the flat scan goes parallel.
    pub parallel_scan_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster_bias: 0.7,
            top_k: 5,
            metric: DistanceMetric::Euclidean,
            query_fallback: QueryFallback::Zero,
            parallel_scan_threshold: DEFAULT_PARALLEL_SCAN_THRESHOLD,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), RecommendError> {
        if !(0.0..=1.0).contains(&self.cluster_bias) {
            return Err(RecommendError::InvalidConfig(format!(
                "cluster_bias must be within [0, 1], got {}",
                self.cluster_bias
            )));
        }
        if self.top_k == 0 {
            return Err(RecommendError::InvalidConfig("top_k must be >= 1".into()));
        }
        Ok(())
    }
}

/// Biased categorical distribution over cluster ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPolicy {
    weights: Vec<f64>,
}

impl ClusterPolicy {
    /// `bias` goes to cluster 0, `1 - bias` is shared by clusters `1..k`.
    /// With a single cluster it always wins.
    pub fn new(bias: f64, clusters: usize) -> Result<Self, RecommendError> {
        if clusters == 0 {
            return Err(RecommendError::InvalidConfig(
                "cluster policy needs at least one cluster".into(),
            ));
        }
        if !(0.0..=1.0).contains(&bias) {
            return Err(RecommendError::InvalidConfig(format!(
                "cluster_bias must be within [0, 1], got {bias}"
            )));
        }
        let weights = if clusters == 1 {
            vec![1.0]
        } else {
            let rest = (1.0 - bias) / (clusters - 1) as f64;
            std::iter::once(bias)
                .chain(std::iter::repeat_n(rest, clusters - 1))
                .collect()
        };
        Ok(Self { weights })
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> ClusterId {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for (cluster, weight) in self.weights.iter().enumerate() {
            cumulative += weight;
            if u < cumulative {
                return cluster;
            }
        }
        // Rounding can leave `u` just above the final cumulative sum.
        self.weights
            .iter()
            .rposition(|&w| w > 0.0)
            .unwrap_or(0)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// A single recommended dish plus how it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub record_id: RecordId,
    pub cluster: ClusterId,
    pub distance: f32,
    /// True when no query text landed in the drawn cluster and the configured
    /// fallback vector was searched instead. Such results are low quality.
    pub used_fallback_query: bool,
    pub metadata: DishMetadata,
}

/// Summary of one cluster for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub id: ClusterId,
    pub size: usize,
    pub weight: f64,
}

/// Shared, immutable recommendation core.
pub struct RecommendationEngine {
    catalog: Arc<VectorCatalog>,
    assigner: Arc<ClusterAssigner>,
    assignment: Arc<ClusterAssignment>,
    indexes: ClusterIndexArena,
    embedder: Arc<dyn Embedder>,
    policy: ClusterPolicy,
    config: EngineConfig,
}

impl fmt::Debug for RecommendationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecommendationEngine")
            .field("records", &self.catalog.size())
            .field("clusters", &self.assigner.num_clusters())
            .field("embedder", &self.embedder.model_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RecommendationEngine {
    /// Wire the engine together and precompute every cluster index.
    ///
    /// `labels` are adopted when the cluster model ships them; otherwise every
    /// catalog record is assigned once here.
    pub fn new(
        catalog: Arc<VectorCatalog>,
        assigner: ClusterAssigner,
        labels: Option<Vec<ClusterId>>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Result<Self, RecommendError> {
        config.validate()?;
        if config.metric != assigner.metric() {
            return Err(RecommendError::InvalidConfig(format!(
                "engine metric {:?} differs from cluster model metric {:?}",
                config.metric,
                assigner.metric()
            )));
        }

        let assignment = match labels {
            Some(labels) => ClusterAssignment::from_labels(labels, &catalog, &assigner)?,
            None => ClusterAssignment::compute(&catalog, &assigner)?,
        };
        let assignment = Arc::new(assignment);
        let policy = ClusterPolicy::new(config.cluster_bias, assigner.num_clusters())?;

        let indexes = ClusterIndexBuilder::new(
            Arc::clone(&catalog),
            Arc::clone(&assignment),
            assigner.metric(),
        )
        .with_parallel_threshold(config.parallel_scan_threshold)
        .build_all();

        tracing::info!(
            records = catalog.size(),
            clusters = assigner.num_clusters(),
            sizes = ?assignment.sizes(),
            weights = ?policy.weights(),
            embedder = embedder.model_name(),
            "recommendation engine ready"
        );

        Ok(Self {
            catalog,
            assigner: Arc::new(assigner),
            assignment,
            indexes,
            embedder,
            policy,
            config,
        })
    }

    /// Recommend using the thread-local random source.
    pub fn recommend<S: AsRef<str>>(&self, texts: &[S]) -> Result<Recommendation, RecommendError> {
        self.recommend_with_rng(texts, &mut rand::rng())
    }

    /// Recommend with an explicit random source.
    pub fn recommend_with_rng<S, R>(
        &self,
        texts: &[S],
        rng: &mut R,
    ) -> Result<Recommendation, RecommendError>
    where
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        if texts.is_empty() {
            return Err(RecommendError::EmptyQuery);
        }

        let cluster = self.policy.draw(rng);
        let index = self.indexes.get(cluster).map_err(|err| match err {
            IndexError::EmptyCluster(cluster) => {
                RecommendError::RecommendationUnavailable { cluster }
            }
            other => other.into(),
        })?;

        let (query, used_fallback_query) = self.query_representative(texts, cluster)?;
        let hits = index.search(&query, self.config.top_k)?;

        // The cluster is non-empty and top_k >= 1, so there is at least one hit.
        let pick = hits[rng.random_range(0..hits.len())];
        let record = self.catalog.get(pick.id)?;

        tracing::debug!(
            cluster,
            candidates = hits.len(),
            record = pick.id,
            distance = pick.distance,
            fallback = used_fallback_query,
            "recommendation selected"
        );

        Ok(Recommendation {
            record_id: pick.id,
            cluster,
            distance: pick.distance,
            used_fallback_query,
            metadata: record.metadata.clone(),
        })
    }

    /// Mean of the normalised query embeddings assigned to `cluster`, or the
    /// configured fallback when none are. The flag reports the fallback.
    pub fn query_representative<S: AsRef<str>>(
        &self,
        texts: &[S],
        cluster: ClusterId,
    ) -> Result<(Vec<f32>, bool), RecommendError> {
        let dimension = self.catalog.dimension();
        let mut sum = Array1::<f32>::zeros(dimension);
        let mut matched = 0usize;

        for (index, text) in texts.iter().enumerate() {
            let mut vector = self.embed_checked(index, text.as_ref())?;
            l2_normalize_in_place(&mut vector);
            if self.assigner.assign(&vector)? == cluster {
                sum += &ArrayView1::from(&vector[..]);
                matched += 1;
            }
        }

        if matched > 0 {
            sum /= matched as f32;
            return Ok((sum.to_vec(), false));
        }

        tracing::warn!(
            cluster,
            texts = texts.len(),
            fallback = ?self.config.query_fallback,
            "no query text fell into the drawn cluster; searching with fallback vector"
        );
        let fallback = match self.config.query_fallback {
            QueryFallback::Zero => vec![0.0; dimension],
            QueryFallback::Centroid => self.assigner.centroid(cluster)?.to_vec(),
        };
        Ok((fallback, true))
    }

    fn embed_checked(&self, index: usize, text: &str) -> Result<Vec<f32>, RecommendError> {
        let failure = |source| RecommendError::EmbeddingFailure { index, source };
        let vector = self.embedder.embed(text).map_err(failure)?;
        let expected = self.catalog.dimension();
        if vector.len() != expected {
            return Err(failure(EmbedderError::DimensionMismatch {
                expected,
                got: vector.len(),
            }));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(failure(EmbedderError::InvalidResponse(
                "embedding contains a non-finite component".into(),
            )));
        }
        Ok(vector)
    }

    pub fn cluster_summaries(&self) -> Vec<ClusterSummary> {
        self.assignment
            .sizes()
            .into_iter()
            .zip(self.policy.weights())
            .enumerate()
            .map(|(id, (size, &weight))| ClusterSummary { id, size, weight })
            .collect()
    }

    pub fn catalog(&self) -> &VectorCatalog {
        &self.catalog
    }

    pub fn assigner(&self) -> &ClusterAssigner {
        &self.assigner
    }

    pub fn assignment(&self) -> &ClusterAssignment {
        &self.assignment
    }

    pub fn indexes(&self) -> &ClusterIndexArena {
        &self.indexes
    }

    pub fn policy(&self) -> &ClusterPolicy {
        &self.policy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::dish;
    use crate::embed::StubEmbedder;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    /// Embeds known phrases to fixed vectors.
    struct LookupEmbedder(HashMap<&'static str, Vec<f32>>);

    impl Embedder for LookupEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.0
                .get(text)
                .cloned()
                .ok_or_else(|| EmbedderError::Request(format!("unknown text {text:?}")))
        }

        fn model_name(&self) -> &str {
            "lookup"
        }
    }

    fn lookup() -> Arc<dyn Embedder> {
        Arc::new(LookupEmbedder(HashMap::from([
            ("savory", vec![0.5, 0.5]),
            ("left", vec![3.0, 1.0]),
            ("left-flat", vec![2.0, 0.0]),
            ("right", vec![1.0, 3.0]),
            ("short", vec![1.0]),
        ])))
    }

    fn engine_with(
        vectors: Vec<Vec<f32>>,
        centroids: Vec<Vec<f32>>,
        config: EngineConfig,
    ) -> RecommendationEngine {
        let names = (0..vectors.len()).map(|i| dish(&format!("dish-{i}"))).collect();
        let catalog = VectorCatalog::load(vectors, names).unwrap();
        let assigner = ClusterAssigner::new(centroids, DistanceMetric::Euclidean).unwrap();
        RecommendationEngine::new(Arc::new(catalog), assigner, None, lookup(), config).unwrap()
    }

    /// Five-record catalog with centroids at (0,0) and (10,10).
    fn engine(config: EngineConfig) -> RecommendationEngine {
        engine_with(
            vec![
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
                vec![10.0, 9.0],
                vec![9.0, 10.0],
            ],
            vec![vec![0.0, 0.0], vec![10.0, 10.0]],
            config,
        )
    }

    /// Unit-circle catalog split by the diagonal, centroids at (1,0) and (0,1).
    fn split_engine(config: EngineConfig) -> RecommendationEngine {
        engine_with(
            vec![
                vec![1.0, 0.1],
                vec![0.9, 0.2],
                vec![0.1, 1.0],
                vec![0.2, 0.9],
            ],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            config,
        )
    }

    #[test]
    fn debug_summarises_without_embedder_internals() {
        let rendered = format!("{:?}", engine(EngineConfig::default()));
        assert!(rendered.starts_with("RecommendationEngine"));
        assert!(rendered.contains("records: 5"));
        assert!(rendered.contains("clusters: 2"));
        assert!(rendered.contains("\"lookup\""));
    }

    #[test]
    fn policy_weights_split_remainder() {
        let policy = ClusterPolicy::new(0.7, 3).unwrap();
        let w = policy.weights();
        assert_eq!(w.len(), 3);
        assert!((w[0] - 0.7).abs() < 1e-12);
        assert!((w[1] - 0.15).abs() < 1e-12);
        assert!((w[2] - 0.15).abs() < 1e-12);

        assert_eq!(ClusterPolicy::new(0.2, 1).unwrap().weights(), &[1.0]);
    }

    #[test]
    fn policy_rejects_bad_bias() {
        assert!(ClusterPolicy::new(1.5, 2).is_err());
        assert!(ClusterPolicy::new(f64::NAN, 2).is_err());
        assert!(ClusterPolicy::new(0.5, 0).is_err());
    }

    #[test]
    fn policy_extremes_are_deterministic() {
        let mut rng = StdRng::seed_from_u64(1);
        let always_zero = ClusterPolicy::new(1.0, 2).unwrap();
        let never_zero = ClusterPolicy::new(0.0, 2).unwrap();
        for _ in 0..100 {
            assert_eq!(always_zero.draw(&mut rng), 0);
            assert_eq!(never_zero.draw(&mut rng), 1);
        }
    }

    #[test]
    fn recommends_from_drawn_cluster() {
        let engine = engine(EngineConfig {
            cluster_bias: 1.0,
            top_k: 2,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let rec = engine.recommend_with_rng(&["savory"], &mut rng).unwrap();
            assert_eq!(rec.cluster, 0);
            assert!(rec.record_id <= 2);
            assert!(!rec.used_fallback_query);
        }
    }

    #[test]
    fn representative_averages_matching_texts_only() {
        let engine = split_engine(EngineConfig::default());
        let (query, fallback) = engine
            .query_representative(&["left", "right", "left-flat"], 0)
            .unwrap();
        assert!(!fallback);
        // mean of (3,1)/sqrt(10) and (1,0); "right" belongs to cluster 1
        let expected = [(3.0 / 10f32.sqrt() + 1.0) / 2.0, (1.0 / 10f32.sqrt()) / 2.0];
        assert!((query[0] - expected[0]).abs() < 1e-6);
        assert!((query[1] - expected[1]).abs() < 1e-6);
    }

    #[test]
    fn representative_is_unit_length_for_single_text() {
        let engine = engine(EngineConfig::default());
        let (query, fallback) = engine.query_representative(&["savory"], 0).unwrap();
        assert!(!fallback);
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((query[0] - expected).abs() < 1e-6);
        assert!((query[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn representative_falls_back_to_zero() {
        let engine = split_engine(EngineConfig::default());
        let (query, fallback) = engine.query_representative(&["left"], 1).unwrap();
        assert!(fallback);
        assert_eq!(query, vec![0.0, 0.0]);
    }

    #[test]
    fn representative_falls_back_to_centroid() {
        let engine = engine(EngineConfig {
            query_fallback: QueryFallback::Centroid,
            ..Default::default()
        });
        let (query, fallback) = engine.query_representative(&["savory"], 1).unwrap();
        assert!(fallback);
        assert_eq!(query, vec![10.0, 10.0]);
    }

    #[test]
    fn fallback_query_still_recommends_within_cluster() {
        let engine = split_engine(EngineConfig {
            cluster_bias: 0.0,
            top_k: 1,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(3);
        let rec = engine.recommend_with_rng(&["left"], &mut rng).unwrap();
        assert_eq!(rec.cluster, 1);
        assert!(rec.used_fallback_query);
        assert!(rec.record_id == 2 || rec.record_id == 3);
    }

    #[test]
    fn empty_query_rejected() {
        let engine = engine(EngineConfig::default());
        let texts: [&str; 0] = [];
        assert_eq!(
            engine.recommend(&texts).unwrap_err(),
            RecommendError::EmptyQuery
        );
    }

    #[test]
    fn embedder_failure_fails_whole_request() {
        let engine = engine(EngineConfig {
            cluster_bias: 1.0,
            ..Default::default()
        });
        let err = engine.recommend(&["savory", "unknown"]).unwrap_err();
        assert!(matches!(
            err,
            RecommendError::EmbeddingFailure {
                index: 1,
                source: EmbedderError::Request(_)
            }
        ));
    }

    #[test]
    fn wrong_dimension_embedding_is_embedding_failure() {
        let engine = engine(EngineConfig {
            cluster_bias: 1.0,
            ..Default::default()
        });
        let err = engine.recommend(&["short"]).unwrap_err();
        assert!(matches!(
            err,
            RecommendError::EmbeddingFailure {
                index: 0,
                source: EmbedderError::DimensionMismatch {
                    expected: 2,
                    got: 1
                }
            }
        ));
    }

    #[test]
    fn metric_disagreement_is_rejected() {
        let catalog = VectorCatalog::load(vec![vec![0.0, 1.0]], vec![dish("a")]).unwrap();
        let assigner =
            ClusterAssigner::new(vec![vec![0.0, 0.0]], DistanceMetric::Cosine).unwrap();
        let result = RecommendationEngine::new(
            Arc::new(catalog),
            assigner,
            None,
            Arc::new(StubEmbedder::new(2, "stub")),
            EngineConfig::default(),
        );
        assert!(matches!(result, Err(RecommendError::InvalidConfig(_))));
    }

    #[test]
    fn summaries_report_sizes_and_weights() {
        let engine = engine(EngineConfig::default());
        let summaries = engine.cluster_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].size, 3);
        assert_eq!(summaries[1].size, 2);
        assert!((summaries[0].weight - 0.7).abs() < 1e-12);
    }
}
