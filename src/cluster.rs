//! Pretrained coarse partition of the embedding space.
//!
//! The centroid set is produced off-line and handed to [`ClusterAssigner`]
//! read-only. [`ClusterAssignment`] caches the cluster of every catalog
//! record once, at load time; nothing here re-clusters at runtime.

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{RecordId, VectorCatalog};

pub type ClusterId = usize;

/// Errors raised by the cluster model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("cluster id {id} out of range ({clusters} clusters)")]
    OutOfRange { id: ClusterId, clusters: usize },
    #[error("invalid cluster model: {0}")]
    InvalidModel(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
}

/// Distance used both to train-time assign clusters and to rank neighbours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2 distance. On unit-length vectors this ranks identically to cosine.
    #[default]
    Euclidean,
    /// `1 - cosine similarity`.
    Cosine,
}

impl DistanceMetric {
    /// Lower means closer.
    pub fn distance(self, a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let dot = a.dot(&b);
                let norm_a = a.dot(&a).sqrt();
                let norm_b = b.dot(&b).sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
            }
        }
    }
}

/// Maps any vector to the nearest of `K` fixed centroids.
#[derive(Debug, Clone)]
pub struct ClusterAssigner {
    centroids: Array2<f32>,
    metric: DistanceMetric,
}

impl ClusterAssigner {
    pub fn new(centroids: Vec<Vec<f32>>, metric: DistanceMetric) -> Result<Self, ClusterError> {
        let Some(first) = centroids.first() else {
            return Err(ClusterError::InvalidModel("no centroids supplied".into()));
        };
        let dimension = first.len();
        if dimension == 0 {
            return Err(ClusterError::InvalidModel(
                "centroid dimension must be non-zero".into(),
            ));
        }

        let mut flat = Vec::with_capacity(centroids.len() * dimension);
        for (id, centroid) in centroids.iter().enumerate() {
            if centroid.len() != dimension {
                return Err(ClusterError::InvalidModel(format!(
                    "centroid {id} has dimension {}, expected {dimension}",
                    centroid.len()
                )));
            }
            if centroid.iter().any(|x| !x.is_finite()) {
                return Err(ClusterError::InvalidModel(format!(
                    "centroid {id} contains a non-finite component"
                )));
            }
            flat.extend_from_slice(centroid);
        }

        let centroids = Array2::from_shape_vec((centroids.len(), dimension), flat)
            .map_err(|e| ClusterError::InvalidModel(e.to_string()))?;
        Ok(Self { centroids, metric })
    }

    /// Nearest centroid; ties go to the lowest cluster id.
    pub fn assign(&self, vector: &[f32]) -> Result<ClusterId, ClusterError> {
        if vector.len() != self.dimension() {
            return Err(ClusterError::DimensionMismatch {
                expected: self.dimension(),
                got: vector.len(),
            });
        }
        Ok(self.assign_view(ArrayView1::from(vector)))
    }

    /// Caller guarantees the dimension matches.
    pub(crate) fn assign_view(&self, vector: ArrayView1<'_, f32>) -> ClusterId {
        let mut best = 0;
        let mut best_distance = f32::INFINITY;
        for (id, centroid) in self.centroids.rows().into_iter().enumerate() {
            let distance = self.metric.distance(vector, centroid);
            if distance < best_distance {
                best = id;
                best_distance = distance;
            }
        }
        best
    }

    pub fn centroid(&self, id: ClusterId) -> Result<ArrayView1<'_, f32>, ClusterError> {
        if id >= self.num_clusters() {
            return Err(ClusterError::OutOfRange {
                id,
                clusters: self.num_clusters(),
            });
        }
        Ok(self.centroids.row(id))
    }

    pub fn num_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn dimension(&self) -> usize {
        self.centroids.ncols()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

/// Cached record -> cluster mapping, fixed for the catalog's lifetime.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    labels: Vec<ClusterId>,
    members: Vec<Vec<RecordId>>,
}

impl ClusterAssignment {
    /// Assign every catalog record once.
    pub fn compute(
        catalog: &VectorCatalog,
        assigner: &ClusterAssigner,
    ) -> Result<Self, ClusterError> {
        check_dimensions(catalog, assigner)?;
        let labels: Vec<ClusterId> = (0..catalog.size())
            .into_par_iter()
            .map(|id| assigner.assign_view(catalog.vector_unchecked(id)))
            .collect();
        Ok(Self::from_valid_labels(labels, assigner.num_clusters()))
    }

    /// Adopt labels produced together with the centroids.
    pub fn from_labels(
        labels: Vec<ClusterId>,
        catalog: &VectorCatalog,
        assigner: &ClusterAssigner,
    ) -> Result<Self, ClusterError> {
        check_dimensions(catalog, assigner)?;
        if labels.len() != catalog.size() {
            return Err(ClusterError::ShapeMismatch(format!(
                "{} labels for {} catalog records",
                labels.len(),
                catalog.size()
            )));
        }
        let clusters = assigner.num_clusters();
        if let Some(&id) = labels.iter().find(|&&label| label >= clusters) {
            return Err(ClusterError::OutOfRange { id, clusters });
        }
        Ok(Self::from_valid_labels(labels, clusters))
    }

    fn from_valid_labels(labels: Vec<ClusterId>, clusters: usize) -> Self {
        let mut members = vec![Vec::new(); clusters];
        for (id, &label) in labels.iter().enumerate() {
            members[label].push(id);
        }
        Self { labels, members }
    }

    pub fn cluster_of(&self, id: RecordId) -> Option<ClusterId> {
        self.labels.get(id).copied()
    }

    /// Record ids in ascending order; empty for an unpopulated or unknown cluster.
    pub fn members(&self, cluster: ClusterId) -> &[RecordId] {
        self.members.get(cluster).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_clusters(&self) -> usize {
        self.members.len()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.members.iter().map(Vec::len).collect()
    }
}

fn check_dimensions(
    catalog: &VectorCatalog,
    assigner: &ClusterAssigner,
) -> Result<(), ClusterError> {
    if catalog.dimension() != assigner.dimension() {
        return Err(ClusterError::DimensionMismatch {
            expected: assigner.dimension(),
            got: catalog.dimension(),
        });
    }
    Ok(())
}
