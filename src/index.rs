//! Exact nearest-neighbour search restricted to one cluster.
//!
//! Cluster membership never changes after load, so every [`ClusterIndex`] is
//! built once at start-up and kept in a [`ClusterIndexArena`] looked up by
//! cluster id. Indexes hold member ids and borrow vectors from the shared
//! catalog; they never copy embeddings.
//!
//! ## Cost
//!
//! A query scans only its cluster: `O(cluster size x F)` instead of
//! `O(N x F)`. Clusters above the configured threshold are scanned in
//! parallel with rayon. Ordering is identical either way.

use std::cmp::Ordering;
use std::sync::Arc;

use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{RecordId, VectorCatalog};
use crate::cluster::{ClusterAssignment, ClusterId, DistanceMetric};

/// Default cluster size above which scans fan out over the rayon pool.
pub const DEFAULT_PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Error type for index construction and search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("cluster {0} has no catalog records")]
    EmptyCluster(ClusterId),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("cluster id {id} out of range ({clusters} clusters)")]
    OutOfRange { id: ClusterId, clusters: usize },
}

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    /// Catalog record id.
    pub id: RecordId,
    /// Distance to the query (lower = closer).
    pub distance: f32,
}

/// Builds per-cluster indexes over a shared catalog.
#[derive(Debug, Clone)]
pub struct ClusterIndexBuilder {
    catalog: Arc<VectorCatalog>,
    assignment: Arc<ClusterAssignment>,
    metric: DistanceMetric,
    parallel_threshold: usize,
}

impl ClusterIndexBuilder {
    pub fn new(
        catalog: Arc<VectorCatalog>,
        assignment: Arc<ClusterAssignment>,
        metric: DistanceMetric,
    ) -> Self {
        Self {
            catalog,
            assignment,
            metric,
            parallel_threshold: DEFAULT_PARALLEL_SCAN_THRESHOLD,
        }
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Index over the records whose cached assignment equals `cluster`.
    pub fn build(&self, cluster: ClusterId) -> Result<ClusterIndex, IndexError> {
        let clusters = self.assignment.num_clusters();
        if cluster >= clusters {
            return Err(IndexError::OutOfRange {
                id: cluster,
                clusters,
            });
        }
        let members = self.assignment.members(cluster);
        if members.is_empty() {
            return Err(IndexError::EmptyCluster(cluster));
        }
        Ok(ClusterIndex {
            cluster,
            members: members.into(),
            catalog: Arc::clone(&self.catalog),
            metric: self.metric,
            parallel_threshold: self.parallel_threshold,
        })
    }

    /// Eagerly build one index per cluster.
    pub fn build_all(&self) -> ClusterIndexArena {
        let slots = (0..self.assignment.num_clusters())
            .map(|cluster| match self.build(cluster) {
                Ok(index) => Some(index),
                Err(err) => {
                    tracing::warn!(cluster, error = %err, "cluster index unavailable");
                    None
                }
            })
            .collect();
        ClusterIndexArena { slots }
    }
}

/// Flat index over one cluster's members.
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    cluster: ClusterId,
    members: Arc<[RecordId]>,
    catalog: Arc<VectorCatalog>,
    metric: DistanceMetric,
    parallel_threshold: usize,
}

impl ClusterIndex {
    /// The `min(k, len)` nearest members, ascending by distance then record id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let expected = self.catalog.dimension();
        if query.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                got: query.len(),
            });
        }
        let query = ArrayView1::from(query);
        let score = |&id: &RecordId| SearchHit {
            id,
            distance: self
                .metric
                .distance(query, self.catalog.vector_unchecked(id)),
        };

        let mut hits: Vec<SearchHit> = if self.members.len() >= self.parallel_threshold {
            self.members.par_iter().map(score).collect()
        } else {
            self.members.iter().map(score).collect()
        };

        hits.sort_unstable_by(compare_hits);
        hits.truncate(k);
        Ok(hits)
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn members(&self) -> &[RecordId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.id.cmp(&b.id))
}

/// Precomputed indexes, one slot per cluster id. Empty clusters have no slot.
#[derive(Debug, Clone)]
pub struct ClusterIndexArena {
    slots: Vec<Option<ClusterIndex>>,
}

impl ClusterIndexArena {
    pub fn get(&self, cluster: ClusterId) -> Result<&ClusterIndex, IndexError> {
        match self.slots.get(cluster) {
            Some(Some(index)) => Ok(index),
            Some(None) => Err(IndexError::EmptyCluster(cluster)),
            None => Err(IndexError::OutOfRange {
                id: cluster,
                clusters: self.slots.len(),
            }),
        }
    }

    pub fn num_clusters(&self) -> usize {
        self.slots.len()
    }

    /// Cluster ids that can serve queries.
    pub fn available(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
    }
}
