//! Immutable in-memory store of dish embeddings and their display metadata.
//!
//! A [`VectorCatalog`] is built once at start-up from vectors and metadata
//! supplied by an external ingestion step. Vectors live in one contiguous
//! `N x F` matrix so cluster indexes can borrow rows by record id instead of
//! copying them.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable record identifier, `0..N` for the lifetime of a catalog.
pub type RecordId = usize;

/// Errors raised while constructing or reading a [`VectorCatalog`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Vector and metadata counts disagree, or a vector has the wrong length.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// A record breaks a catalog precondition (missing image, non-finite value, ...).
    #[error("catalog invariant violated: {0}")]
    InvariantViolation(String),
    /// Lookup of a record id outside `0..size`.
    #[error("record id {id} out of range (catalog size {size})")]
    OutOfRange { id: RecordId, size: usize },
}

/// Display fields returned to the caller for a recommended dish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_url: String,
    #[serde(default)]
    pub ingredients: String,
    #[serde(default)]
    pub category: String,
}

/// Borrowed view of one catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct CatalogRecord<'a> {
    pub id: RecordId,
    pub vector: ArrayView1<'a, f32>,
    pub metadata: &'a DishMetadata,
}

/// Read-only snapshot of the recommendable catalog.
#[derive(Debug)]
pub struct VectorCatalog {
    vectors: Array2<f32>,
    metadata: Vec<DishMetadata>,
}

impl VectorCatalog {
    /// Validate and freeze a catalog.
    ///
    /// The dimension is taken from the first vector; every other vector must
    /// match it. Every record must carry a non-empty image URL and only finite
    /// vector components.
    pub fn load(
        vectors: Vec<Vec<f32>>,
        metadata: Vec<DishMetadata>,
    ) -> Result<Self, CatalogError> {
        if vectors.len() != metadata.len() {
            return Err(CatalogError::ShapeMismatch(format!(
                "{} vectors but {} metadata records",
                vectors.len(),
                metadata.len()
            )));
        }
        let Some(first) = vectors.first() else {
            return Err(CatalogError::InvariantViolation(
                "catalog contains no records".into(),
            ));
        };
        let dimension = first.len();
        if dimension == 0 {
            return Err(CatalogError::InvariantViolation(
                "embedding dimension must be non-zero".into(),
            ));
        }

        for (id, meta) in metadata.iter().enumerate() {
            if meta.image_url.trim().is_empty() {
                return Err(CatalogError::InvariantViolation(format!(
                    "record {id} ({:?}) has no image URL",
                    meta.name
                )));
            }
        }

        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for (id, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(CatalogError::ShapeMismatch(format!(
                    "record {id} has dimension {}, expected {dimension}",
                    vector.len()
                )));
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(CatalogError::InvariantViolation(format!(
                    "record {id} contains a non-finite component"
                )));
            }
            flat.extend_from_slice(vector);
        }

        let vectors = Array2::from_shape_vec((metadata.len(), dimension), flat)
            .map_err(|e| CatalogError::ShapeMismatch(e.to_string()))?;

        tracing::info!(records = metadata.len(), dimension, "vector catalog loaded");

        Ok(Self { vectors, metadata })
    }

    pub fn get(&self, id: RecordId) -> Result<CatalogRecord<'_>, CatalogError> {
        let metadata = self.metadata.get(id).ok_or(CatalogError::OutOfRange {
            id,
            size: self.size(),
        })?;
        Ok(CatalogRecord {
            id,
            vector: self.vectors.row(id),
            metadata,
        })
    }

    /// Fixed embedding dimension `F`.
    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn size(&self) -> usize {
        self.metadata.len()
    }

    /// Iterate records in id order. Each call starts a fresh pass.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = CatalogRecord<'_>> + '_ {
        self.metadata
            .iter()
            .enumerate()
            .map(|(id, metadata)| CatalogRecord {
                id,
                vector: self.vectors.row(id),
                metadata,
            })
    }

    /// Row view for an id already known to be valid (cluster members).
    pub(crate) fn vector_unchecked(&self, id: RecordId) -> ArrayView1<'_, f32> {
        self.vectors.row(id)
    }
}
