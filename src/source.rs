//! Start-up loaders for the catalog and cluster model files.
//!
//! Both files are produced by an offline ingestion step. Any error here is
//! fatal: the service refuses to start rather than serve a partial catalog.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, DishMetadata, VectorCatalog};
use crate::cluster::{ClusterAssigner, ClusterError, ClusterId};
use crate::embed::Embedder;
use crate::engine::{EngineConfig, RecommendError, RecommendationEngine};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Engine(#[from] RecommendError),
}

/// One line of the catalog file: the embedding next to its display fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub vector: Vec<f32>,
    #[serde(flatten)]
    pub metadata: DishMetadata,
}

/// Fitted cluster model: centroids plus, optionally, the training labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterModel {
    pub centroids: Vec<Vec<f32>>,
    #[serde(default)]
    pub labels: Option<Vec<ClusterId>>,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SourceError> {
    let raw = fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a JSON array of [`CatalogEntry`] and freeze it into a catalog.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<VectorCatalog, SourceError> {
    let path = path.as_ref();
    let entries: Vec<CatalogEntry> = read_json(path)?;
    let (vectors, metadata): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .map(|entry| (entry.vector, entry.metadata))
        .unzip();
    let catalog = VectorCatalog::load(vectors, metadata)?;
    tracing::info!(path = %path.display(), records = catalog.size(), "catalog loaded");
    Ok(catalog)
}

pub fn load_cluster_model(path: impl AsRef<Path>) -> Result<ClusterModel, SourceError> {
    let path = path.as_ref();
    let model: ClusterModel = read_json(path)?;
    tracing::info!(
        path = %path.display(),
        clusters = model.centroids.len(),
        labelled = model.labels.is_some(),
        "cluster model loaded"
    );
    Ok(model)
}

/// Load both files and assemble a ready engine.
pub fn load_engine(
    catalog_path: impl AsRef<Path>,
    model_path: impl AsRef<Path>,
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<RecommendationEngine, SourceError> {
    let catalog = load_catalog(catalog_path)?;
    let model = load_cluster_model(model_path)?;
    let assigner = ClusterAssigner::new(model.centroids, config.metric)?;
    let engine =
        RecommendationEngine::new(Arc::new(catalog), assigner, model.labels, embedder, config)?;
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::StubEmbedder;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const CATALOG: &str = r#"[
        {"vector": [0.0, 1.0], "name": "Miso Soup", "description": "warm",
         "image_url": "https://img.example/miso.jpg", "ingredients": "miso, tofu",
         "category": "Soup"},
        {"vector": [1.0, 0.0], "name": "Udon", "image_url": "https://img.example/udon.jpg"},
        {"vector": [9.0, 10.0], "name": "Mochi", "image_url": "https://img.example/mochi.jpg",
         "category": "Dessert"}
    ]"#;

    #[test]
    fn loads_catalog_with_optional_fields() {
        let file = write_temp(CATALOG);
        let catalog = load_catalog(file.path()).unwrap();
        assert_eq!(catalog.size(), 3);
        assert_eq!(catalog.dimension(), 2);

        let udon = catalog.get(1).unwrap();
        assert_eq!(udon.metadata.name, "Udon");
        assert_eq!(udon.metadata.description, "");
        assert_eq!(catalog.get(2).unwrap().metadata.category, "Dessert");
    }

    #[test]
    fn catalog_without_image_is_rejected() {
        let file = write_temp(r#"[{"vector": [1.0], "name": "Plain", "image_url": "  "}]"#);
        assert!(matches!(
            load_catalog(file.path()),
            Err(SourceError::Catalog(CatalogError::InvariantViolation(_)))
        ));
    }

    #[test]
    fn malformed_json_reports_path() {
        let file = write_temp("{ not json");
        let err = load_catalog(file.path()).unwrap_err();
        assert!(matches!(err, SourceError::Json { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cluster_model(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[test]
    fn cluster_model_labels_are_optional() {
        let file = write_temp(r#"{"centroids": [[0.0, 0.0], [10.0, 10.0]]}"#);
        let model = load_cluster_model(file.path()).unwrap();
        assert_eq!(model.centroids.len(), 2);
        assert!(model.labels.is_none());
    }

    #[test]
    fn assembles_engine_from_files() {
        let catalog = write_temp(CATALOG);
        let model = write_temp(r#"{"centroids": [[0.0, 0.0], [10.0, 10.0]], "labels": [0, 0, 1]}"#);
        let engine = load_engine(
            catalog.path(),
            model.path(),
            EngineConfig::default(),
            Arc::new(StubEmbedder::new(2, "stub")),
        )
        .unwrap();
        assert_eq!(engine.assignment().sizes(), vec![2, 1]);
    }

    #[test]
    fn bad_labels_fail_engine_assembly() {
        let catalog = write_temp(CATALOG);
        let model = write_temp(r#"{"centroids": [[0.0, 0.0]], "labels": [0, 0, 3]}"#);
        let err = load_engine(
            catalog.path(),
            model.path(),
            EngineConfig::default(),
            Arc::new(StubEmbedder::new(2, "stub")),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SourceError::Engine(RecommendError::Cluster(ClusterError::OutOfRange { .. }))
        ));
    }
}
