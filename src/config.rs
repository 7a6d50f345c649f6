//! Layered application configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults (every field has one),
//! 2. an optional `dishrec.{toml,yaml,json}` file,
//! 3. `DISHREC_*` environment variables, with `__` separating sections.
//!
//! ```toml
//! [server]
//! port = 8080
//! timeout_secs = 30
//!
//! [data]
//! catalog_path = "data/catalog.json"
//! model_path = "data/clusters.json"
//!
//! [engine]
//! cluster_bias = 0.7
//! top_k = 5
//! metric = "euclidean"
//! query_fallback = "zero"
//!
//! [embedder]
//! mode = "stub"
//! dimension = 384
//! ```
//!
//! `DISHREC_ENGINE__CLUSTER_BIAS=0.6` overrides `engine.cluster_bias`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embed::EmbedderConfig;
use crate::engine::EngineConfig;

pub const DEFAULT_CONFIG_FILE: &str = "dishrec";
pub const ENV_PREFIX: &str = "DISHREC";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("validation error: {0}")]
    Validation(String),
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Whole-request timeout, embedding included.
    pub timeout_secs: u64,
    pub max_body_size_kb: usize,
    pub enable_cors: bool,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            timeout_secs: 30,
            max_body_size_kb: 64,
            enable_cors: true,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind_addr, self.port).parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size_kb * 1024
    }
}

/// Where the pre-ingested catalog and cluster model live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub catalog_path: PathBuf,
    pub model_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/catalog.json"),
            model_path: PathBuf::from("data/clusters.json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub engine: EngineConfig,
    pub embedder: EmbedderConfig,
}

impl AppConfig {
    /// Load `dishrec.*` from the working directory (if present) plus the
    /// environment.
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::from_builder(
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        )
    }

    /// Load an explicit file, which must exist, plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        Self::from_builder(Config::builder().add_source(File::from(path.as_ref())))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigLoadError> {
        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.engine
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        self.embedder
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        if self.server.max_body_size_kb == 0 {
            return Err(ConfigLoadError::Validation(
                "server.max_body_size_kb must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
