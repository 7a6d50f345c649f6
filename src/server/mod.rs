//! HTTP transport for the recommendation engine.
//!
//! # Endpoints
//!
//! - `POST /api/v1/recommend` - recommend a dish; body is `["text", ...]` or
//!   `{"texts": ["text", ...]}`
//! - `POST /Create/embeddishes` - legacy alias of the above, answering with
//!   the original `Name`/`Image`/... field names
//! - `GET /api/v1/clusters` - cluster sizes and draw weights
//! - `GET /` - API information
//! - `GET /health` - liveness check
//! - `GET /ready` - readiness check
//! - `GET /metrics` - Prometheus metrics
//!
//! ```rust,no_run
//! use dishrec::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     dishrec::server::start_server(config).await
//! }
//! ```

mod app;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use app::{LEGACY_RECOMMEND_ROUTE, build_router, start_server};
pub use error::{ServerError, ServerResult};
pub use state::AppState;
