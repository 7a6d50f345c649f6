//! Router assembly, start-up and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use super::middleware::{enforce_timeout, log_requests, request_id};
use super::routes::{api_info, health, not_found, recommend};
use super::state::AppState;
use crate::config::AppConfig;

/// Route used by the first generation of clients. Answers with
/// [`recommend::LegacyDish`] field names.
pub const LEGACY_RECOMMEND_ROUTE: &str = "/Create/embeddishes";

/// Build the router with every route and the middleware stack.
///
/// Layers apply outermost-last: trace, request id, logging, CORS, timeout.
pub fn build_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;

    let cors = if server.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    let api_routes = Router::new()
        .route("/api/v1/recommend", post(recommend::recommend))
        .route(LEGACY_RECOMMEND_ROUTE, post(recommend::recommend_legacy))
        .route("/api/v1/clusters", get(recommend::list_clusters))
        .layer(DefaultBodyLimit::max(server.max_body_size()));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .fallback(not_found)
        .layer(from_fn_with_state(server.timeout(), enforce_timeout))
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP service and block until SIGTERM or Ctrl+C.
///
/// Installs the JSON tracing subscriber and the Prometheus recorder, loads
/// the catalog and cluster model, then serves. Any start-up failure is
/// returned before the listener binds.
pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();

    let prometheus = PrometheusBuilder::new().install_recorder()?;

    let addr: SocketAddr = config.server.socket_addr()?;
    let server = config.server.clone();

    // Index precomputation is CPU bound.
    let state = tokio::task::spawn_blocking(move || AppState::from_config(config)).await??;
    let state = Arc::new(state.with_metrics(prometheus));
    let app = build_router(Arc::clone(&state));

    tracing::info!(
        %addr,
        records = state.engine.catalog().size(),
        clusters = state.engine.assigner().num_clusters(),
        embedder = ?state.config.embedder.mode,
        "Starting dishrec server"
    );
    tracing::info!(
        timeout_secs = server.timeout_secs,
        max_body_size_kb = server.max_body_size_kb,
        cors = server.enable_cors,
        "Server limits"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
