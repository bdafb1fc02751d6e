//! Road Distress Score API Server
//!
//! HTTP surface over the analysis engine: video and image upload endpoints,
//! health, Prometheus metrics and static access to stored outputs.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rds_engine::RoadAnalysisEngine;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
mod routes;

pub use config::{AppConfig, LoggingConfig, ModelsConfig, ServerConfig};
pub use error::{ApiError, ApiResult};

/// Application state shared across handlers
pub struct AppState {
    /// Shared analysis engine
    pub engine: Arc<RoadAnalysisEngine>,
    /// Uploads and annotated outputs
    pub output_dir: PathBuf,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Prometheus handle, if a recorder was installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(engine: RoadAnalysisEngine, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: Arc::new(engine),
            output_dir: output_dir.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let outputs = ServeDir::new(&state.output_dir);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
        .route("/analyze/video", post(routes::analyze::analyze_video))
        .route("/analyze/image", post(routes::analyze::analyze_image))
        .nest_service("/outputs", outputs)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    }
}

/// Refuse to serve video analysis from a build that cannot decode containers
pub fn ensure_container_support() -> anyhow::Result<()> {
    if video_io::CONTAINER_SUPPORT {
        Ok(())
    } else {
        anyhow::bail!(
            "road-rds was built without the `ffmpeg` feature and cannot decode uploaded videos; \
             rebuild with `--features ffmpeg`"
        )
    }
}

/// Run the server until the listener fails
pub async fn run_server(config: &AppConfig, engine: RoadAnalysisEngine) -> anyhow::Result<()> {
    ensure_container_support()?;
    tokio::fs::create_dir_all(&config.server.output_dir).await?;

    let mut state = AppState::new(engine, &config.server.output_dir);
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("Prometheus recorder not installed: {}", e),
    }

    let app = create_router(Arc::new(state), config.server.max_upload_bytes);

    info!("Starting API server on {}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
