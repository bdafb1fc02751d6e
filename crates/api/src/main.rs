//! Road Distress Score server - Main Entry Point

use anyhow::Context;
use api::{ensure_container_support, init_logging, run_server, AppConfig};
use model_provision::ModelStore;
use rds_engine::RoadAnalysisEngine;
use road_detect::{DetectorRole, DetectorSet};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_logging(&config.logging)?;

    info!("=== Road RDS v{} ===", env!("CARGO_PKG_VERSION"));
    ensure_container_support()?;

    // Fetch any missing detector weights
    let store = ModelStore::new(&config.models.dir, config.models.base_url.clone())
        .with_min_bytes(config.models.min_bytes);
    let names: Vec<&str> = DetectorRole::ALL.iter().map(|r| r.model_name()).collect();
    store.ensure(&names).await.context("provisioning detector models")?;

    let dir = config.models.dir.clone();
    let detector_config = config.models.detector.clone();
    let detectors = tokio::task::spawn_blocking(move || DetectorSet::load_onnx(&dir, &detector_config))
        .await?
        .context("loading detector models")?;

    let engine = RoadAnalysisEngine::new(detectors, config.engine.clone());
    run_server(&config, engine).await
}
