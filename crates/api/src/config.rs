//! Server configuration
//!
//! Layered with the `config` crate: serde defaults, then
//! `config/road-rds.toml` if present, then `RDS__*` environment variables
//! (for example `RDS__SERVER__BIND=0.0.0.0:9000`).

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use model_provision::DEFAULT_MIN_BYTES;
use rds_engine::EngineConfig;
use road_detect::DetectorConfig;
use serde::{Deserialize, Serialize};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/road-rds";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Uploads and annotated outputs, served under `/outputs`
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            output_dir: PathBuf::from("outputs"),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub dir: PathBuf,
    /// Where missing weights are fetched from
    pub base_url: Option<String>,
    /// Files smaller than this are treated as truncated
    pub min_bytes: u64,
    #[serde(flatten)]
    pub detector: DetectorConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            base_url: None,
            min_bytes: DEFAULT_MIN_BYTES,
            detector: DetectorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load from the default file location and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `file` (extension optional, may be absent) and environment
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("RDS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
