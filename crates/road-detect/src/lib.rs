//! Road surface detection
//!
//! Uniform adapters around pretrained object-detection models:
//! - Pothole detection
//! - Rough-road segment detection
//! - Lane marking detection
//! - Traffic sign detection
//!
//! Every adapter answers `detect(frame, confidence) -> DetectionResult`.

pub mod config;
pub mod detection;
pub mod detector;
pub mod nms;
pub mod set;
pub mod stub;
pub mod yolo;

pub use config::DetectorConfig;
pub use detection::{BoundingBox, DetectionResult};
pub use detector::{DetectorRole, RoadDetector};
pub use set::DetectorSet;
pub use stub::StaticDetector;
pub use yolo::YoloDetector;

use thiserror::Error;

/// Detector error types
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}
