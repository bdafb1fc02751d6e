//! Detector adapter trait and roles

use serde::{Deserialize, Serialize};
use video_io::VideoFrame;

use crate::{DetectionResult, DetectorError};

/// What a detector looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorRole {
    Pothole,
    RoughRoad,
    Lane,
    Sign,
}

impl DetectorRole {
    /// All roles in fusion order
    pub const ALL: [DetectorRole; 4] = [
        DetectorRole::Pothole,
        DetectorRole::RoughRoad,
        DetectorRole::Lane,
        DetectorRole::Sign,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorRole::Pothole => "pothole",
            DetectorRole::RoughRoad => "rough_road",
            DetectorRole::Lane => "lane",
            DetectorRole::Sign => "sign",
        }
    }

    /// Weight file stem for this role
    pub fn model_name(&self) -> &'static str {
        match self {
            DetectorRole::Pothole => "potholes",
            DetectorRole::RoughRoad => "roughroad",
            DetectorRole::Lane => "lanes",
            DetectorRole::Sign => "signs",
        }
    }
}

impl std::fmt::Display for DetectorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common interface for road detectors.
///
/// Implementations are shared read-only across analysis runs and must not
/// keep per-call state. The frame is borrowed immutably.
pub trait RoadDetector: Send + Sync {
    /// Detector name (for logging)
    fn name(&self) -> &str;

    /// Detect objects with confidence at or above `confidence`
    fn detect(&self, frame: &VideoFrame, confidence: f32) -> Result<DetectionResult, DetectorError>;
}
