//! Detector configuration

use serde::{Deserialize, Serialize};

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Square model input size (pixels)
    pub input_size: u32,

    /// IoU threshold for non-maximum suppression
    pub iou_threshold: f32,

    /// Letterbox padding value
    pub pad_value: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            iou_threshold: 0.45,
            pad_value: 114,
        }
    }
}
