//! Fixed-output detector for tests and model-less deployments

use video_io::VideoFrame;

use crate::{BoundingBox, DetectionResult, DetectorError, RoadDetector};

/// Returns the same boxes for every frame, filtered by confidence
pub struct StaticDetector {
    name: String,
    boxes: Vec<BoundingBox>,
}

impl StaticDetector {
    pub fn new(name: impl Into<String>, boxes: Vec<BoundingBox>) -> Self {
        Self {
            name: name.into(),
            boxes,
        }
    }

    /// Detector that never finds anything
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// `count` distinct full-confidence boxes
    pub fn with_count(name: impl Into<String>, count: usize) -> Self {
        let boxes = (0..count)
            .map(|i| {
                let x = (i * 12) as f32;
                BoundingBox::new(x, 0.0, x + 10.0, 10.0, 1.0, 0)
            })
            .collect();
        Self::new(name, boxes)
    }
}

impl RoadDetector for StaticDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, _frame: &VideoFrame, confidence: f32) -> Result<DetectionResult, DetectorError> {
        let boxes = self
            .boxes
            .iter()
            .filter(|b| b.confidence >= confidence)
            .copied()
            .collect();
        Ok(DetectionResult::from_boxes(boxes))
    }
}
