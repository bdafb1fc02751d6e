//! Detection output shared by every adapter

use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detection confidence
    pub confidence: f32,
    /// Model class index
    pub class_id: usize,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: usize) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Result of one detector invocation on one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Number of objects found
    pub count: usize,
    /// Boxes, when the adapter reports them
    pub boxes: Vec<BoundingBox>,
}

impl DetectionResult {
    pub fn from_boxes(boxes: Vec<BoundingBox>) -> Self {
        Self {
            count: boxes.len(),
            boxes,
        }
    }

    /// Count-only result without box geometry
    pub fn counted(count: usize) -> Self {
        Self {
            count,
            boxes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0, 0.9, 0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0, 0.9, 0);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_count_follows_boxes() {
        let result = DetectionResult::from_boxes(vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0, 0.5, 0); 3]);
        assert_eq!(result.count, 3);
        assert!(DetectionResult::default().is_empty());
        assert_eq!(DetectionResult::counted(4).boxes.len(), 0);
    }
}
