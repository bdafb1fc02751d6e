//! The four mounted detectors

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::{DetectorConfig, DetectorError, DetectorRole, RoadDetector, StaticDetector, YoloDetector};

/// Immutable handle set of the pothole, rough-road, lane and sign detectors.
///
/// Built once and shared read-only by every analysis run.
#[derive(Clone)]
pub struct DetectorSet {
    potholes: Arc<dyn RoadDetector>,
    rough: Arc<dyn RoadDetector>,
    lanes: Arc<dyn RoadDetector>,
    signs: Arc<dyn RoadDetector>,
}

impl DetectorSet {
    pub fn new(
        potholes: Arc<dyn RoadDetector>,
        rough: Arc<dyn RoadDetector>,
        lanes: Arc<dyn RoadDetector>,
        signs: Arc<dyn RoadDetector>,
    ) -> Self {
        Self {
            potholes,
            rough,
            lanes,
            signs,
        }
    }

    /// Load `<role model name>.onnx` for each role from `dir`
    pub fn load_onnx(dir: &Path, config: &DetectorConfig) -> Result<Self, DetectorError> {
        let load = |role: DetectorRole| -> Result<Arc<dyn RoadDetector>, DetectorError> {
            let path = dir.join(format!("{}.onnx", role.model_name()));
            Ok(Arc::new(YoloDetector::load(role.model_name(), &path, config)?))
        };

        let set = Self::new(
            load(DetectorRole::Pothole)?,
            load(DetectorRole::RoughRoad)?,
            load(DetectorRole::Lane)?,
            load(DetectorRole::Sign)?,
        );
        info!("All detectors loaded from {}", dir.display());
        Ok(set)
    }

    /// Detectors that never find anything
    pub fn empty() -> Self {
        let make = |role: DetectorRole| -> Arc<dyn RoadDetector> {
            Arc::new(StaticDetector::empty(role.model_name()))
        };
        Self::new(
            make(DetectorRole::Pothole),
            make(DetectorRole::RoughRoad),
            make(DetectorRole::Lane),
            make(DetectorRole::Sign),
        )
    }

    pub fn get(&self, role: DetectorRole) -> &Arc<dyn RoadDetector> {
        match role {
            DetectorRole::Pothole => &self.potholes,
            DetectorRole::RoughRoad => &self.rough,
            DetectorRole::Lane => &self.lanes,
            DetectorRole::Sign => &self.signs,
        }
    }

    /// Replace one detector, keeping the others
    pub fn with(mut self, role: DetectorRole, detector: Arc<dyn RoadDetector>) -> Self {
        match role {
            DetectorRole::Pothole => self.potholes = detector,
            DetectorRole::RoughRoad => self.rough = detector,
            DetectorRole::Lane => self.lanes = detector,
            DetectorRole::Sign => self.signs = detector,
        }
        self
    }
}

impl std::fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSet")
            .field("potholes", &self.potholes.name())
            .field("rough", &self.rough.name())
            .field("lanes", &self.lanes.name())
            .field("signs", &self.signs.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_replaces_single_role() {
        let set = DetectorSet::empty().with(
            DetectorRole::Sign,
            Arc::new(StaticDetector::with_count("custom-signs", 2)),
        );
        assert_eq!(set.get(DetectorRole::Sign).name(), "custom-signs");
        assert_eq!(set.get(DetectorRole::Lane).name(), "lanes");
    }

    #[test]
    fn test_load_onnx_missing_dir() {
        let result = DetectorSet::load_onnx(Path::new("/nonexistent"), &DetectorConfig::default());
        assert!(matches!(result, Err(DetectorError::ModelLoad(_))));
    }
}
