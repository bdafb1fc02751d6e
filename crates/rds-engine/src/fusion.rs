//! Fusion Step: all four detectors on one frame

use road_detect::{DetectionResult, DetectorRole, DetectorSet};
use tracing::debug;
use video_io::VideoFrame;

use crate::{AnalysisError, Observation};

/// Detector outputs for one frame, by role
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDetections {
    pub potholes: DetectionResult,
    pub rough: DetectionResult,
    pub lanes: DetectionResult,
    pub signs: DetectionResult,
}

impl FrameDetections {
    pub fn get(&self, role: DetectorRole) -> &DetectionResult {
        match role {
            DetectorRole::Pothole => &self.potholes,
            DetectorRole::RoughRoad => &self.rough,
            DetectorRole::Lane => &self.lanes,
            DetectorRole::Sign => &self.signs,
        }
    }

    /// Collapse to per-category counts
    pub fn observation(&self) -> Observation {
        let count = |r: &DetectionResult| u32::try_from(r.count).unwrap_or(u32::MAX);
        Observation::new(
            count(&self.potholes),
            count(&self.rough),
            count(&self.lanes),
            count(&self.signs),
        )
    }
}

/// Run every detector on `frame` at threshold `confidence`.
///
/// With `parallel` set the four detectors run on scoped threads and are all
/// joined before the result is assembled.
pub fn fuse(
    detectors: &DetectorSet,
    frame: &VideoFrame,
    confidence: f32,
    parallel: bool,
) -> Result<FrameDetections, AnalysisError> {
    let run = |role: DetectorRole| {
        detectors
            .get(role)
            .detect(frame, confidence)
            .map_err(|source| AnalysisError::DetectorInvocation {
                role,
                frame: frame.sequence,
                source,
            })
    };

    let [potholes, rough, lanes, signs] = if parallel {
        std::thread::scope(|scope| {
            let handles = DetectorRole::ALL.map(|role| scope.spawn(move || run(role)));
            handles.map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(AnalysisError::DetectorPanicked {
                        frame: frame.sequence,
                    })
                })
            })
        })
    } else {
        DetectorRole::ALL.map(run)
    };

    let detections = FrameDetections {
        potholes: potholes?,
        rough: rough?,
        lanes: lanes?,
        signs: signs?,
    };
    debug!("Frame {}: {:?}", frame.sequence, detections.observation());
    Ok(detections)
}
