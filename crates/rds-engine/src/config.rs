//! Engine configuration and per-run requests

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Default sampling stride
pub const DEFAULT_SKIP_FRAMES: u64 = 2;
/// Default detection confidence threshold
pub const DEFAULT_CONFIDENCE: f32 = 0.35;

/// Engine-wide settings, fixed at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run the four detectors of a frame on separate threads
    pub parallel_detectors: bool,

    /// Admit one run at a time
    pub serialize_runs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_detectors: false,
            serialize_runs: true,
        }
    }
}

/// Parameters of one video analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysisRequest {
    /// Input video, image sequence directory or still image
    pub video_path: PathBuf,
    /// Analyse every Nth frame
    pub skip_frames: u64,
    /// Detection confidence threshold
    pub confidence: f32,
    /// Stop after this many sampled frames
    pub max_frames: Option<u64>,
    /// Where to write the annotated stream
    pub output_path: Option<PathBuf>,
}

impl VideoAnalysisRequest {
    pub fn new(video_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            skip_frames: DEFAULT_SKIP_FRAMES,
            confidence: DEFAULT_CONFIDENCE,
            max_frames: None,
            output_path: None,
        }
    }

    pub fn with_skip_frames(mut self, skip_frames: u64) -> Self {
        self.skip_frames = skip_frames;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_output(mut self, output_path: Option<PathBuf>) -> Self {
        self.output_path = output_path;
        self
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.skip_frames == 0 {
            return Err(AnalysisError::InvalidRequest("skip_frames must be at least 1".into()));
        }
        if self.max_frames == Some(0) {
            return Err(AnalysisError::InvalidRequest("max_frames must be at least 1".into()));
        }
        validate_confidence(self.confidence)
    }
}

pub(crate) fn validate_confidence(confidence: f32) -> Result<(), AnalysisError> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(AnalysisError::InvalidRequest(format!(
            "confidence must be within [0, 1], got {}",
            confidence
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = VideoAnalysisRequest::new("road.mp4");
        assert_eq!(request.skip_frames, 2);
        assert_eq!(request.confidence, 0.35);
        assert!(request.max_frames.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let base = VideoAnalysisRequest::new("road.mp4");
        assert!(base.clone().with_skip_frames(0).validate().is_err());
        assert!(base.clone().with_max_frames(Some(0)).validate().is_err());
        assert!(base.clone().with_confidence(1.5).validate().is_err());
        assert!(base.with_confidence(f32::NAN).validate().is_err());
    }
}
