//! Analysis error types

use road_detect::{DetectorError, DetectorRole};
use thiserror::Error;
use video_io::VideoError;

/// Errors that abort an analysis run.
///
/// Each variant identifies the failing stage. Mid-stream decode failures are
/// not errors: they end sampling early.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Could not open {path}: {source}")]
    StreamOpen {
        path: String,
        #[source]
        source: VideoError,
    },

    #[error("{role} detector failed on frame {frame}: {source}")]
    DetectorInvocation {
        role: DetectorRole,
        frame: u64,
        #[source]
        source: DetectorError,
    },

    #[error("Detector thread panicked on frame {frame}")]
    DetectorPanicked { frame: u64 },

    #[error("Annotated output failed: {0}")]
    Output(#[source] VideoError),

    #[error("Engine admission lock poisoned by an earlier run")]
    Busy,
}

impl AnalysisError {
    /// Pipeline stage that failed, for logs and metrics labels
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::InvalidRequest(_) => "request",
            AnalysisError::StreamOpen { .. } => "open",
            AnalysisError::DetectorInvocation { .. } | AnalysisError::DetectorPanicked { .. } => "detect",
            AnalysisError::Output(_) => "output",
            AnalysisError::Busy => "admission",
        }
    }
}
