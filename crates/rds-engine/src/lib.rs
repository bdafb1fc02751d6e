//! Road Distress Score engine
//!
//! Samples frames from a road video, runs the four road detectors on each
//! sampled frame and reduces the per-frame counts to a single 0-100 score.
//!
//! Modules:
//! - `sampler`: fixed-stride frame selection with an optional cap
//! - `fusion`: the four detectors applied to one frame
//! - `annotate`: optional boxed output stream
//! - `score`: series averages and the distress formula
//! - `engine`: run orchestration, admission and metrics

pub mod annotate;
pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod observation;
pub mod sampler;
pub mod score;

pub use annotate::{draw_detections, role_color, Annotator};
pub use config::{EngineConfig, VideoAnalysisRequest, DEFAULT_CONFIDENCE, DEFAULT_SKIP_FRAMES};
pub use engine::{default_annotated_path, ImageReport, RoadAnalysisEngine, VideoReport};
pub use error::AnalysisError;
pub use fusion::{fuse, FrameDetections};
pub use observation::{Observation, ObservationSeries};
pub use sampler::{FrameSampler, SampledFrame};
pub use score::{distress_score, Summary};
