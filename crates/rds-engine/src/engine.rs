//! Road analysis engine
//!
//! Drives one run: sampler -> fusion -> series (+ annotator) -> summary.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use road_detect::DetectorSet;
use serde::Serialize;
use tracing::{info, warn};
use video_io::{FrameSource, StillImageSource, VideoError};

use crate::annotate::{draw_detections, Annotator};
use crate::config::validate_confidence;
use crate::fusion::fuse;
use crate::{
    AnalysisError, EngineConfig, FrameSampler, Observation, ObservationSeries, Summary,
    VideoAnalysisRequest,
};

/// Outcome of a video run.
///
/// `frames_sampled == 0` means nothing was analysed; the summary then reports
/// a perfect score by policy and must not be read as a clean road.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoReport {
    pub series: ObservationSeries,
    pub summary: Summary,
    pub frames_sampled: usize,
    /// Frames decoded, sampled or not
    pub frames_read: u64,
    pub output_path: Option<PathBuf>,
}

/// Outcome of a single-image run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
    #[serde(flatten)]
    pub observation: Observation,
    pub annotated_path: Option<PathBuf>,
}

/// `<stem>_annotated.<ext>` next to `path`
pub fn default_annotated_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("jpg");
    path.with_file_name(format!("{}_annotated.{}", stem, ext))
}

/// Analysis engine holding the shared, read-only detector set
pub struct RoadAnalysisEngine {
    detectors: DetectorSet,
    config: EngineConfig,
    admission: Mutex<()>,
}

impl RoadAnalysisEngine {
    pub fn new(detectors: DetectorSet, config: EngineConfig) -> Self {
        info!("Creating road analysis engine: {:?}, {:?}", detectors, config);
        Self {
            detectors,
            config,
            admission: Mutex::new(()),
        }
    }

    pub fn detectors(&self) -> &DetectorSet {
        &self.detectors
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn admit(&self) -> Result<Option<MutexGuard<'_, ()>>, AnalysisError> {
        if !self.config.serialize_runs {
            return Ok(None);
        }
        self.admission.lock().map(Some).map_err(|_| AnalysisError::Busy)
    }

    /// Analyse a video file, image-sequence directory or still image
    pub fn analyze_video(&self, request: &VideoAnalysisRequest) -> Result<VideoReport, AnalysisError> {
        let _slot = self.admit()?;
        self.observe(self.open_and_run(request))
    }

    fn open_and_run(&self, request: &VideoAnalysisRequest) -> Result<VideoReport, AnalysisError> {
        request.validate()?;
        let mut source = video_io::open_source(&request.video_path).map_err(|source| {
            AnalysisError::StreamOpen {
                path: request.video_path.display().to_string(),
                source,
            }
        })?;
        self.run(source.as_mut(), request)
    }

    /// Analyse an already opened source
    pub fn analyze_source(
        &self,
        source: &mut dyn FrameSource,
        request: &VideoAnalysisRequest,
    ) -> Result<VideoReport, AnalysisError> {
        let _slot = self.admit()?;
        self.observe(request.validate().and_then(|_| self.run(source, request)))
    }

    fn run(&self, source: &mut dyn FrameSource, request: &VideoAnalysisRequest) -> Result<VideoReport, AnalysisError> {
        let started = Instant::now();
        let info = source.info();
        info!(
            "Analysing {} ({}x{} @ {:.2} fps, skip={}, conf={}, max={:?})",
            request.video_path.display(),
            info.width,
            info.height,
            info.fps,
            request.skip_frames,
            request.confidence,
            request.max_frames
        );

        let mut annotator = match &request.output_path {
            Some(path) => Some(Annotator::new(
                video_io::open_sink(path, info).map_err(AnalysisError::Output)?,
            )),
            None => None,
        };

        let mut series = ObservationSeries::new();
        let mut sampler = FrameSampler::new(source, request.skip_frames, request.max_frames);
        for sampled in sampler.by_ref() {
            let detections = fuse(
                &self.detectors,
                &sampled.frame,
                request.confidence,
                self.config.parallel_detectors,
            )?;
            series.push(detections.observation());

            if let Some(annotator) = annotator.as_mut() {
                annotator
                    .annotate(&sampled.frame, &detections)
                    .map_err(AnalysisError::Output)?;
            }
        }
        let frames_read = sampler.frames_read();

        if let Some(annotator) = annotator {
            annotator.finish().map_err(AnalysisError::Output)?;
        }

        let summary = Summary::from_series(&series);
        metrics::counter!("rds_frames_sampled_total").increment(series.len() as u64);
        metrics::histogram!("rds_score").record(summary.avg_rds);
        metrics::histogram!("rds_run_duration_seconds").record(started.elapsed().as_secs_f64());

        if series.is_empty() {
            warn!(
                "No frames sampled from {} ({} read); score {} reflects the empty-series policy",
                request.video_path.display(),
                frames_read,
                summary.avg_rds
            );
        }
        info!(
            "Finished {}: {} frames sampled of {} read, RDS {:.2} in {:.2?}",
            request.video_path.display(),
            series.len(),
            frames_read,
            summary.avg_rds,
            started.elapsed()
        );

        Ok(VideoReport {
            frames_sampled: series.len(),
            frames_read,
            summary,
            series,
            output_path: request.output_path.clone(),
        })
    }

    fn observe<T>(&self, result: Result<T, AnalysisError>) -> Result<T, AnalysisError> {
        metrics::counter!("rds_runs_total").increment(1);
        if let Err(e) = &result {
            metrics::counter!("rds_run_failures_total", "stage" => e.stage()).increment(1);
            warn!("Run failed at {} stage: {}", e.stage(), e);
        }
        result
    }

    /// Run the fusion step once on a still image, optionally saving the
    /// annotated copy to `annotated_path`
    pub fn analyze_image(
        &self,
        image_path: &Path,
        confidence: f32,
        annotated_path: Option<&Path>,
    ) -> Result<ImageReport, AnalysisError> {
        validate_confidence(confidence)?;
        let _slot = self.admit()?;

        let open_err = |source: VideoError| AnalysisError::StreamOpen {
            path: image_path.display().to_string(),
            source,
        };
        let mut source = StillImageSource::open(image_path).map_err(open_err)?;
        let frame = source
            .next_frame()
            .map_err(open_err)?
            .ok_or_else(|| open_err(VideoError::Decode("image has no pixels".into())))?;

        let detections = fuse(&self.detectors, &frame, confidence, self.config.parallel_detectors)?;
        let observation = detections.observation();

        let annotated_path = match annotated_path {
            Some(out) => {
                let annotated = draw_detections(&frame, &detections).map_err(AnalysisError::Output)?;
                let image = annotated
                    .to_rgb_image()
                    .ok_or_else(|| AnalysisError::Output(VideoError::Encode("frame buffer is malformed".into())))?;
                image.save(out).map_err(|e| {
                    AnalysisError::Output(VideoError::Encode(format!("{}: {}", out.display(), e)))
                })?;
                Some(out.to_path_buf())
            }
            None => None,
        };

        info!("Image {}: {:?}", image_path.display(), observation);
        Ok(ImageReport {
            observation,
            annotated_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use road_detect::{DetectionResult, DetectorError, DetectorRole, RoadDetector, StaticDetector};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;
    use video_io::{GifSource, MemorySource, StreamInfo, VideoFrame};

    /// Reports the frame's sequence number as its pothole count
    struct SequenceEcho;

    impl RoadDetector for SequenceEcho {
        fn name(&self) -> &str {
            "echo"
        }

        fn detect(&self, frame: &VideoFrame, _confidence: f32) -> Result<DetectionResult, DetectorError> {
            Ok(DetectionResult::counted(frame.sequence as usize))
        }
    }

    /// Fails on the nth call
    struct FailOnCall {
        calls: AtomicU64,
        fail_at: u64,
    }

    impl RoadDetector for FailOnCall {
        fn name(&self) -> &str {
            "flaky"
        }

        fn detect(&self, _frame: &VideoFrame, _confidence: f32) -> Result<DetectionResult, DetectorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_at {
                Err(DetectorError::Inference("device lost".into()))
            } else {
                Ok(DetectionResult::counted(0))
            }
        }
    }

    /// Records how many detect calls overlap
    #[derive(Default)]
    struct Overlap {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl RoadDetector for Overlap {
        fn name(&self) -> &str {
            "overlap"
        }

        fn detect(&self, _frame: &VideoFrame, _confidence: f32) -> Result<DetectionResult, DetectorError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(DetectionResult::counted(0))
        }
    }

    /// Blocks until every run reaches it
    struct Rendezvous(Barrier);

    impl RoadDetector for Rendezvous {
        fn name(&self) -> &str {
            "rendezvous"
        }

        fn detect(&self, _frame: &VideoFrame, _confidence: f32) -> Result<DetectionResult, DetectorError> {
            self.0.wait();
            Ok(DetectionResult::counted(0))
        }
    }

    struct Panicking;

    impl RoadDetector for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn detect(&self, _frame: &VideoFrame, _confidence: f32) -> Result<DetectionResult, DetectorError> {
            panic!("detector crashed")
        }
    }

    fn engine(detectors: DetectorSet) -> RoadAnalysisEngine {
        RoadAnalysisEngine::new(detectors, EngineConfig::default())
    }

    fn request() -> VideoAnalysisRequest {
        VideoAnalysisRequest::new("synthetic")
    }

    #[test]
    fn test_stride_two_samples_even_positions() {
        let engine = engine(DetectorSet::empty().with(DetectorRole::Pothole, Arc::new(SequenceEcho)));
        let mut source = MemorySource::synthetic(10, 4, 4);

        let report = engine.analyze_source(&mut source, &request()).unwrap();
        let potholes: Vec<u32> = report.series.iter().map(|o| o.potholes).collect();
        assert_eq!(report.frames_sampled, 5);
        assert_eq!(potholes, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_cap_limits_series() {
        let engine = engine(DetectorSet::empty().with(DetectorRole::Pothole, Arc::new(SequenceEcho)));
        let mut source = MemorySource::synthetic(10, 4, 4);
        let request = request().with_skip_frames(1).with_max_frames(Some(3));

        let report = engine.analyze_source(&mut source, &request).unwrap();
        let potholes: Vec<u32> = report.series.iter().map(|o| o.potholes).collect();
        assert_eq!(potholes, vec![1, 2, 3]);
        assert_eq!(report.frames_read, 3);
    }

    #[test]
    fn test_clean_road_scores_100() {
        let engine = engine(DetectorSet::empty());
        let mut source = MemorySource::synthetic(6, 4, 4);

        let report = engine.analyze_source(&mut source, &request()).unwrap();
        assert_eq!(report.frames_sampled, 3);
        assert_eq!(report.summary, Summary::from_averages(0.0, 0.0, 0.0, 0.0));
        assert_eq!(report.summary.avg_rds, 100.0);
    }

    #[test]
    fn test_one_pothole_per_frame_scores_low() {
        let set = DetectorSet::empty().with(
            DetectorRole::Pothole,
            Arc::new(StaticDetector::with_count("potholes", 1)),
        );
        let mut source = MemorySource::synthetic(4, 4, 4);

        let report = engine(set).analyze_source(&mut source, &request()).unwrap();
        assert_eq!(report.summary.avg_potholes, 1.0);
        assert!((report.summary.avg_rds - 1.5625).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stream_reports_zero_frames() {
        let engine = engine(DetectorSet::empty());
        let mut source = MemorySource::new(Vec::new());

        let report = engine.analyze_source(&mut source, &request()).unwrap();
        assert_eq!(report.frames_sampled, 0);
        assert!(report.series.is_empty());
        assert_eq!(report.summary.avg_rds, 100.0);
    }

    #[test]
    fn test_unopenable_video_fails() {
        let engine = engine(DetectorSet::empty());
        let result = engine.analyze_video(&VideoAnalysisRequest::new("/nonexistent/clip.mp4"));
        match result {
            Err(e @ AnalysisError::StreamOpen { .. }) => assert_eq!(e.stage(), "open"),
            other => panic!("expected StreamOpen, got {:?}", other),
        }
    }

    #[test]
    fn test_detector_failure_aborts_run() {
        let flaky = Arc::new(FailOnCall {
            calls: AtomicU64::new(0),
            fail_at: 3,
        });
        let engine = engine(DetectorSet::empty().with(DetectorRole::Lane, flaky));
        let mut source = MemorySource::synthetic(10, 4, 4);

        let result = engine.analyze_source(&mut source, &request().with_skip_frames(1));
        assert!(matches!(
            result,
            Err(AnalysisError::DetectorInvocation { role: DetectorRole::Lane, frame: 3, .. })
        ));
    }

    #[test]
    fn test_invalid_request_rejected_before_reading() {
        let engine = engine(DetectorSet::empty());
        let mut source = MemorySource::synthetic(4, 4, 4);

        let result = engine.analyze_source(&mut source, &request().with_skip_frames(0));
        assert!(matches!(result, Err(AnalysisError::InvalidRequest(_))));
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn test_annotated_sequence_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("annotated");
        let set = DetectorSet::empty().with(
            DetectorRole::Sign,
            Arc::new(StaticDetector::with_count("signs", 1)),
        );
        let mut source = MemorySource::synthetic(4, 16, 16).with_fps(10.0);

        let report = engine(set)
            .analyze_source(&mut source, &request().with_output(Some(out.clone())))
            .unwrap();
        assert_eq!(report.output_path.as_deref(), Some(out.as_path()));

        let mut written = video_io::ImageSequenceSource::open(&out).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written.info().fps, 10.0);
        let first = written.next_frame().unwrap().unwrap();
        assert_eq!(first.get_pixel(0, 0), Some([255, 255, 0]));
    }

    #[test]
    fn test_video_from_image_sequence_directory() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=6 {
            image::RgbImage::new(8, 8)
                .save(dir.path().join(format!("f{:02}.png", i)))
                .unwrap();
        }
        let engine = engine(DetectorSet::empty());
        let report = engine
            .analyze_video(&VideoAnalysisRequest::new(dir.path()).with_skip_frames(3))
            .unwrap();
        assert_eq!(report.frames_sampled, 2);
        assert_eq!(report.frames_read, 6);
    }

    #[test]
    fn test_analyze_image_counts_and_annotates() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("road.png");
        image::RgbImage::new(32, 32).save(&input).unwrap();
        let out = default_annotated_path(&input);

        let set = DetectorSet::empty()
            .with(DetectorRole::Pothole, Arc::new(StaticDetector::with_count("potholes", 2)))
            .with(DetectorRole::Lane, Arc::new(StaticDetector::with_count("lanes", 1)));
        let report = engine(set).analyze_image(&input, 0.35, Some(&out)).unwrap();

        assert_eq!(report.observation, Observation::new(2, 0, 1, 0));
        assert_eq!(report.annotated_path.as_deref(), Some(out.as_path()));
        assert!(out.is_file());
    }

    #[test]
    fn test_analyze_unreadable_image() {
        let engine = engine(DetectorSet::empty());
        let result = engine.analyze_image(Path::new("/nonexistent/road.jpg"), 0.35, None);
        assert!(matches!(result, Err(AnalysisError::StreamOpen { .. })));
    }

    #[test]
    fn test_default_annotated_path() {
        assert_eq!(
            default_annotated_path(Path::new("/data/out/abc.jpg")),
            PathBuf::from("/data/out/abc_annotated.jpg")
        );
    }

    #[test]
    fn test_report_serializes_with_series() {
        let engine = engine(DetectorSet::empty());
        let mut source = MemorySource::synthetic(2, 4, 4);
        let report = engine.analyze_source(&mut source, &request()).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["frames_sampled"], 1);
        assert_eq!(json["series"][0]["potholes"], 0);
        assert_eq!(json["summary"]["avg_RDS"], 100.0);
    }

    #[test]
    fn test_serialized_runs_do_not_overlap() {
        let overlap = Arc::new(Overlap::default());
        let engine = engine(DetectorSet::empty().with(DetectorRole::Pothole, overlap.clone()));
        assert!(engine.config().serialize_runs);

        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    let mut source = MemorySource::synthetic(3, 4, 4);
                    let report = engine
                        .analyze_source(&mut source, &request().with_skip_frames(1))
                        .unwrap();
                    assert_eq!(report.frames_sampled, 3);
                });
            }
        });

        assert_eq!(overlap.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(overlap.active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unserialized_runs_overlap() {
        let config = EngineConfig {
            serialize_runs: false,
            ..EngineConfig::default()
        };
        let set = DetectorSet::empty().with(DetectorRole::Pothole, Arc::new(Rendezvous(Barrier::new(2))));
        let engine = RoadAnalysisEngine::new(set, config);

        // Each run's only detect call waits for the other run's
        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    let mut source = MemorySource::synthetic(1, 4, 4);
                    engine
                        .analyze_source(&mut source, &request().with_skip_frames(1))
                        .unwrap();
                });
            }
        });
    }

    #[test]
    fn test_poisoned_admission_reports_busy() {
        let engine = engine(DetectorSet::empty().with(DetectorRole::RoughRoad, Arc::new(Panicking)));

        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut source = MemorySource::synthetic(2, 4, 4);
            let _ = engine.analyze_source(&mut source, &request());
        }));
        assert!(crashed.is_err());
        assert!(engine.admission.is_poisoned());

        let mut source = MemorySource::synthetic(2, 4, 4);
        match engine.analyze_source(&mut source, &request()) {
            Err(e @ AnalysisError::Busy) => assert_eq!(e.stage(), "admission"),
            other => panic!("expected Busy, got {:?}", other),
        }
        // Nothing was read from the rejected source
        assert_eq!(source.next_frame().unwrap().map(|f| f.sequence), Some(1));
    }

    #[test]
    fn test_detector_failure_closes_annotated_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("annotated.gif");
        let flaky = Arc::new(FailOnCall {
            calls: AtomicU64::new(0),
            fail_at: 3,
        });
        let engine = engine(DetectorSet::empty().with(DetectorRole::Lane, flaky));
        let request = request().with_skip_frames(1).with_output(Some(out.clone()));

        let mut source = MemorySource::synthetic(10, 16, 16).with_fps(10.0);
        let result = engine.analyze_source(&mut source, &request);
        assert!(matches!(result, Err(AnalysisError::DetectorInvocation { frame: 3, .. })));

        // The frames annotated before the failure form a complete file
        let mut partial = GifSource::open(&out).unwrap();
        let mut frames = 0;
        while partial.next_frame().unwrap().is_some() {
            frames += 1;
        }
        assert_eq!(frames, 2);

        // The output path and the admission slot are free for the next run
        let mut source = MemorySource::synthetic(10, 16, 16).with_fps(10.0);
        let report = engine.analyze_source(&mut source, &request).unwrap();
        assert_eq!(report.frames_sampled, 10);
    }

    #[test]
    fn test_animated_gif_samples_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.gif");
        let mut sink = video_io::open_sink(&clip, StreamInfo::new(8, 8, 10.0)).unwrap();
        for i in 1..=10 {
            sink.write_frame(&VideoFrame::filled(8, 8, [(i * 20) as u8, 0, 0], i)).unwrap();
        }
        sink.finish().unwrap();

        let engine = engine(DetectorSet::empty());
        let report = engine
            .analyze_video(&VideoAnalysisRequest::new(&clip).with_skip_frames(1))
            .unwrap();
        assert_eq!(report.frames_read, 10);
        assert_eq!(report.frames_sampled, 10);

        let report = engine
            .analyze_video(&VideoAnalysisRequest::new(&clip).with_skip_frames(3))
            .unwrap();
        assert_eq!(report.frames_read, 10);
        assert_eq!(report.frames_sampled, 3);
    }
}
