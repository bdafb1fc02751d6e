//! Annotator: detector boxes drawn onto an output stream
//!
//! Side channel only. Works on a copy of each frame and never feeds back
//! into the observation series.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use road_detect::{BoundingBox, DetectorRole};
use tracing::debug;
use video_io::{FrameSink, VideoError, VideoFrame};

use crate::FrameDetections;

/// Box outline width in pixels
const LINE_WIDTH: u32 = 2;

/// Outline colour per category
pub fn role_color(role: DetectorRole) -> Rgb<u8> {
    match role {
        DetectorRole::Pothole => Rgb([255, 0, 0]),
        DetectorRole::RoughRoad => Rgb([0, 255, 0]),
        DetectorRole::Lane => Rgb([0, 0, 255]),
        DetectorRole::Sign => Rgb([255, 255, 0]),
    }
}

/// Copy `frame` and outline every detection on the copy
pub fn draw_detections(frame: &VideoFrame, detections: &FrameDetections) -> Result<VideoFrame, VideoError> {
    let mut canvas: RgbImage = frame
        .to_rgb_image()
        .ok_or_else(|| VideoError::Encode("frame buffer is malformed".into()))?;

    for role in DetectorRole::ALL {
        let color = role_color(role);
        for bbox in &detections.get(role).boxes {
            draw_box(&mut canvas, bbox, color);
        }
    }

    Ok(VideoFrame::from_rgb_image(canvas, frame.sequence))
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let x = bbox.x1.round() as i32;
    let y = bbox.y1.round() as i32;
    let w = bbox.width().round() as u32;
    let h = bbox.height().round() as u32;

    for inset in 0..LINE_WIDTH {
        let (iw, ih) = (w.saturating_sub(2 * inset), h.saturating_sub(2 * inset));
        if iw == 0 || ih == 0 {
            break;
        }
        let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(iw, ih);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Owns the output stream of one run
pub struct Annotator {
    sink: Box<dyn FrameSink>,
    written: u64,
}

impl Annotator {
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        Self { sink, written: 0 }
    }

    /// Draw and append one frame
    pub fn annotate(&mut self, frame: &VideoFrame, detections: &FrameDetections) -> Result<(), VideoError> {
        let annotated = draw_detections(frame, detections)?;
        self.sink.write_frame(&annotated)?;
        self.written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    /// Flush and close the output stream
    pub fn finish(self) -> Result<u64, VideoError> {
        self.sink.finish()?;
        debug!("Annotated stream closed after {} frames", self.written);
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use road_detect::DetectionResult;
    use std::sync::{Arc, Mutex};

    /// Collects written frames in memory
    struct CollectingSink(Arc<Mutex<Vec<VideoFrame>>>);

    impl FrameSink for CollectingSink {
        fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), VideoError> {
            self.0.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<(), VideoError> {
            Ok(())
        }
    }

    fn one_box(x1: f32, y1: f32, x2: f32, y2: f32) -> DetectionResult {
        DetectionResult::from_boxes(vec![BoundingBox::new(x1, y1, x2, y2, 0.9, 0)])
    }

    #[test]
    fn test_categories_get_distinct_colors() {
        let colors: Vec<Rgb<u8>> = DetectorRole::ALL.iter().map(|r| role_color(*r)).collect();
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_draws_on_copy_only() {
        let frame = VideoFrame::filled(20, 20, [0, 0, 0], 4);
        let detections = FrameDetections {
            potholes: one_box(2.0, 2.0, 10.0, 10.0),
            signs: one_box(12.0, 12.0, 18.0, 18.0),
            ..Default::default()
        };

        let annotated = draw_detections(&frame, &detections).unwrap();
        assert_eq!(frame.get_pixel(2, 2), Some([0, 0, 0]));
        assert_eq!(annotated.get_pixel(2, 2), Some([255, 0, 0]));
        assert_eq!(annotated.get_pixel(3, 5), Some([255, 0, 0]));
        assert_eq!(annotated.get_pixel(12, 12), Some([255, 255, 0]));
        // interior untouched
        assert_eq!(annotated.get_pixel(6, 6), Some([0, 0, 0]));
        assert_eq!(annotated.sequence, 4);
    }

    #[test]
    fn test_degenerate_box_is_skipped() {
        let frame = VideoFrame::filled(8, 8, [0, 0, 0], 1);
        let detections = FrameDetections {
            lanes: one_box(3.0, 3.0, 3.0, 3.0),
            ..Default::default()
        };
        assert_eq!(draw_detections(&frame, &detections).unwrap(), frame);
    }

    #[test]
    fn test_annotator_counts_frames() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let mut annotator = Annotator::new(Box::new(CollectingSink(written.clone())));
        let frame = VideoFrame::filled(4, 4, [1, 1, 1], 1);

        annotator.annotate(&frame, &FrameDetections::default()).unwrap();
        annotator.annotate(&frame, &FrameDetections::default()).unwrap();
        assert_eq!(annotator.finish().unwrap(), 2);
        assert_eq!(written.lock().unwrap().len(), 2);
    }
}
