//! YOLO-style ONNX detector running on tract

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;
use tracing::{debug, info};
use video_io::VideoFrame;

use crate::nms::nms;
use crate::{BoundingBox, DetectionResult, DetectorConfig, DetectorError, RoadDetector};

/// Letterbox transform from frame to model input space
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(src_w: u32, src_h: u32, target: u32) -> Self {
        let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale).round();
        let scaled_h = (src_h as f32 * scale).round();
        Self {
            scale,
            pad_x: ((target as f32 - scaled_w) / 2.0).floor(),
            pad_y: ((target as f32 - scaled_h) / 2.0).floor(),
        }
    }

    /// Map a model-space coordinate back to the source frame
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Single-model detector for YOLOv8-format exports (`[1, 4 + classes, anchors]`)
pub struct YoloDetector {
    name: String,
    model: TypedRunnableModel<TypedModel>,
    config: DetectorConfig,
}

impl YoloDetector {
    /// Load an ONNX model and fix its input to `1x3xSxS`
    pub fn load(name: impl Into<String>, model_path: &Path, config: &DetectorConfig) -> Result<Self, DetectorError> {
        let name = name.into();
        let size = config.input_size as usize;
        let load_err = |e: TractError| {
            DetectorError::ModelLoad(format!("{} ({}): {}", name, model_path.display(), e))
        };

        info!("Loading {} detector from {}", name, model_path.display());
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(load_err)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        Ok(Self {
            name,
            model,
            config: config.clone(),
        })
    }

    fn preprocess(&self, frame: &VideoFrame) -> Result<(Tensor, Letterbox), DetectorError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(DetectorError::InvalidFrame("empty frame".into()));
        }
        let view = frame
            .as_image()
            .ok_or_else(|| DetectorError::InvalidFrame("pixel buffer does not match dimensions".into()))?;

        let target = self.config.input_size;
        let letterbox = Letterbox::fit(frame.width, frame.height, target);
        let scaled_w = ((frame.width as f32 * letterbox.scale).round() as u32).clamp(1, target);
        let scaled_h = ((frame.height as f32 * letterbox.scale).round() as u32).clamp(1, target);

        let resized = imageops::resize(&view, scaled_w, scaled_h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(target, target, Rgb([self.config.pad_value; 3]));
        imageops::replace(&mut canvas, &resized, letterbox.pad_x as i64, letterbox.pad_y as i64);

        // HWC u8 -> NCHW f32 in [0, 1]
        let size = target as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        Ok((input.into_tensor(), letterbox))
    }

    fn decode(
        &self,
        output: &Tensor,
        letterbox: Letterbox,
        confidence: f32,
        frame: &VideoFrame,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| DetectorError::Inference(format!("output is not f32: {}", e)))?;
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|e| DetectorError::Inference(format!("unexpected output rank: {}", e)))?;

        // Exports are either [1, C, N] or the transposed [1, N, C]
        let (d1, d2) = (view.shape()[1], view.shape()[2]);
        let channel_major = d1 <= d2;
        let (channels, anchors) = if channel_major { (d1, d2) } else { (d2, d1) };
        if channels < 5 {
            return Err(DetectorError::Inference(format!(
                "output has {} channels, expected at least 5",
                channels
            )));
        }
        let at = |c: usize, i: usize| {
            if channel_major {
                view[[0, c, i]]
            } else {
                view[[0, i, c]]
            }
        };

        let max_x = frame.width as f32;
        let max_y = frame.height as f32;
        let mut candidates = Vec::new();

        for i in 0..anchors {
            let (class_id, score) = (4..channels)
                .map(|c| (c - 4, at(c, i)))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !(score >= confidence) {
                continue;
            }

            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
            let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

            candidates.push(BoundingBox::new(
                x1.clamp(0.0, max_x),
                y1.clamp(0.0, max_y),
                x2.clamp(0.0, max_x),
                y2.clamp(0.0, max_y),
                score,
                class_id,
            ));
        }

        Ok(nms(candidates, self.config.iou_threshold))
    }
}

impl RoadDetector for YoloDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, frame: &VideoFrame, confidence: f32) -> Result<DetectionResult, DetectorError> {
        let (input, letterbox) = self.preprocess(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DetectorError::Inference(format!("{}: {}", self.name, e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| DetectorError::Inference(format!("{}: model produced no outputs", self.name)))?;

        let boxes = self.decode(output, letterbox, confidence, frame)?;
        debug!("{}: {} detections on frame {}", self.name, boxes.len(), frame.sequence);
        Ok(DetectionResult::from_boxes(boxes))
    }
}
