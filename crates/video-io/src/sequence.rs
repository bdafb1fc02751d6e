//! Image-sequence streams: a directory of numbered frames
//!
//! Frames are ordered by file name. A `sequence.json` manifest, when present,
//! carries the native frame rate; the sink always writes one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{FrameSink, FrameSource, StreamInfo, VideoError, VideoFrame, DEFAULT_FPS};

/// Manifest file name inside a sequence directory
pub const MANIFEST_FILE: &str = "sequence.json";

/// Stream properties stored next to the frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceManifest {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    #[serde(default)]
    pub frames: u64,
}

impl SequenceManifest {
    fn read(dir: &Path) -> Option<Self> {
        let path = dir.join(MANIFEST_FILE);
        let raw = fs::read(&path).ok()?;
        match serde_json::from_slice(&raw) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("Ignoring malformed manifest {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Reads a directory of image files as a video stream
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    cursor: usize,
    info: StreamInfo,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, VideoError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| VideoError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && image::ImageFormat::from_path(path).is_ok())
            .collect();
        frames.sort();

        let manifest = SequenceManifest::read(dir);
        let (width, height) = match frames.first() {
            Some(first) => image::image_dimensions(first).unwrap_or_else(|e| {
                warn!("Could not read dimensions of {}: {}", first.display(), e);
                (0, 0)
            }),
            None => (0, 0),
        };
        let fps = manifest.as_ref().map(|m| m.fps).unwrap_or(DEFAULT_FPS);

        info!(
            "Opened image sequence {} ({} frames, {}x{} @ {:.2} fps)",
            dir.display(),
            frames.len(),
            width,
            height,
            fps
        );

        Ok(Self {
            frames,
            cursor: 0,
            info: StreamInfo::new(width, height, fps),
        })
    }

    /// Number of frame files discovered
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        let Some(path) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let image = image::open(path)
            .map_err(|e| VideoError::Decode(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        Ok(Some(VideoFrame::from_rgb_image(image, self.cursor as u64)))
    }
}

/// Writes frames as numbered PNG files plus a manifest
pub struct ImageSequenceSink {
    dir: PathBuf,
    info: StreamInfo,
    written: u64,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path, info: StreamInfo) -> Result<Self, VideoError> {
        fs::create_dir_all(dir)
            .map_err(|e| VideoError::Open(format!("{}: {}", dir.display(), e)))?;
        debug!("Writing image sequence to {}", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            info,
            written: 0,
        })
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", index))
    }

    fn write_manifest(&self) -> Result<(), VideoError> {
        let manifest = SequenceManifest {
            width: self.info.width,
            height: self.info.height,
            fps: self.info.fps,
            frames: self.written,
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| VideoError::Encode(e.to_string()))?;
        fs::write(self.dir.join(MANIFEST_FILE), json)?;
        Ok(())
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), VideoError> {
        if frame.width != self.info.width || frame.height != self.info.height {
            return Err(VideoError::Encode(format!(
                "frame {}x{} does not match stream {}x{}",
                frame.width, frame.height, self.info.width, self.info.height
            )));
        }
        let image = frame
            .as_image()
            .ok_or_else(|| VideoError::Encode("frame buffer is malformed".into()))?;

        self.written += 1;
        let path = self.frame_path(self.written);
        image
            .save(&path)
            .map_err(|e| VideoError::Encode(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), VideoError> {
        self.write_manifest()?;
        info!("Wrote {} frames to {}", self.written, self.dir.display());
        Ok(())
    }
}
