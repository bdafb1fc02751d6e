//! Video I/O for road footage analysis
//!
//! Frame-by-frame decoding of input footage and encoding of annotated output.
//! Supports:
//! - Directories of numbered frames (PNG/JPEG), with an optional `sequence.json` manifest
//! - Single still images (treated as a one-frame stream)
//! - Animated GIFs, in both directions
//! - Arbitrary containers through FFmpeg (feature `ffmpeg`), decoded and
//!   encoded as MPEG-4

pub mod frame;
pub mod gif;
pub mod memory;
pub mod sequence;
pub mod still;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use frame::VideoFrame;
pub use gif::{GifSink, GifSource};
pub use memory::MemorySource;
pub use sequence::{ImageSequenceSink, ImageSequenceSource, SequenceManifest};
pub use still::StillImageSource;

use std::path::Path;
use thiserror::Error;

/// Whether this build can decode and encode video containers (mp4, mov, ...)
pub const CONTAINER_SUPPORT: bool = cfg!(feature = "ffmpeg");

/// Container extensions routed to the FFmpeg encoder
const CONTAINER_OUTPUTS: &[&str] = &["mp4", "mov", "mkv", "avi"];

/// Frame rate assumed when a stream does not report one
pub const DEFAULT_FPS: f64 = 25.0;

/// Video I/O error types
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to open stream: {0}")]
    Open(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Frame encode failed: {0}")]
    Encode(String),

    #[error("Unsupported stream: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Native properties of an opened stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
}

impl StreamInfo {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { DEFAULT_FPS };
        Self { width, height, fps }
    }
}

/// A readable, non-restartable stream of decoded frames.
///
/// `Ok(None)` marks the end of the stream. An `Err` means the next frame
/// could not be decoded; callers decide whether that ends the stream.
pub trait FrameSource {
    /// Native stream properties
    fn info(&self) -> StreamInfo;

    /// Decode the next frame in stream order
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError>;
}

/// An output stream accepting frames at a fixed resolution and rate
pub trait FrameSink {
    /// Append a frame
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), VideoError>;

    /// Flush and close the stream
    fn finish(self: Box<Self>) -> Result<(), VideoError>;
}

/// Open a frame source for `path`.
///
/// Directories are read as image sequences, `.gif` files as animations and
/// files with another image extension as a single frame. Anything else needs
/// the `ffmpeg` feature.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>, VideoError> {
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path)?));
    }
    if !path.is_file() {
        return Err(VideoError::Open(format!("{} does not exist", path.display())));
    }
    if has_extension(path, "gif") {
        return Ok(Box::new(GifSource::open(path)?));
    }
    if image::ImageFormat::from_path(path).is_ok() {
        return Ok(Box::new(StillImageSource::open(path)?));
    }

    #[cfg(feature = "ffmpeg")]
    {
        Ok(Box::new(ffmpeg::FfmpegSource::open(path)?))
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        Err(VideoError::Unsupported(format!(
            "{}: container decoding requires the ffmpeg feature",
            path.display()
        )))
    }
}

/// Open an output sink for `path` at the given stream properties.
///
/// `.gif` paths produce an animated GIF, container extensions (`.mp4`,
/// `.mov`, `.mkv`, `.avi`) an MPEG-4 track when built with `ffmpeg`, and paths
/// without an extension (or existing directories) a numbered PNG sequence.
pub fn open_sink(path: &Path, info: StreamInfo) -> Result<Box<dyn FrameSink>, VideoError> {
    if path.is_dir() || path.extension().is_none() {
        return Ok(Box::new(ImageSequenceSink::create(path, info)?));
    }
    if has_extension(path, "gif") {
        return Ok(Box::new(GifSink::create(path, info)?));
    }

    if CONTAINER_OUTPUTS.iter().any(|ext| has_extension(path, ext)) {
        #[cfg(feature = "ffmpeg")]
        {
            return Ok(Box::new(ffmpeg::FfmpegSink::create(path, info)?));
        }
        #[cfg(not(feature = "ffmpeg"))]
        {
            return Err(VideoError::Unsupported(format!(
                "{}: container encoding requires the ffmpeg feature",
                path.display()
            )));
        }
    }

    Err(VideoError::Unsupported(format!(
        "{}: output must be a .gif, a video container or a directory",
        path.display()
    )))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
