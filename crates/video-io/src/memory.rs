//! In-memory frame source for synthetic streams

use std::collections::VecDeque;

use crate::{FrameSource, StreamInfo, VideoError, VideoFrame, DEFAULT_FPS};

/// Plays back a fixed list of frames, optionally failing at one position
pub struct MemorySource {
    frames: VecDeque<VideoFrame>,
    info: StreamInfo,
    position: u64,
    corrupt_at: Option<u64>,
}

impl MemorySource {
    pub fn new(frames: Vec<VideoFrame>) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| (f.width, f.height))
            .unwrap_or((0, 0));
        Self {
            frames: frames.into(),
            info: StreamInfo::new(width, height, DEFAULT_FPS),
            position: 0,
            corrupt_at: None,
        }
    }

    /// `count` solid frames of `width`x`height`, sequence numbers 1..=count
    pub fn synthetic(count: u64, width: u32, height: u32) -> Self {
        let frames = (1..=count)
            .map(|i| VideoFrame::filled(width, height, [(i % 256) as u8, 0, 0], i))
            .collect();
        Self::new(frames)
    }

    /// Report the frame at 1-based `position` as undecodable
    pub fn with_corrupt_frame(mut self, position: u64) -> Self {
        self.corrupt_at = Some(position);
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.info = StreamInfo::new(self.info.width, self.info.height, fps);
        self
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        let Some(frame) = self.frames.pop_front() else {
            return Ok(None);
        };
        self.position += 1;
        if self.corrupt_at == Some(self.position) {
            return Err(VideoError::Decode(format!("frame {} is corrupt", self.position)));
        }
        Ok(Some(frame))
    }
}
