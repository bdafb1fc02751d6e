//! Frame Sampler
//!
//! Yields every `skip_frames`-th frame of a stream, stopping at end of stream,
//! at the first undecodable frame, or once `max_frames` frames were yielded.

use tracing::{debug, warn};
use video_io::{FrameSource, VideoFrame};

/// A sampled frame with its 1-based stream position
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub position: u64,
    pub frame: VideoFrame,
}

/// Lazy, finite, non-restartable sampling over a frame source
pub struct FrameSampler<'a> {
    source: &'a mut dyn FrameSource,
    skip_frames: u64,
    max_frames: Option<u64>,
    position: u64,
    yielded: u64,
    finished: bool,
}

impl<'a> FrameSampler<'a> {
    /// `skip_frames` must be at least 1; callers validate it.
    pub fn new(source: &'a mut dyn FrameSource, skip_frames: u64, max_frames: Option<u64>) -> Self {
        debug_assert!(skip_frames >= 1);
        Self {
            source,
            skip_frames: skip_frames.max(1),
            max_frames,
            position: 0,
            yielded: 0,
            finished: false,
        }
    }

    /// Frames decoded so far, sampled or not
    pub fn frames_read(&self) -> u64 {
        self.position
    }

    /// Frames yielded so far
    pub fn frames_sampled(&self) -> u64 {
        self.yielded
    }
}

impl Iterator for FrameSampler<'_> {
    type Item = SampledFrame;

    fn next(&mut self) -> Option<SampledFrame> {
        if self.finished {
            return None;
        }
        if self.max_frames.is_some_and(|max| self.yielded >= max) {
            debug!("Frame cap of {} reached at stream position {}", self.yielded, self.position);
            self.finished = true;
            return None;
        }

        loop {
            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    self.position += 1;
                    if self.position % self.skip_frames == 0 {
                        self.yielded += 1;
                        return Some(SampledFrame {
                            position: self.position,
                            frame,
                        });
                    }
                }
                Ok(None) => {
                    debug!("End of stream after {} frames", self.position);
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    warn!(
                        "Frame {} unreadable, ending stream early: {}",
                        self.position + 1,
                        e
                    );
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}
