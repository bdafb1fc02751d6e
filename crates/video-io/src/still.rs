//! Single still image as a one-frame stream

use std::path::Path;

use tracing::debug;

use crate::{FrameSource, StreamInfo, VideoError, VideoFrame, DEFAULT_FPS};

/// Still image source. Yields its only frame once.
pub struct StillImageSource {
    info: StreamInfo,
    frame: Option<VideoFrame>,
}

impl StillImageSource {
    /// Decode the image eagerly; an unreadable image fails to open
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let image = image::open(path)
            .map_err(|e| VideoError::Open(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let frame = VideoFrame::from_rgb_image(image, 1);
        debug!("Opened still image {} ({}x{})", path.display(), frame.width, frame.height);

        Ok(Self {
            info: StreamInfo::new(frame.width, frame.height, DEFAULT_FPS),
            frame: Some(frame),
        })
    }
}

impl FrameSource for StillImageSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        Ok(self.frame.take())
    }
}
