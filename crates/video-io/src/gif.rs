//! Animated GIF input and output

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, Delay, DynamicImage, Frame, Frames, ImageDecoder};
use tracing::{debug, info};

use crate::{FrameSource, FrameSink, StreamInfo, VideoError, VideoFrame};

/// Frame rate implied by a GIF frame delay
fn delay_fps(delay: Delay) -> f64 {
    let (numer, denom) = delay.numer_denom_ms();
    if numer == 0 {
        return 0.0;
    }
    1000.0 * denom as f64 / numer as f64
}

/// Decodes the frames of an animated GIF lazily, in order
pub struct GifSource {
    frames: Frames<'static>,
    pending: Option<Frame>,
    info: StreamInfo,
    sequence: u64,
}

impl GifSource {
    /// Open `path` and decode its first frame to learn the frame rate
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let open_err = |e: image::ImageError| VideoError::Open(format!("{}: {}", path.display(), e));

        let file = File::open(path).map_err(|e| VideoError::Open(format!("{}: {}", path.display(), e)))?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(open_err)?;
        let (width, height) = decoder.dimensions();

        let mut frames = decoder.into_frames();
        let first = frames.next().transpose().map_err(open_err)?;
        let fps = first.as_ref().map(|f| delay_fps(f.delay())).unwrap_or(0.0);
        let info = StreamInfo::new(width, height, fps);
        debug!("Opened GIF {} ({}x{} @ {:.2} fps)", path.display(), width, height, info.fps);

        Ok(Self {
            frames,
            pending: first,
            info,
            sequence: 0,
        })
    }
}

impl FrameSource for GifSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        let frame = match self.pending.take() {
            Some(frame) => frame,
            None => match self.frames.next() {
                Some(frame) => frame.map_err(|e| VideoError::Decode(e.to_string()))?,
                None => return Ok(None),
            },
        };

        self.sequence += 1;
        let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
        Ok(Some(VideoFrame::from_rgb_image(rgb, self.sequence)))
    }
}

/// File handle shared between the encoder and the sink, so the sink can flush
/// it after the encoder has written its trailer
#[derive(Clone)]
struct SharedFile(Rc<RefCell<BufWriter<File>>>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

/// Encodes frames into a looping GIF at the stream's native frame rate
pub struct GifSink {
    encoder: GifEncoder<SharedFile>,
    file: SharedFile,
    info: StreamInfo,
    delay: Delay,
    written: u64,
}

impl GifSink {
    pub fn create(path: &Path, info: StreamInfo) -> Result<Self, VideoError> {
        let file = File::create(path)
            .map_err(|e| VideoError::Open(format!("{}: {}", path.display(), e)))?;
        let file = SharedFile(Rc::new(RefCell::new(BufWriter::new(file))));
        let mut encoder = GifEncoder::new(file.clone());
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| VideoError::Encode(e.to_string()))?;

        Ok(Self {
            encoder,
            file,
            info,
            delay: Delay::from_saturating_duration(Duration::from_secs_f64(1.0 / info.fps)),
            written: 0,
        })
    }
}

impl FrameSink for GifSink {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), VideoError> {
        if frame.width != self.info.width || frame.height != self.info.height {
            return Err(VideoError::Encode(format!(
                "frame {}x{} does not match stream {}x{}",
                frame.width, frame.height, self.info.width, self.info.height
            )));
        }
        let rgb = frame
            .to_rgb_image()
            .ok_or_else(|| VideoError::Encode("frame buffer is malformed".into()))?;
        let rgba = DynamicImage::ImageRgb8(rgb).to_rgba8();

        self.encoder
            .encode_frame(Frame::from_parts(rgba, 0, 0, self.delay))
            .map_err(|e| VideoError::Encode(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), VideoError> {
        let GifSink {
            encoder,
            file,
            written,
            ..
        } = *self;

        // Trailer goes into the buffer on drop; the flush below reports I/O failures
        drop(encoder);
        let mut writer = file.0.borrow_mut();
        writer.flush()?;
        writer.get_ref().sync_all()?;

        info!("Encoded {} GIF frames", written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_gif(path: &Path, frames: u64, fps: f64) {
        let mut sink: Box<dyn FrameSink> =
            Box::new(GifSink::create(path, StreamInfo::new(4, 4, fps)).unwrap());
        for i in 1..=frames {
            let shade = (i * 20) as u8;
            sink.write_frame(&VideoFrame::filled(4, 4, [shade, 0, 0], i)).unwrap();
        }
        sink.finish().unwrap();
    }

    #[test]
    fn test_gif_has_one_frame_per_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gif");
        write_gif(&path, 2, 10.0);

        let file = BufReader::new(File::open(&path).unwrap());
        let decoder = GifDecoder::new(file).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_source_reads_every_frame_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.gif");
        write_gif(&path, 10, 10.0);

        let mut source = GifSource::open(&path).unwrap();
        let info = source.info();
        assert_eq!((info.width, info.height), (4, 4));
        assert!((info.fps - 10.0).abs() < 1e-6);

        let mut sequences = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!((frame.width, frame.height), (4, 4));
            sequences.push(frame.sequence);
        }
        assert_eq!(sequences, (1..=10).collect::<Vec<u64>>());
    }

    #[test]
    fn test_source_rejects_non_gif() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gif");
        std::fs::write(&path, b"not a gif").unwrap();
        assert!(matches!(GifSource::open(&path), Err(VideoError::Open(_))));
    }
}
