//! Container decoding and encoding through FFmpeg

use std::path::Path;

use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg_next as ffmpeg;
use tracing::{debug, info};

use crate::{FrameSink, FrameSource, StreamInfo, VideoError, VideoFrame};

/// Output bit rate of encoded containers
const OUTPUT_BIT_RATE: usize = 4_000_000;

/// Decodes the best video stream of a container into RGB frames
pub struct FfmpegSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    info: StreamInfo,
    sequence: u64,
    eof_sent: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let open_err = |e: ffmpeg::Error| VideoError::Open(format!("{}: {}", path.display(), e));

        ffmpeg::init().map_err(open_err)?;
        let input = ffmpeg::format::input(&path).map_err(open_err)?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| VideoError::Open(format!("{} has no video track", path.display())))?;
        let stream_index = stream.index();
        let fps = f64::from(stream.avg_frame_rate());

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_err)?;
        let decoder = context.decoder().video().map_err(open_err)?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(open_err)?;

        let info = StreamInfo::new(decoder.width(), decoder.height(), fps);
        info!(
            "Opened {} ({}x{} @ {:.2} fps)",
            path.display(),
            info.width,
            info.height,
            info.fps
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            info,
            sequence: 0,
            eof_sent: false,
        })
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        let decode_err = |e: ffmpeg::Error| VideoError::Decode(e.to_string());
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = ffmpeg::frame::Video::empty();
                self.scaler.run(&decoded, &mut rgb).map_err(decode_err)?;
                self.sequence += 1;
                return frame_to_video_frame(&rgb, self.sequence).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self.decoder.send_packet(&packet).map_err(decode_err)?,
                None => {
                    self.decoder.send_eof().map_err(decode_err)?;
                    self.eof_sent = true;
                }
            }
        }
    }
}

fn frame_to_video_frame(frame: &ffmpeg::frame::Video, sequence: u64) -> Result<VideoFrame, VideoError> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let packed = data
            .get(..row_bytes * height as usize)
            .ok_or_else(|| VideoError::Decode("frame buffer is truncated".into()))?;
        return VideoFrame::new(packed.to_vec(), width, height, sequence);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let row_data = data
            .get(start..start + row_bytes)
            .ok_or_else(|| VideoError::Decode("frame row is out of bounds".into()))?;
        pixels.extend_from_slice(row_data);
    }
    VideoFrame::new(pixels, width, height, sequence)
}

/// Encodes frames into an MPEG-4 Part 2 (`mp4v`) video track.
///
/// YUV 4:2:0 needs even dimensions, so odd widths or heights lose their last
/// column or row.
pub struct FfmpegSink {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    info: StreamInfo,
    written: u64,
}

impl FfmpegSink {
    pub fn create(path: &Path, info: StreamInfo) -> Result<Self, VideoError> {
        let open_err = |e: ffmpeg::Error| VideoError::Open(format!("{}: {}", path.display(), e));

        ffmpeg::init().map_err(open_err)?;
        let mut output = ffmpeg::format::output(&path).map_err(open_err)?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| VideoError::Unsupported("FFmpeg was built without an MPEG-4 encoder".into()))?;

        let width = (info.width & !1).max(2);
        let height = (info.height & !1).max(2);
        let fps_milli = ((info.fps * 1000.0).round() as i32).max(1);
        let encoder_time_base = ffmpeg::Rational::new(1000, fps_milli);

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(open_err)?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_bit_rate(OUTPUT_BIT_RATE);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(fps_milli, 1000)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).map_err(open_err)?;

        let stream_index = {
            let mut stream = output.add_stream(codec).map_err(open_err)?;
            stream.set_time_base(encoder_time_base);
            stream.set_parameters(&encoder);
            stream.index()
        };
        output.write_header().map_err(open_err)?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| VideoError::Open(format!("{}: output stream vanished", path.display())))?;

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            info.width,
            info.height,
            Pixel::YUV420P,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(open_err)?;

        info!(
            "Encoding {} ({}x{} @ {:.2} fps, mp4v)",
            path.display(),
            width,
            height,
            info.fps
        );

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            info,
            written: 0,
        })
    }

    fn drain(&mut self) -> Result<(), VideoError> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| VideoError::Encode(e.to_string()))?;
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), VideoError> {
        let encode_err = |e: ffmpeg::Error| VideoError::Encode(e.to_string());
        if frame.width != self.info.width || frame.height != self.info.height {
            return Err(VideoError::Encode(format!(
                "frame {}x{} does not match stream {}x{}",
                frame.width, frame.height, self.info.width, self.info.height
            )));
        }

        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, frame.width, frame.height);
        let row_bytes = frame.width as usize * 3;
        let stride = rgb.stride(0);
        let plane = rgb.data_mut(0);
        for (row, pixels) in frame.data.chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            plane
                .get_mut(start..start + row_bytes)
                .ok_or_else(|| VideoError::Encode("encoder frame row is out of bounds".into()))?
                .copy_from_slice(pixels);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler.run(&rgb, &mut yuv).map_err(encode_err)?;
        yuv.set_pts(Some(self.written as i64));

        self.encoder.send_frame(&yuv).map_err(encode_err)?;
        self.written += 1;
        self.drain()
    }

    fn finish(mut self: Box<Self>) -> Result<(), VideoError> {
        self.encoder
            .send_eof()
            .map_err(|e| VideoError::Encode(e.to_string()))?;
        self.drain()?;
        self.output
            .write_trailer()
            .map_err(|e| VideoError::Encode(e.to_string()))?;
        debug!("Encoded {} frames into container", self.written);
        Ok(())
    }
}
