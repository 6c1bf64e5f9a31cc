//! Single-stream video decoder shared by the playback pipeline and the frame
//! retriever.
//!
//! Opens the best video stream of a resource, converts frames to RGB24 at the
//! stream's native size, and implements the two seek flavours the engine
//! needs: land on the preceding keyframe, or decode forward until the frame
//! covering a target timestamp.

use std::{path::Path, time::Duration};

use ffmpeg_next::{
    Dictionary, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{context::Context as ScalingContext, flag::Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::{
    conversion::{container_duration, duration_to_seek_timestamp, pts_to_duration},
    error::FrameStepError,
};

/// Facts about the opened video stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamInfo {
    pub(crate) duration: Option<Duration>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) frames_per_second: f64,
    pub(crate) codec: String,
    pub(crate) format: String,
}

/// A decoded frame and its presentation time.
pub(crate) struct DecodedFrame {
    pub(crate) position: Duration,
    pub(crate) frame: VideoFrame,
}

pub(crate) struct StreamDecoder {
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: Rational,
    info: StreamInfo,
    eof_sent: bool,
    /// A frame decoded past a seek target, handed out next.
    lookahead: Option<DecodedFrame>,
}

impl StreamDecoder {
    /// Open `path`, optionally limiting how long the demuxer probes before
    /// the first frame.
    pub(crate) fn open(path: &Path, analyze: Option<Duration>) -> Result<Self, FrameStepError> {
        let open_error = |reason: String| FrameStepError::ResourceOpen {
            resource: path.display().to_string(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let mut options = Dictionary::new();
        if let Some(analyze) = analyze {
            options.set("analyzeduration", &analyze.as_micros().to_string());
        }
        let input = ffmpeg_next::format::input_with_dictionary(&path, options)
            .map_err(|error| open_error(error.to_string()))?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(FrameStepError::NoVideoStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 {
            f64::from(frame_rate.numerator()) / f64::from(frame_rate.denominator())
        } else {
            0.0
        };

        let stream_duration = if stream.duration() > 0 {
            Some(pts_to_duration(stream.duration(), time_base))
        } else {
            None
        };

        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()
            .map_err(|error| open_error(format!("Failed to create video decoder: {error}")))?;

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ScalingFlags::BILINEAR,
        )?;

        let info = StreamInfo {
            duration: container_duration(input.duration()).or(stream_duration),
            width: decoder.width(),
            height: decoder.height(),
            frames_per_second,
            codec: decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            format: input.format().name().to_string(),
        };

        log::debug!(
            "Opened {} ({}x{} {} @ {:.3} fps, {:?})",
            path.display(),
            info.width,
            info.height,
            info.codec,
            info.frames_per_second,
            info.duration,
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            info,
            eof_sent: false,
            lookahead: None,
        })
    }

    pub(crate) fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Move the demuxer to the keyframe at or before `position` and drop
    /// everything buffered in the decoder.
    pub(crate) fn seek_keyframe(&mut self, position: Duration) -> Result<(), FrameStepError> {
        let timestamp = duration_to_seek_timestamp(position);
        self.input
            .seek(timestamp, ..timestamp)
            .map_err(|error| FrameStepError::SeekError {
                position,
                reason: error.to_string(),
            })?;
        self.decoder.flush();
        self.eof_sent = false;
        self.lookahead = None;
        Ok(())
    }

    /// Decode the next frame of the stream, `None` at end of stream.
    pub(crate) fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameStepError> {
        if let Some(decoded) = self.lookahead.take() {
            return Ok(Some(decoded));
        }
        let mut frame = VideoFrame::empty();
        loop {
            if self.decoder.receive_frame(&mut frame).is_ok() {
                let pts = frame.timestamp().or(frame.pts()).unwrap_or(0);
                return Ok(Some(DecodedFrame {
                    position: pts_to_duration(pts, self.time_base),
                    frame,
                }));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) if index == self.stream_index => {
                    self.decoder.send_packet(&packet).map_err(|error| {
                        FrameStepError::VideoDecodeError(error.to_string())
                    })?;
                }
                Some(_) => {}
                None => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
            }
        }
    }

    /// Seek so that the next frame handed out is the one displayed at
    /// `position`: the last frame whose timestamp does not exceed it.
    ///
    /// Falls back to the first decodable frame when `position` precedes the
    /// stream, and to the last one when it lies beyond the end.
    pub(crate) fn seek_exact(
        &mut self,
        position: Duration,
    ) -> Result<Option<DecodedFrame>, FrameStepError> {
        self.seek_keyframe(position)?;
        let mut previous: Option<DecodedFrame> = None;
        while let Some(decoded) = self.next_frame()? {
            if decoded.position > position {
                return Ok(Some(match previous {
                    Some(landed) => {
                        self.lookahead = Some(decoded);
                        landed
                    }
                    None => decoded,
                }));
            }
            previous = Some(decoded);
        }
        Ok(previous)
    }

    /// Decode the frame whose timestamp is nearest to `position`.
    pub(crate) fn closest_frame(
        &mut self,
        position: Duration,
    ) -> Result<Option<DecodedFrame>, FrameStepError> {
        self.seek_keyframe(position)?;
        let mut previous: Option<DecodedFrame> = None;
        while let Some(decoded) = self.next_frame()? {
            if decoded.position >= position {
                let closest = match previous {
                    Some(before) if position - before.position < decoded.position - position => {
                        before
                    }
                    _ => decoded,
                };
                return Ok(Some(closest));
            }
            previous = Some(decoded);
        }
        Ok(previous)
    }

    /// Convert a decoded frame to an RGB image.
    pub(crate) fn render(&mut self, decoded: &DecodedFrame) -> Result<DynamicImage, FrameStepError> {
        let mut rgb_frame = VideoFrame::empty();
        self.scaler.run(&decoded.frame, &mut rgb_frame)?;

        let width = self.info.width;
        let height = self.info.height;
        let buffer = rgb_buffer(&rgb_frame, width, height);
        let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            FrameStepError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })?;
        Ok(DynamicImage::ImageRgb8(image))
    }
}

/// Copy the RGB24 plane of `frame`, dropping any stride padding.
fn rgb_buffer(frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;
    let data = frame.data(0);

    if stride == row_bytes {
        return data[..row_bytes * height as usize].to_vec();
    }

    let mut buffer = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        buffer.extend_from_slice(&data[start..start + row_bytes]);
    }
    buffer
}
