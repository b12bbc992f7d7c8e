//! FFmpeg-backed [`VideoDecoder`].
//!
//! Every call opens a fresh demuxer on a blocking thread
//! (`tokio::task::spawn_blocking`), so decoding never stalls the async
//! runtime and no decoder state is shared between batches.
//!
//! Frame lookup seeks to the keyframe at or before the requested timestamp
//! and decodes forward to the first frame whose presentation time is at or
//! after it. A timestamp past the container's duration is rejected with
//! [`FrameMarkError::InvalidTimestamp`]; one that falls between the last
//! frame and the end of the container yields the last frame.
//!
//! # Example
//!
//! ```no_run
//! use framemark::{FfmpegDecoder, Timestamp, VideoDecoder, VideoRef};
//!
//! # async fn example() -> Result<(), framemark::FrameMarkError> {
//! let decoder = FfmpegDecoder::new()?;
//! let video = VideoRef::new("input.mp4");
//! let size = decoder.prepare(&video).await?;
//! let image = decoder
//!     .decode_frame(&video, "00:05".parse()?, Some(size))
//!     .await?;
//! image.save("frame_5s.png")?;
//! # Ok(())
//! # }
//! ```

use std::mem;

use async_trait::async_trait;
use ffmpeg_next::{
    codec::context::Context as CodecContext,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::log::Level,
};
use image::{DynamicImage, RgbImage};

use crate::{
    decoder::VideoDecoder,
    error::FrameMarkError,
    frame::{FrameSize, VideoRef},
    timestamp::Timestamp,
};

/// FFmpeg's own console verbosity, independent of the `log` facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Recoverable errors and worse.
    Error,
    /// Warnings and worse (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

/// Set what FFmpeg itself prints to stderr.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Decodes still frames with FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder {
    _initialized: (),
}

impl FfmpegDecoder {
    /// Initialise FFmpeg (idempotent) and create a decoder.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::FfmpegError`] if FFmpeg fails to initialise.
    pub fn new() -> Result<Self, FrameMarkError> {
        ffmpeg_next::init()?;
        Ok(Self { _initialized: () })
    }
}

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn prepare(&self, video: &VideoRef) -> Result<FrameSize, FrameMarkError> {
        let video = video.clone();
        tokio::task::spawn_blocking(move || probe_natural_size(&video))
            .await
            .map_err(|error| FrameMarkError::DecodeError(format!("decoder task failed: {error}")))?
    }

    async fn decode_frame(
        &self,
        video: &VideoRef,
        timestamp: Timestamp,
        size: Option<FrameSize>,
    ) -> Result<DynamicImage, FrameMarkError> {
        let video = video.clone();
        tokio::task::spawn_blocking(move || decode_at(&video, timestamp, size))
            .await
            .map_err(|error| FrameMarkError::DecodeError(format!("decoder task failed: {error}")))?
    }
}

fn open_input(video: &VideoRef) -> Result<Input, FrameMarkError> {
    log::debug!("Opening video: {video}");
    ffmpeg_next::format::input(&video.as_path()).map_err(|error| FrameMarkError::FileOpen {
        path: video.as_path().to_path_buf(),
        reason: error.to_string(),
    })
}

fn probe_natural_size(video: &VideoRef) -> Result<FrameSize, FrameMarkError> {
    let input_context = open_input(video)?;
    let stream = input_context
        .streams()
        .best(Type::Video)
        .ok_or(FrameMarkError::NoVideoStream)?;
    let decoder = CodecContext::from_parameters(stream.parameters())?
        .decoder()
        .video()?;

    let size = FrameSize::new(decoder.width(), decoder.height());
    log::debug!("Natural size of {video}: {size}");
    Ok(size)
}

fn decode_at(
    video: &VideoRef,
    timestamp: Timestamp,
    size: Option<FrameSize>,
) -> Result<DynamicImage, FrameMarkError> {
    let mut input_context = open_input(video)?;

    let duration_microseconds = input_context.duration();
    let target_microseconds = timestamp.as_duration().as_micros().min(i64::MAX as u128) as i64;
    if is_past_end(target_microseconds, duration_microseconds) {
        return Err(FrameMarkError::InvalidTimestamp(format!(
            "{timestamp} is past the end of {video}"
        )));
    }

    let (video_stream_index, time_base, mut decoder) = {
        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or(FrameMarkError::NoVideoStream)?;
        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;
        (stream.index(), stream.time_base(), decoder)
    };

    let output = size.unwrap_or_else(|| FrameSize::new(decoder.width(), decoder.height()));
    let mut scaler = ScalingContext::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        output.width,
        output.height,
        ScalingFlags::BILINEAR,
    )?;

    // Container-level seek expects AV_TIME_BASE (microseconds).
    input_context.seek(target_microseconds, ..target_microseconds)?;

    let target_pts =
        timestamp_to_stream_pts(timestamp, time_base.numerator(), time_base.denominator());

    let mut decoded_frame = VideoFrame::empty();
    let mut previous_frame: Option<VideoFrame> = None;
    let mut rgb_frame = VideoFrame::empty();

    for (stream, packet) in input_context.packets() {
        if stream.index() != video_stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;

        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            let pts = decoded_frame.timestamp().or(decoded_frame.pts()).unwrap_or(0);
            if pts >= target_pts {
                scaler.run(&decoded_frame, &mut rgb_frame)?;
                return frame_to_image(&rgb_frame, output);
            }
            let spare = previous_frame.take().unwrap_or_else(VideoFrame::empty);
            previous_frame = Some(mem::replace(&mut decoded_frame, spare));
        }
    }

    decoder.send_eof()?;
    while decoder.receive_frame(&mut decoded_frame).is_ok() {
        let pts = decoded_frame.timestamp().or(decoded_frame.pts()).unwrap_or(0);
        if pts >= target_pts {
            scaler.run(&decoded_frame, &mut rgb_frame)?;
            return frame_to_image(&rgb_frame, output);
        }
        let spare = previous_frame.take().unwrap_or_else(VideoFrame::empty);
        previous_frame = Some(mem::replace(&mut decoded_frame, spare));
    }

    match previous_frame {
        Some(last) => {
            log::debug!("{timestamp} is after the last frame of {video}, using the last frame");
            scaler.run(&last, &mut rgb_frame)?;
            frame_to_image(&rgb_frame, output)
        }
        None => Err(FrameMarkError::DecodeError(format!(
            "Could not locate a frame at {timestamp} in {video}"
        ))),
    }
}

/// `true` when `target` lies beyond a known container duration. Both are in
/// microseconds; a non-positive duration means the container did not report
/// one.
fn is_past_end(target: i64, duration: i64) -> bool {
    duration > 0 && target > duration
}

/// Express `timestamp` in a stream time base of `numerator / denominator`
/// seconds per tick, rounding down.
fn timestamp_to_stream_pts(timestamp: Timestamp, numerator: i32, denominator: i32) -> i64 {
    if numerator <= 0 || denominator <= 0 {
        return 0;
    }
    let ticks = timestamp.value() as i128 * denominator as i128
        / (timestamp.timescale() as i128 * numerator as i128);
    ticks.min(i64::MAX as i128) as i64
}

/// Copy an RGB24 frame into an image, dropping per-row stride padding.
fn frame_to_image(
    rgb_frame: &VideoFrame,
    size: FrameSize,
) -> Result<DynamicImage, FrameMarkError> {
    let stride = rgb_frame.stride(0);
    let row_bytes = size.width as usize * 3;
    let rows = size.height as usize;
    let data = rgb_frame.data(0);

    let buffer = if stride == row_bytes {
        data[..row_bytes * rows].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * rows);
        for row in 0..rows {
            let start = row * stride;
            buffer.extend_from_slice(&data[start..start + row_bytes]);
        }
        buffer
    };

    let rgb_image = RgbImage::from_raw(size.width, size.height, buffer).ok_or_else(|| {
        FrameMarkError::DecodeError(
            "Failed to construct RGB image from decoded frame data".to_string(),
        )
    })?;
    Ok(DynamicImage::ImageRgb8(rgb_image))
}
