//! The video decoder collaborator.
//!
//! The manager never touches codecs itself. It asks a [`VideoDecoder`] for
//! a video's natural size once per batch, then for one still image per
//! mark. [`FfmpegDecoder`](crate::FfmpegDecoder) is the bundled
//! implementation; tests and embedders can provide their own.

use async_trait::async_trait;
use image::DynamicImage;

use crate::{
    error::FrameMarkError,
    frame::{FrameSize, VideoRef},
    timestamp::Timestamp,
};

/// Produces still images from a video.
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    /// Read the natural (un-scaled) size of the video's first video track.
    ///
    /// # Errors
    ///
    /// Implementations return [`FrameMarkError::NoVideoStream`],
    /// [`FrameMarkError::FileOpen`] or [`FrameMarkError::DecodeError`].
    async fn prepare(&self, video: &VideoRef) -> Result<FrameSize, FrameMarkError>;

    /// Decode the frame shown at `timestamp`.
    ///
    /// `size` is the output size resolved by [`prepare`](Self::prepare);
    /// `None` means the decoder's own native size.
    ///
    /// # Errors
    ///
    /// Implementations return [`FrameMarkError::DecodeError`] or
    /// [`FrameMarkError::InvalidTimestamp`] when no image can be produced.
    async fn decode_frame(
        &self,
        video: &VideoRef,
        timestamp: Timestamp,
        size: Option<FrameSize>,
    ) -> Result<DynamicImage, FrameMarkError>;
}
