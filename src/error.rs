//! Error types for the `framemark` crate.
//!
//! This module defines [`FrameMarkError`], the unified error type returned by
//! all fallible operations in the crate. Decoder and photo-store failures
//! carry the upstream message so that a logged batch report is enough to
//! diagnose which mark failed and why.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use serde_json::Error as JsonError;
use thiserror::Error;

/// The unified error type for all `framemark` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameMarkError {
    /// A mark or extraction was requested before any video was selected.
    #[error("No video selected")]
    NoVideoSelected,

    /// The operation is not allowed while a batch extraction is running.
    #[error("A batch extraction is already in progress")]
    ExtractionInProgress,

    /// The video decoder could not produce a still image.
    #[error("Failed to decode video frame: {0}")]
    DecodeError(String),

    /// The photo store failed to save or delete an asset.
    #[error("Photo store error: {0}")]
    StoreError(String),

    /// The photo store refused access.
    #[error("Photo store access not authorized")]
    NotAuthorized,

    /// A timestamp was negative, malformed, or had a zero time base.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The video file could not be opened.
    #[error("Failed to open video at {path}: {reason}")]
    FileOpen {
        /// Path handed to the decoder.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// The preference file could not be parsed or written.
    #[error("Preferences error: {0}")]
    PreferencesError(#[from] JsonError),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while converting or encoding a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for FrameMarkError {
    fn from(error: FfmpegError) -> Self {
        FrameMarkError::FfmpegError(error.to_string())
    }
}

impl FrameMarkError {
    /// Whether the error came from the photo store (save, delete, or
    /// authorization).
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            FrameMarkError::StoreError(_) | FrameMarkError::NotAuthorized
        )
    }
}
