//! Marked and extracted frame entities.
//!
//! A [`MarkedFrame`] is a timestamp the user wants as a still image. Running
//! a batch turns each mark into an [`ExtractedFrame`] that remembers the
//! mark it came from and the photo-store asset it was saved as.

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp::Timestamp;

/// Reference to a video: a filesystem path or a URL understood by the
/// decoder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoRef(String);

impl VideoRef {
    /// Wrap a path or URL.
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    /// The raw source string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The source interpreted as a filesystem path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl From<&str> for VideoRef {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for VideoRef {
    fn from(source: String) -> Self {
        Self(source)
    }
}

impl From<PathBuf> for VideoRef {
    fn from(path: PathBuf) -> Self {
        Self::new(path.to_string_lossy().into_owned())
    }
}

impl Display for VideoRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Stable identifier of an asset inside a [`PhotoStore`](crate::PhotoStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    /// Wrap an identifier issued by a photo store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Pixel dimensions of a video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Create a size from width and height.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Display for FrameSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A timestamp in a specific video, slated for extraction.
///
/// Marks are only meaningful for the video that was selected when they
/// were created; the manager drops them when another video is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkedFrame {
    /// Identifier assigned at creation.
    pub id: Uuid,
    /// Offset into the video.
    pub timestamp: Timestamp,
    /// The video this mark belongs to.
    pub video: VideoRef,
}

impl MarkedFrame {
    /// Create a mark with a fresh identifier.
    pub fn new(timestamp: Timestamp, video: VideoRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            video,
        }
    }
}

/// A still image produced from a [`MarkedFrame`].
#[derive(Clone)]
pub struct ExtractedFrame {
    /// Identifier assigned at extraction.
    pub id: Uuid,
    /// The mark this frame was produced from.
    pub source_mark: MarkedFrame,
    /// The decoded image, shared with every snapshot that lists this frame.
    pub image: Arc<DynamicImage>,
    /// When the frame was extracted.
    pub extracted_at: DateTime<Utc>,
    /// Asset identifier returned by the photo store, if the image was saved.
    pub asset_id: Option<AssetId>,
}

impl ExtractedFrame {
    /// Build an extracted frame stamped with the current time.
    pub fn new(source_mark: MarkedFrame, image: DynamicImage, asset_id: Option<AssetId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_mark,
            image: Arc::new(image),
            extracted_at: Utc::now(),
            asset_id,
        }
    }

    /// Timestamp of the originating mark.
    pub fn timestamp(&self) -> Timestamp {
        self.source_mark.timestamp
    }
}

impl Debug for ExtractedFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractedFrame")
            .field("id", &self.id)
            .field("source_mark", &self.source_mark)
            .field("dimensions", &(self.image.width(), self.image.height()))
            .field("extracted_at", &self.extracted_at)
            .field("asset_id", &self.asset_id)
            .finish()
    }
}

impl PartialEq for ExtractedFrame {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
