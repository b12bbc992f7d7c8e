//! # framemark
//!
//! Mark timestamps in a video and extract them as still images into a photo
//! store.
//!
//! The heart of the crate is [`FrameLifecycleManager`]: it keeps the ordered
//! list of marked timestamps for the selected video, turns them into
//! [`ExtractedFrame`]s one at a time through a [`VideoDecoder`] and a
//! [`PhotoStore`], reports progress, and deletes extracted frames both
//! locally and from the store.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framemark::{
//!     DirectoryPhotoStore, FfmpegDecoder, FrameLifecycleManager, JsonPreferenceFile,
//! };
//!
//! # async fn example() -> Result<(), framemark::FrameMarkError> {
//! let manager = FrameLifecycleManager::new(
//!     Arc::new(FfmpegDecoder::new()?),
//!     Arc::new(DirectoryPhotoStore::open("library")?),
//!     Arc::new(JsonPreferenceFile::new("preferences.json")),
//! );
//!
//! manager.select_video("holiday.mp4");
//! manager.mark_current_position("00:12.40".parse()?)?;
//! manager.mark_current_position("01:03".parse()?)?;
//!
//! let report = manager.extract_all().await?;
//! for (mark, error) in report.failures() {
//!     eprintln!("{} was skipped: {error}", mark.timestamp);
//! }
//!
//! // Remove the first frame again, locally and from the library.
//! if let Some(frame) = manager.extracted().first() {
//!     manager.delete_extracted(frame).join().await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Exact timestamps**: [`Timestamp`] is a rational time, so marks never
//!   drift through float rounding
//! - **Sequential batches**: marks are extracted in list order with one
//!   decoder call in flight; failed marks are skipped and reported
//! - **Progress**: per-item [`ProgressCallback`] plus a fraction in every
//!   [`ManagerSnapshot`]
//! - **Reactive state**: [`FrameLifecycleManager::subscribe`] yields a new
//!   snapshot after every change
//! - **Best-effort deletion**: store deletes run on detached tasks and never
//!   fail the local removal
//! - **Explicit preferences**: haptics and album settings come from a
//!   [`PreferenceStore`], read on every operation
//!
//! ## Requirements
//!
//! The bundled [`FfmpegDecoder`] needs the FFmpeg development libraries.
//! Batch extraction and background deletion run on a Tokio runtime.

pub mod decoder;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod haptics;
pub mod manager;
pub mod preferences;
pub mod progress;
pub mod store;
pub mod timestamp;

pub use decoder::VideoDecoder;
pub use error::FrameMarkError;
pub use ffmpeg::{FfmpegDecoder, FfmpegLogLevel, set_ffmpeg_log_level};
pub use frame::{AssetId, ExtractedFrame, FrameSize, MarkedFrame, VideoRef};
pub use haptics::{HapticSignal, HapticSink, NoOpHaptics};
pub use manager::{
    DeletionSummary, DetachedDeletion, ExtractionReport, FrameLifecycleManager, ManagerPhase,
    ManagerSnapshot, MarkOutcome,
};
pub use preferences::{
    DEFAULT_ALBUM_NAME, JsonPreferenceFile, MemoryPreferences, PreferenceStore, Preferences,
    normalize_album_name,
};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use store::{DirectoryPhotoStore, PhotoStore, StoredAsset};
pub use timestamp::{DEFAULT_TIMESCALE, Timestamp};
