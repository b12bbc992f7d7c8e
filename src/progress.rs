//! Progress reporting for batch operations.
//!
//! This module provides [`ProgressCallback`] for monitoring a running batch
//! and [`ProgressInfo`] for detailed progress snapshots. The manager's own
//! snapshot only carries the completed fraction; a callback also sees
//! timing, the timestamp just processed, and whether it succeeded.
//!
//! # Example
//!
//! ```
//! use framemark::{ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{:?}] {:.0}% complete", info.operation, info.fraction * 100.0);
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::timestamp::Timestamp;

/// The kind of batch currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding marks and saving them to the photo store.
    FrameExtraction,
    /// Removing extracted frames' assets from the photo store.
    AssetDeletion,
}

/// A snapshot of batch progress, delivered after each item.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many items have been processed so far, failures included.
    pub current: u64,
    /// Total items in the batch.
    pub total: u64,
    /// `current / total`, in `[0, 1]`.
    pub fraction: f64,
    /// Whether the item just processed succeeded.
    pub succeeded: bool,
    /// Wall-clock time elapsed since the batch started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The timestamp of the item just processed (extraction only).
    pub current_timestamp: Option<Timestamp>,
}

/// Trait for receiving progress updates during a batch.
///
/// Implementations must be [`Send`] and [`Sync`] because the batch may run
/// on any task of a multi-threaded runtime.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// batch.
pub trait ProgressCallback: Send + Sync {
    /// Called once per processed item.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: u64,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one processed item, report it, and return the new fraction.
    pub(crate) fn advance(&mut self, succeeded: bool, timestamp: Option<Timestamp>) -> f64 {
        self.current = (self.current + 1).min(self.total);
        let fraction = self.fraction();
        let elapsed = self.start_time.elapsed();

        let estimated_remaining = if self.current > 0 {
            let remaining = self.total.saturating_sub(self.current);
            let per_item = elapsed / self.current as u32;
            Some(per_item * remaining as u32)
        } else {
            None
        };

        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            fraction,
            succeeded,
            elapsed,
            estimated_remaining,
            current_timestamp: timestamp,
        };

        self.callback.on_progress(&info);
        fraction
    }

    fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        if self.current == self.total {
            return 1.0;
        }
        self.current as f64 / self.total as f64
    }
}
