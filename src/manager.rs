//! The frame lifecycle manager.
//!
//! [`FrameLifecycleManager`] owns the marks for the selected video and the
//! frames already extracted from it. It runs batch extraction through a
//! [`VideoDecoder`] and a [`PhotoStore`], reports progress, and keeps local
//! state and the photo store in step when frames are deleted.
//!
//! All state sits behind one mutex that is never held across an `.await`,
//! so the manager can be shared through an [`Arc`] between a UI task and a
//! worker task. Each change publishes a fresh [`ManagerSnapshot`] on a
//! [`watch`] channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framemark::{
//!     DirectoryPhotoStore, FfmpegDecoder, FrameLifecycleManager, MemoryPreferences,
//!     Preferences,
//! };
//!
//! # async fn example() -> Result<(), framemark::FrameMarkError> {
//! let manager = FrameLifecycleManager::new(
//!     Arc::new(FfmpegDecoder::new()?),
//!     Arc::new(DirectoryPhotoStore::open("library")?),
//!     Arc::new(MemoryPreferences::new(Preferences::new())),
//! );
//!
//! manager.select_video("input.mp4");
//! manager.mark_current_position("00:02.5".parse()?)?;
//! manager.mark_current_position("00:07".parse()?)?;
//!
//! let report = manager.extract_all().await?;
//! println!("{} of {} frames saved", report.extracted_count(), report.len());
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashSet,
    fmt::{Debug, Formatter, Result as FmtResult},
    mem,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{
    decoder::VideoDecoder,
    error::FrameMarkError,
    frame::{AssetId, ExtractedFrame, FrameSize, MarkedFrame, VideoRef},
    haptics::{HapticSignal, HapticSink, NoOpHaptics},
    preferences::PreferenceStore,
    progress::{NoOpProgress, OperationType, ProgressCallback, ProgressTracker},
    store::PhotoStore,
    timestamp::Timestamp,
};

/// Whether a batch extraction is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerPhase {
    /// No batch running; every operation is available.
    #[default]
    Idle,
    /// A batch is running; marks are locked and `extract_all` is rejected.
    Extracting,
}

/// A point-in-time copy of the manager's state, for rendering.
#[derive(Debug, Clone, Default)]
pub struct ManagerSnapshot {
    /// The selected video, if any.
    pub selected_video: Option<VideoRef>,
    /// Marks in the order they were created.
    pub marks: Vec<MarkedFrame>,
    /// Extracted frames in the order they were produced.
    pub extracted: Vec<ExtractedFrame>,
    /// Current phase.
    pub phase: ManagerPhase,
    /// Fraction of the running batch completed, `0.0` when idle.
    pub progress: f64,
}

impl ManagerSnapshot {
    /// `true` while a batch extraction is running.
    pub fn is_extracting(&self) -> bool {
        self.phase == ManagerPhase::Extracting
    }
}

#[derive(Default)]
struct SessionState {
    selected_video: Option<VideoRef>,
    marks: Vec<MarkedFrame>,
    extracted: Vec<ExtractedFrame>,
    phase: ManagerPhase,
    progress: f64,
}

impl SessionState {
    fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            selected_video: self.selected_video.clone(),
            marks: self.marks.clone(),
            extracted: self.extracted.clone(),
            phase: self.phase,
            progress: self.progress,
        }
    }

    fn ensure_idle(&self) -> Result<(), FrameMarkError> {
        match self.phase {
            ManagerPhase::Idle => Ok(()),
            ManagerPhase::Extracting => Err(FrameMarkError::ExtractionInProgress),
        }
    }
}

/// What happened to one mark during [`FrameLifecycleManager::extract_all`].
#[derive(Debug)]
pub struct MarkOutcome {
    /// The mark that was processed.
    pub mark: MarkedFrame,
    /// The frame it produced, or why it was skipped.
    pub result: Result<ExtractedFrame, FrameMarkError>,
}

/// Per-mark results of a batch, in mark order.
#[derive(Debug, Default)]
#[must_use]
pub struct ExtractionReport {
    outcomes: Vec<MarkOutcome>,
}

impl ExtractionReport {
    /// Outcomes in the order the marks were processed.
    pub fn outcomes(&self) -> &[MarkOutcome] {
        &self.outcomes
    }

    /// Number of marks processed.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// `true` when the batch was a no-op.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of marks that produced a frame.
    pub fn extracted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of marks that were skipped.
    pub fn failed_count(&self) -> usize {
        self.len() - self.extracted_count()
    }

    /// The frames produced, in mark order.
    pub fn extracted(&self) -> impl Iterator<Item = &ExtractedFrame> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// The skipped marks and their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&MarkedFrame, &FrameMarkError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|error| (&o.mark, error)))
    }
}

/// Counts from a finished background deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeletionSummary {
    /// Assets the store was asked to delete.
    pub attempted: usize,
    /// Requests that failed. These are logged and otherwise ignored.
    pub failed: usize,
}

/// Handle to the background task that removes deleted frames' assets from
/// the photo store.
///
/// The task is detached: dropping this handle does not cancel it, and its
/// failures are logged and swallowed. Awaiting [`join`](Self::join) is only
/// useful to learn when the store has caught up.
#[derive(Debug)]
pub struct DetachedDeletion {
    handle: Option<JoinHandle<DeletionSummary>>,
}

impl DetachedDeletion {
    fn none() -> Self {
        Self { handle: None }
    }

    /// `true` when no store request was issued (no asset ids, or no runtime).
    pub fn is_empty(&self) -> bool {
        self.handle.is_none()
    }

    /// Wait for the background task to finish.
    pub async fn join(self) -> DeletionSummary {
        match self.handle {
            Some(handle) => handle.await.unwrap_or_else(|error| {
                log::warn!("Asset deletion task did not complete: {error}");
                DeletionSummary::default()
            }),
            None => DeletionSummary::default(),
        }
    }
}

/// Returns the manager to [`ManagerPhase::Idle`] when a batch ends, whether
/// it ran to completion or its future was dropped part-way.
struct BatchGuard<'a> {
    manager: &'a FrameLifecycleManager,
    finished: bool,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("Extraction cancelled before all marks were processed");
        }
        self.manager.update(|state| {
            state.marks.clear();
            state.phase = ManagerPhase::Idle;
            state.progress = 0.0;
        });
    }
}

/// Tracks marked timestamps and extracted frames for one video session.
pub struct FrameLifecycleManager {
    decoder: Arc<dyn VideoDecoder>,
    store: Arc<dyn PhotoStore>,
    preferences: Arc<dyn PreferenceStore>,
    haptics: Arc<dyn HapticSink>,
    progress: Arc<dyn ProgressCallback>,
    state: Mutex<SessionState>,
    updates: watch::Sender<ManagerSnapshot>,
}

impl Debug for FrameLifecycleManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let snapshot = self.snapshot();
        f.debug_struct("FrameLifecycleManager")
            .field("selected_video", &snapshot.selected_video)
            .field("marks", &snapshot.marks.len())
            .field("extracted", &snapshot.extracted.len())
            .field("phase", &snapshot.phase)
            .finish_non_exhaustive()
    }
}

impl FrameLifecycleManager {
    /// Create a manager with no haptics and no progress callback.
    pub fn new(
        decoder: Arc<dyn VideoDecoder>,
        store: Arc<dyn PhotoStore>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        let (updates, _) = watch::channel(ManagerSnapshot::default());
        Self {
            decoder,
            store,
            preferences,
            haptics: Arc::new(NoOpHaptics),
            progress: Arc::new(NoOpProgress),
            state: Mutex::new(SessionState::default()),
            updates,
        }
    }

    /// Forward haptic signals to `sink` (subject to the haptics preference).
    #[must_use]
    pub fn with_haptics(mut self, sink: Arc<dyn HapticSink>) -> Self {
        self.haptics = sink;
        self
    }

    /// Report per-item progress of extraction and deletion batches.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    // ── State access ───────────────────────────────────────────────

    /// A copy of the current state.
    pub fn snapshot(&self) -> ManagerSnapshot {
        self.read(SessionState::snapshot)
    }

    /// Receive a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<ManagerSnapshot> {
        self.updates.subscribe()
    }

    /// The selected video, if any.
    pub fn selected_video(&self) -> Option<VideoRef> {
        self.read(|state| state.selected_video.clone())
    }

    /// Current marks, in creation order.
    pub fn marks(&self) -> Vec<MarkedFrame> {
        self.read(|state| state.marks.clone())
    }

    /// Extracted frames, in extraction order.
    pub fn extracted(&self) -> Vec<ExtractedFrame> {
        self.read(|state| state.extracted.clone())
    }

    /// Current phase.
    pub fn phase(&self) -> ManagerPhase {
        self.read(|state| state.phase)
    }

    /// `true` while a batch extraction is running.
    pub fn is_extracting(&self) -> bool {
        self.phase() == ManagerPhase::Extracting
    }

    /// Fraction of the running batch completed.
    pub fn progress(&self) -> f64 {
        self.read(|state| state.progress)
    }

    /// Whether operations will currently emit haptic signals.
    pub fn haptics_enabled(&self) -> bool {
        self.preferences.preferences().haptics_enabled
    }

    // ── Marks ──────────────────────────────────────────────────────

    /// Select the video to mark.
    ///
    /// Choosing a different video drops existing marks, since they refer
    /// to the old one. While a batch runs the marks are left alone; the
    /// batch consumes them when it finishes.
    pub fn select_video(&self, video: impl Into<VideoRef>) {
        let video = video.into();
        self.update(|state| {
            let switching = state.selected_video.as_ref() != Some(&video);
            if switching && state.phase == ManagerPhase::Idle && !state.marks.is_empty() {
                log::debug!(
                    "Dropping {} mark(s) for previous video on switch to {video}",
                    state.marks.len()
                );
                state.marks.clear();
            }
            state.selected_video = Some(video);
        });
    }

    /// Mark `timestamp` in the selected video.
    ///
    /// Marks are never deduplicated: marking the same instant twice yields
    /// two marks.
    ///
    /// # Errors
    ///
    /// - [`FrameMarkError::NoVideoSelected`] if no video is selected.
    /// - [`FrameMarkError::ExtractionInProgress`] while a batch runs.
    pub fn mark_current_position(
        &self,
        timestamp: Timestamp,
    ) -> Result<MarkedFrame, FrameMarkError> {
        let mark = self.update(|state| -> Result<_, FrameMarkError> {
            let video = state
                .selected_video
                .clone()
                .ok_or(FrameMarkError::NoVideoSelected)?;
            state.ensure_idle()?;
            let mark = MarkedFrame::new(timestamp, video);
            state.marks.push(mark.clone());
            Ok(mark)
        })?;

        log::debug!("Marked {} ({})", mark.timestamp, mark.id);
        self.signal(HapticSignal::Medium);
        Ok(mark)
    }

    /// Remove the mark with `id`. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::ExtractionInProgress`] while a batch runs.
    pub fn unmark(&self, id: Uuid) -> Result<bool, FrameMarkError> {
        let removed = self.update(|state| -> Result<_, FrameMarkError> {
            state.ensure_idle()?;
            let before = state.marks.len();
            state.marks.retain(|mark| mark.id != id);
            Ok(state.marks.len() != before)
        })?;

        if removed {
            log::debug!("Unmarked {id}");
            self.signal(HapticSignal::Light);
        }
        Ok(removed)
    }

    /// Remove every mark.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::ExtractionInProgress`] while a batch runs.
    pub fn clear_marks(&self) -> Result<(), FrameMarkError> {
        self.update(|state| -> Result<_, FrameMarkError> {
            state.ensure_idle()?;
            state.marks.clear();
            Ok(())
        })?;

        self.signal(HapticSignal::Light);
        Ok(())
    }

    // ── Extraction ─────────────────────────────────────────────────

    /// Extract every mark as a still image and save it to the photo store.
    ///
    /// Marks are processed one at a time in list order. A mark that fails
    /// to decode or save is skipped and recorded in the report; the batch
    /// always runs to the end, then clears all marks. With no marks this is
    /// a no-op that returns an empty report.
    ///
    /// Dropping the returned future cancels the batch: frames already
    /// extracted are kept, the remaining marks are cleared, and the manager
    /// is idle again.
    ///
    /// # Errors
    ///
    /// - [`FrameMarkError::ExtractionInProgress`] if a batch is already
    ///   running. The running batch is unaffected.
    /// - [`FrameMarkError::NoVideoSelected`] if marks exist without a video.
    pub async fn extract_all(&self) -> Result<ExtractionReport, FrameMarkError> {
        let claimed = self.update(|state| -> Result<_, FrameMarkError> {
            state.ensure_idle()?;
            if state.marks.is_empty() {
                return Ok(None);
            }
            let video = state
                .selected_video
                .clone()
                .ok_or(FrameMarkError::NoVideoSelected)?;
            state.phase = ManagerPhase::Extracting;
            state.progress = 0.0;
            Ok(Some((video, state.marks.clone())))
        })?;

        let Some((video, marks)) = claimed else {
            log::debug!("Nothing marked, skipping extraction");
            return Ok(ExtractionReport::default());
        };

        let mut guard = BatchGuard {
            manager: self,
            finished: false,
        };
        let total = marks.len();
        log::info!("Extracting {total} marked frame(s) from {video}");

        let size = match self.decoder.prepare(&video).await {
            Ok(size) => Some(size),
            Err(error) => {
                log::warn!(
                    "Could not read natural size of {video}, using decoder default: {error}"
                );
                None
            }
        };

        let mut tracker = ProgressTracker::new(
            self.progress.clone(),
            OperationType::FrameExtraction,
            total as u64,
        );
        let mut outcomes = Vec::with_capacity(total);

        for (index, mark) in marks.into_iter().enumerate() {
            let result = self.extract_one(&video, &mark, size).await;
            let fraction = tracker.advance(result.is_ok(), Some(mark.timestamp));

            match &result {
                Ok(frame) => {
                    let frame = frame.clone();
                    self.update(|state| {
                        state.extracted.push(frame);
                        state.progress = fraction;
                    });
                }
                Err(error) => {
                    log::warn!(
                        "Skipping mark {}/{total} at {}: {error}",
                        index + 1,
                        mark.timestamp
                    );
                    self.update(|state| state.progress = fraction);
                }
            }

            outcomes.push(MarkOutcome { mark, result });
        }

        guard.finished = true;
        drop(guard);

        let report = ExtractionReport { outcomes };
        log::info!(
            "Extraction finished: {} saved, {} skipped",
            report.extracted_count(),
            report.failed_count()
        );
        self.signal(HapticSignal::Success);
        Ok(report)
    }

    async fn extract_one(
        &self,
        video: &VideoRef,
        mark: &MarkedFrame,
        size: Option<FrameSize>,
    ) -> Result<ExtractedFrame, FrameMarkError> {
        let image = self
            .decoder
            .decode_frame(video, mark.timestamp, size)
            .await?;

        let preferences = self.preferences.preferences();
        let asset_id = self.store.save(&image, preferences.album()).await?;
        log::debug!("Saved {} as asset {asset_id}", mark.timestamp);

        Ok(ExtractedFrame::new(mark.clone(), image, Some(asset_id)))
    }

    // ── Deletion ───────────────────────────────────────────────────

    /// Remove `frame` from the extracted list and, in the background, its
    /// asset from the photo store.
    ///
    /// # Runtime
    ///
    /// The store request is spawned on the current Tokio runtime. Called
    /// outside a runtime, the local removal still happens but the asset is
    /// left in the photo store (a warning is logged) and the returned
    /// handle is [empty](DetachedDeletion::is_empty).
    pub fn delete_extracted(&self, frame: &ExtractedFrame) -> DetachedDeletion {
        self.update(|state| state.extracted.retain(|f| f.id != frame.id));
        log::debug!("Deleted extracted frame {}", frame.id);

        self.signal(HapticSignal::Light);
        self.spawn_asset_deletion(frame.asset_id.iter().cloned().collect())
    }

    /// Remove several frames at once. Local removal happens in one step;
    /// their assets are deleted one after another in the background.
    ///
    /// # Runtime
    ///
    /// The store request is spawned on the current Tokio runtime. Called
    /// outside a runtime, the local removal still happens but the asset is
    /// left in the photo store (a warning is logged) and the returned
    /// handle is [empty](DetachedDeletion::is_empty).
    pub fn delete_extracted_batch(&self, frames: &[ExtractedFrame]) -> DetachedDeletion {
        let ids: HashSet<Uuid> = frames.iter().map(|frame| frame.id).collect();
        self.update(|state| state.extracted.retain(|f| !ids.contains(&f.id)));
        log::debug!("Deleted {} extracted frame(s)", ids.len());

        self.signal(HapticSignal::Medium);
        self.spawn_asset_deletion(
            frames
                .iter()
                .filter_map(|frame| frame.asset_id.clone())
                .collect(),
        )
    }

    /// Remove every extracted frame and, in the background, their assets.
    ///
    /// # Runtime
    ///
    /// The store request is spawned on the current Tokio runtime. Called
    /// outside a runtime, the local removal still happens but the asset is
    /// left in the photo store (a warning is logged) and the returned
    /// handle is [empty](DetachedDeletion::is_empty).
    pub fn clear_all_extracted(&self) -> DetachedDeletion {
        let removed = self.update(|state| mem::take(&mut state.extracted));
        log::debug!("Cleared {} extracted frame(s)", removed.len());

        self.signal(HapticSignal::Heavy);
        self.spawn_asset_deletion(
            removed
                .into_iter()
                .filter_map(|frame| frame.asset_id)
                .collect(),
        )
    }

    /// Issue one store delete per asset, sequentially, on a detached task.
    /// Each failure is logged and the next asset is still attempted.
    fn spawn_asset_deletion(&self, asset_ids: Vec<AssetId>) -> DetachedDeletion {
        if asset_ids.is_empty() {
            return DetachedDeletion::none();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!(
                "No async runtime available, {} asset(s) left in the photo store",
                asset_ids.len()
            );
            return DetachedDeletion::none();
        };

        let store = Arc::clone(&self.store);
        let progress = Arc::clone(&self.progress);
        let handle = runtime.spawn(async move {
            let mut tracker = ProgressTracker::new(
                progress,
                OperationType::AssetDeletion,
                asset_ids.len() as u64,
            );
            let mut summary = DeletionSummary::default();

            for asset_id in asset_ids {
                summary.attempted += 1;
                let deleted = match store.delete(&asset_id).await {
                    Ok(()) => true,
                    Err(error) => {
                        log::warn!("Could not delete asset {asset_id}: {error}");
                        summary.failed += 1;
                        false
                    }
                };
                tracker.advance(deleted, None);
            }

            summary
        });

        DetachedDeletion {
            handle: Some(handle),
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn signal(&self, signal: HapticSignal) {
        if self.haptics_enabled() {
            self.haptics.emit(signal);
        }
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Apply `f` under the state lock and publish the resulting snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut state);
        self.updates.send_replace(state.snapshot());
        result
    }
}
