//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use framemark::{
    AssetId, FrameLifecycleManager, FrameMarkError, FrameSize, HapticSignal, HapticSink,
    MemoryPreferences, PhotoStore, Preferences, ProgressCallback, ProgressInfo, Timestamp,
    VideoDecoder, VideoRef,
};
use image::DynamicImage;
use tokio::sync::Semaphore;

pub const NATURAL_SIZE: FrameSize = FrameSize {
    width: 8,
    height: 4,
};

pub fn ts(seconds: u64) -> Timestamp {
    Timestamp::new(seconds, 1).expect("valid timestamp")
}

// ── Decoder ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDecoder {
    failing: Mutex<HashSet<u64>>,
    fail_prepare: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    pub decoded: Mutex<Vec<Timestamp>>,
    pub videos: Mutex<Vec<VideoRef>>,
    pub sizes: Mutex<Vec<Option<FrameSize>>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each decode waits for one permit from `gate`.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Fail every decode at `seconds` (whole-second timestamps only).
    pub fn fail_at(self, seconds: u64) -> Self {
        self.failing.lock().unwrap().insert(seconds);
        self
    }

    pub fn fail_prepare(self) -> Self {
        self.fail_prepare.store(true, Ordering::SeqCst);
        self
    }

    pub fn decoded(&self) -> Vec<Timestamp> {
        self.decoded.lock().unwrap().clone()
    }

    pub fn videos(&self) -> Vec<String> {
        self.videos
            .lock()
            .unwrap()
            .iter()
            .map(|video| video.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl VideoDecoder for FakeDecoder {
    async fn prepare(&self, _video: &VideoRef) -> Result<FrameSize, FrameMarkError> {
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(FrameMarkError::NoVideoStream);
        }
        Ok(NATURAL_SIZE)
    }

    async fn decode_frame(
        &self,
        video: &VideoRef,
        timestamp: Timestamp,
        size: Option<FrameSize>,
    ) -> Result<DynamicImage, FrameMarkError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        self.decoded.lock().unwrap().push(timestamp);
        self.videos.lock().unwrap().push(video.clone());
        self.sizes.lock().unwrap().push(size);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let seconds = timestamp.as_duration().as_secs();
        if self.failing.lock().unwrap().contains(&seconds) {
            return Err(FrameMarkError::DecodeError(format!("no frame at {timestamp}")));
        }

        let size = size.unwrap_or(FrameSize::new(1, 1));
        Ok(DynamicImage::new_rgb8(size.width, size.height))
    }
}

// ── Photo store ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryPhotoStore {
    assets: Mutex<HashMap<AssetId, Option<String>>>,
    next_id: AtomicUsize,
    fail_save_after: Mutex<Option<usize>>,
    fail_deletes: AtomicBool,
    pub delete_requests: Mutex<Vec<AssetId>>,
}

impl MemoryPhotoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `count` saves succeed, then fail every later one.
    pub fn fail_saves_after(self, count: usize) -> Self {
        *self.fail_save_after.lock().unwrap() = Some(count);
        self
    }

    pub fn fail_deletes(self) -> Self {
        self.fail_deletes.store(true, Ordering::SeqCst);
        self
    }

    pub fn contains(&self, asset_id: &AssetId) -> bool {
        self.assets.lock().unwrap().contains_key(asset_id)
    }

    pub fn album_of(&self, asset_id: &AssetId) -> Option<String> {
        self.assets.lock().unwrap().get(asset_id).cloned().flatten()
    }

    pub fn len(&self) -> usize {
        self.assets.lock().unwrap().len()
    }

    /// Drop an asset behind the manager's back.
    pub fn remove_externally(&self, asset_id: &AssetId) {
        self.assets.lock().unwrap().remove(asset_id);
    }

    pub fn delete_requests(&self) -> Vec<AssetId> {
        self.delete_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    async fn save(
        &self,
        _image: &DynamicImage,
        album: Option<&str>,
    ) -> Result<AssetId, FrameMarkError> {
        let mut assets = self.assets.lock().unwrap();
        if let Some(limit) = *self.fail_save_after.lock().unwrap() {
            if assets.len() >= limit {
                return Err(FrameMarkError::NotAuthorized);
            }
        }
        let id = AssetId::new(format!(
            "asset-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        assets.insert(id.clone(), album.map(str::to_owned));
        Ok(id)
    }

    async fn delete(&self, asset_id: &AssetId) -> Result<(), FrameMarkError> {
        self.delete_requests.lock().unwrap().push(asset_id.clone());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(FrameMarkError::StoreError("library is read-only".to_string()));
        }
        // Missing assets count as deleted.
        self.assets.lock().unwrap().remove(asset_id);
        Ok(())
    }
}

// ── Observers ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingHaptics {
    pub signals: Mutex<Vec<HapticSignal>>,
}

impl RecordingHaptics {
    pub fn signals(&self) -> Vec<HapticSignal> {
        self.signals.lock().unwrap().clone()
    }
}

impl HapticSink for RecordingHaptics {
    fn emit(&self, signal: HapticSignal) {
        self.signals.lock().unwrap().push(signal);
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    pub infos: Mutex<Vec<ProgressInfo>>,
}

impl RecordingProgress {
    pub fn infos(&self) -> Vec<ProgressInfo> {
        self.infos.lock().unwrap().clone()
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.infos.lock().unwrap().push(info.clone());
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub manager: Arc<FrameLifecycleManager>,
    pub decoder: Arc<FakeDecoder>,
    pub store: Arc<MemoryPhotoStore>,
    pub preferences: Arc<MemoryPreferences>,
    pub haptics: Arc<RecordingHaptics>,
    pub progress: Arc<RecordingProgress>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeDecoder::new(), MemoryPhotoStore::new())
    }

    pub fn with(decoder: FakeDecoder, store: MemoryPhotoStore) -> Self {
        let decoder = Arc::new(decoder);
        let store = Arc::new(store);
        let preferences = Arc::new(MemoryPreferences::new(Preferences::new()));
        let haptics = Arc::new(RecordingHaptics::default());
        let progress = Arc::new(RecordingProgress::default());

        let manager = FrameLifecycleManager::new(
            decoder.clone(),
            store.clone(),
            preferences.clone(),
        )
        .with_haptics(haptics.clone())
        .with_progress(progress.clone());

        Self {
            manager: Arc::new(manager),
            decoder,
            store,
            preferences,
            haptics,
            progress,
        }
    }

    /// Select `video.mp4` and mark each whole-second timestamp in order.
    pub fn mark(&self, seconds: &[u64]) {
        self.manager.select_video("video.mp4");
        for &s in seconds {
            self.manager
                .mark_current_position(ts(s))
                .expect("marking should succeed");
        }
    }
}
