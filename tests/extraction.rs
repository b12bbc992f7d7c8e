//! Batch extraction: ordering, failures, progress, and the single-batch rule.

mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use common::{FakeDecoder, Harness, MemoryPhotoStore, NATURAL_SIZE, ts};
use framemark::{
    FrameMarkError, HapticSignal, ManagerPhase, OperationType, PreferenceStore, Preferences,
};
use tokio::sync::Semaphore;

#[tokio::test]
async fn no_marks_is_a_noop() {
    let harness = Harness::new();
    harness.manager.select_video("video.mp4");

    let report = harness.manager.extract_all().await.unwrap();

    assert!(report.is_empty());
    assert_eq!(harness.manager.phase(), ManagerPhase::Idle);
    assert_eq!(harness.manager.progress(), 0.0);
    assert!(harness.progress.infos().is_empty());
    assert!(harness.decoder.decoded().is_empty());
    assert!(harness.haptics.signals().is_empty());
}

#[tokio::test]
async fn extraction_keeps_list_order_not_chronological() {
    let harness = Harness::new();
    harness.mark(&[2, 1, 3]);

    let report = harness.manager.extract_all().await.unwrap();

    let extracted: Vec<u64> = harness
        .manager
        .extracted()
        .iter()
        .map(|f| f.timestamp().as_duration().as_secs())
        .collect();
    assert_eq!(extracted, vec![2, 1, 3]);
    assert_eq!(harness.decoder.decoded(), vec![ts(2), ts(1), ts(3)]);
    assert_eq!(report.extracted_count(), 3);
    assert!(harness.manager.marks().is_empty());
}

#[tokio::test]
async fn extracted_frames_carry_their_mark_and_asset() {
    let harness = Harness::new();
    harness.mark(&[7]);
    let mark = harness.manager.marks()[0].clone();

    harness.manager.extract_all().await.unwrap();

    let frames = harness.manager.extracted();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].source_mark, mark);
    let asset_id = frames[0].asset_id.clone().expect("asset id");
    assert!(harness.store.contains(&asset_id));
    assert_eq!(frames[0].image.width(), NATURAL_SIZE.width);
    assert_eq!(frames[0].image.height(), NATURAL_SIZE.height);
}

#[tokio::test]
async fn natural_size_is_resolved_once_and_reused() {
    let harness = Harness::new();
    harness.mark(&[1, 2, 3]);

    harness.manager.extract_all().await.unwrap();

    let sizes = harness.decoder.sizes.lock().unwrap().clone();
    assert_eq!(sizes, vec![Some(NATURAL_SIZE); 3]);
}

#[tokio::test]
async fn failed_marks_are_skipped_and_all_marks_cleared() {
    // Decode fails at 2s; the store refuses its second save (the mark at 3s).
    let harness = Harness::with(
        FakeDecoder::new().fail_at(2),
        MemoryPhotoStore::new().fail_saves_after(1),
    );
    harness.mark(&[1, 2, 3]);

    let report = harness.manager.extract_all().await.unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.extracted_count(), 1);
    assert_eq!(report.failed_count(), 2);

    let failures: Vec<(u64, bool)> = report
        .failures()
        .map(|(mark, error)| (mark.timestamp.as_duration().as_secs(), error.is_store_error()))
        .collect();
    assert_eq!(failures, vec![(2, false), (3, true)]);

    assert!(harness.manager.marks().is_empty());
    assert_eq!(harness.manager.extracted().len(), 1);
    assert_eq!(harness.manager.phase(), ManagerPhase::Idle);
    assert_eq!(harness.manager.progress(), 0.0);
}

#[tokio::test]
async fn progress_is_monotonic_and_reaches_one() {
    let harness = Harness::with(FakeDecoder::new().fail_at(2), MemoryPhotoStore::new());
    harness.mark(&[1, 2, 3, 4]);

    harness.manager.extract_all().await.unwrap();

    let infos: Vec<_> = harness
        .progress
        .infos()
        .into_iter()
        .filter(|info| info.operation == OperationType::FrameExtraction)
        .collect();
    let fractions: Vec<f64> = infos.iter().map(|info| info.fraction).collect();

    assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
    for window in fractions.windows(2) {
        assert!(window[1] >= window[0]);
    }
    assert!(!infos[1].succeeded, "the failed mark still advances progress");
    assert_eq!(infos[3].current, 4);
    assert_eq!(infos[3].total, 4);
}

#[tokio::test]
async fn prepare_failure_still_runs_the_batch() {
    let harness = Harness::with(FakeDecoder::new().fail_prepare(), MemoryPhotoStore::new());
    harness.mark(&[1, 2]);

    let report = harness.manager.extract_all().await.unwrap();

    assert_eq!(report.extracted_count(), 2);
    let sizes = harness.decoder.sizes.lock().unwrap().clone();
    assert_eq!(sizes, vec![None, None]);
}

#[tokio::test]
async fn custom_album_preference_is_honoured() {
    let harness = Harness::new();
    harness
        .preferences
        .store(&Preferences::new().with_custom_album(" Trips "))
        .unwrap();
    harness.mark(&[1]);

    harness.manager.extract_all().await.unwrap();

    let asset_id = harness.manager.extracted()[0].asset_id.clone().unwrap();
    assert_eq!(harness.store.album_of(&asset_id), Some("Trips".to_string()));
}

#[tokio::test]
async fn default_library_when_album_disabled() {
    let harness = Harness::new();
    harness.mark(&[1]);

    harness.manager.extract_all().await.unwrap();

    let asset_id = harness.manager.extracted()[0].asset_id.clone().unwrap();
    assert_eq!(harness.store.album_of(&asset_id), None);
}

#[tokio::test]
async fn success_haptic_after_batch() {
    let harness = Harness::with(FakeDecoder::new().fail_at(1), MemoryPhotoStore::new());
    harness.mark(&[1]);

    harness.manager.extract_all().await.unwrap();

    assert_eq!(
        harness.haptics.signals(),
        vec![HapticSignal::Medium, HapticSignal::Success]
    );
}

#[tokio::test]
async fn fresh_manager_extracts_nothing() {
    let harness = Harness::new();

    let report = harness.manager.extract_all().await.unwrap();

    assert!(report.is_empty());
    assert!(harness.manager.selected_video().is_none());
}

#[tokio::test]
async fn second_batch_is_rejected_while_first_runs() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = Harness::with(FakeDecoder::gated(gate.clone()), MemoryPhotoStore::new());
    harness.mark(&[1, 2, 3]);

    let manager = harness.manager.clone();
    let first = tokio::spawn(async move { manager.extract_all().await });

    while !harness.manager.is_extracting() {
        tokio::task::yield_now().await;
    }

    let marks_before = harness.manager.marks();
    let second = harness.manager.extract_all().await;
    assert!(matches!(second, Err(FrameMarkError::ExtractionInProgress)));
    assert!(harness.manager.is_extracting());
    assert_eq!(harness.manager.marks(), marks_before);

    gate.add_permits(3);
    let report = first.await.unwrap().unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(harness.decoder.decoded().len(), 3);
    assert_eq!(harness.decoder.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(!harness.manager.is_extracting());
}

#[tokio::test]
async fn marks_are_locked_during_extraction() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = Harness::with(FakeDecoder::gated(gate.clone()), MemoryPhotoStore::new());
    harness.mark(&[1, 2]);
    let first_mark = harness.manager.marks()[0].id;

    let manager = harness.manager.clone();
    let batch = tokio::spawn(async move { manager.extract_all().await });
    while !harness.manager.is_extracting() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        harness.manager.mark_current_position(ts(9)),
        Err(FrameMarkError::ExtractionInProgress)
    ));
    assert!(matches!(
        harness.manager.unmark(first_mark),
        Err(FrameMarkError::ExtractionInProgress)
    ));
    assert!(matches!(
        harness.manager.clear_marks(),
        Err(FrameMarkError::ExtractionInProgress)
    ));
    assert_eq!(harness.manager.marks().len(), 2);

    gate.add_permits(2);
    batch.await.unwrap().unwrap();

    assert!(harness.manager.marks().is_empty());
    harness.manager.mark_current_position(ts(9)).unwrap();
}

#[tokio::test]
async fn subscribers_see_final_state() {
    let harness = Harness::new();
    let mut receiver = harness.manager.subscribe();
    harness.mark(&[1, 2]);

    harness.manager.extract_all().await.unwrap();

    assert!(receiver.has_changed().unwrap());
    let snapshot = receiver.borrow_and_update().clone();
    assert_eq!(snapshot.extracted.len(), 2);
    assert!(snapshot.marks.is_empty());
    assert_eq!(snapshot.phase, ManagerPhase::Idle);
    assert_eq!(snapshot.progress, 0.0);
}

#[tokio::test]
async fn dropped_batch_returns_manager_to_idle() {
    let gate = Arc::new(Semaphore::new(1));
    let harness = Harness::with(FakeDecoder::gated(gate.clone()), MemoryPhotoStore::new());
    harness.mark(&[1, 2, 3]);

    // Only the first mark gets a permit; the batch then stalls on the second.
    let timed_out =
        tokio::time::timeout(Duration::from_millis(20), harness.manager.extract_all()).await;
    assert!(timed_out.is_err());

    assert_eq!(harness.manager.phase(), ManagerPhase::Idle);
    assert_eq!(harness.manager.progress(), 0.0);
    assert!(harness.manager.marks().is_empty());
    assert_eq!(harness.manager.extracted().len(), 1);
    assert!(!harness.haptics.signals().contains(&HapticSignal::Success));

    harness.manager.mark_current_position(ts(4)).unwrap();
    gate.add_permits(1);
    let report = harness.manager.extract_all().await.unwrap();

    assert_eq!(report.extracted_count(), 1);
    assert_eq!(harness.manager.extracted().len(), 2);
    assert_eq!(harness.manager.phase(), ManagerPhase::Idle);
}

#[tokio::test]
async fn switching_video_mid_batch_keeps_batch_marks() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = Harness::with(FakeDecoder::gated(gate.clone()), MemoryPhotoStore::new());
    harness.mark(&[1, 2]);
    let marks = harness.manager.marks();

    let manager = harness.manager.clone();
    let batch = tokio::spawn(async move { manager.extract_all().await });
    while !harness.manager.is_extracting() {
        tokio::task::yield_now().await;
    }

    harness.manager.select_video("other.mp4");

    assert_eq!(harness.manager.marks(), marks);
    assert_eq!(
        harness.manager.selected_video().map(|v| v.as_str().to_string()),
        Some("other.mp4".to_string())
    );

    gate.add_permits(2);
    let report = batch.await.unwrap().unwrap();

    assert_eq!(report.extracted_count(), 2);
    assert_eq!(harness.decoder.videos(), vec!["video.mp4", "video.mp4"]);
    assert!(
        harness
            .manager
            .extracted()
            .iter()
            .all(|frame| frame.source_mark.video.as_str() == "video.mp4")
    );
    assert!(harness.manager.marks().is_empty());
    assert_eq!(
        harness.manager.selected_video().map(|v| v.as_str().to_string()),
        Some("other.mp4".to_string())
    );
}
