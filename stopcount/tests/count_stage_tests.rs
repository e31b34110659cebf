//! Integration tests for the count stage: batching, cooldown, cancellation
//! and resume

mod helpers;

use helpers::{stop, test_date, test_pipeline, CountingCooldown, FakeApi};
use std::sync::Arc;
use stopcount::error::DownloaderError;
use stopcount::models::CountRecord;
use stopcount::storage::{stage, DataDir};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn parents(n: usize) -> Vec<stopcount::models::StopFeature> {
    (1..=n).map(|i| stop(&format!("P{:05}", i), None)).collect()
}

fn record_len(data: &DataDir, batch: usize) -> usize {
    let record: CountRecord =
        serde_json::from_slice(&std::fs::read(data.count_path(test_date(), batch)).unwrap()).unwrap();
    record.len()
}

#[tokio::test]
async fn test_9000_parents_three_batches_with_cooldown_between() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new(parents(9000)));
    let cooldown = Arc::new(CountingCooldown::default());
    let pipeline = test_pipeline(dir.path(), api.clone(), 4000).with_cooldown(cooldown.clone());

    pipeline.download_stations().await.unwrap();
    pipeline.build_hierarchy().await.unwrap();
    let summary = pipeline
        .count(test_date(), false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.counted, 3);
    assert_eq!(pipeline.data().list_count_records(test_date()).unwrap(), vec![1, 2, 3]);
    assert_eq!(record_len(pipeline.data(), 1), 4000);
    assert_eq!(record_len(pipeline.data(), 2), 4000);
    assert_eq!(record_len(pipeline.data(), 3), 1000);

    // One pause between each pair of batches, none after the last
    assert_eq!(*cooldown.calls.lock().unwrap(), vec![1, 2]);
    assert_eq!(api.request_count(), 9000);
}

#[tokio::test]
async fn test_cancel_mid_batch_keeps_finished_batches_only() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let api = Arc::new(
        FakeApi::new(parents(6))
            .with_pages("P00003", vec![10, 0])
            .cancel_when_requested("P00003", cancel.clone()),
    );
    let pipeline = test_pipeline(dir.path(), api.clone(), 2);

    pipeline.download_stations().await.unwrap();
    pipeline.build_hierarchy().await.unwrap();
    let err = pipeline.count(test_date(), false, &cancel).await.unwrap_err();

    assert!(matches!(err, DownloaderError::Cancelled));
    assert_eq!(pipeline.data().list_count_records(test_date()).unwrap(), vec![1]);
    assert!(!api.was_requested("P00005"));
}

#[tokio::test]
async fn test_resume_skips_recorded_batches() {
    let dir = TempDir::new().unwrap();
    let interrupted = CancellationToken::new();
    let api = Arc::new(
        FakeApi::new(parents(6))
            .with_pages("P00003", vec![10, 0])
            .cancel_when_requested("P00003", interrupted.clone()),
    );
    let pipeline = test_pipeline(dir.path(), api, 2);
    pipeline.download_stations().await.unwrap();
    pipeline.build_hierarchy().await.unwrap();
    assert!(pipeline.count(test_date(), false, &interrupted).await.is_err());

    let api = Arc::new(FakeApi::new(parents(6)).with_pages("P00003", vec![10, 0]));
    let cooldown = Arc::new(CountingCooldown::default());
    let resumed = test_pipeline(dir.path(), api.clone(), 2).with_cooldown(cooldown.clone());

    let summary = resumed
        .count(test_date(), true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.counted, 2);
    assert_eq!(summary.stop_times, 10);
    assert!(!api.was_requested("P00001"));
    assert_eq!(*cooldown.calls.lock().unwrap(), vec![2]);
    assert_eq!(resumed.data().list_count_records(test_date()).unwrap(), vec![1, 2, 3]);

    let totals = resumed.aggregate(test_date()).await.unwrap();
    assert_eq!(totals["P00003"], 10);
}

/// Count with `batch_size` until P00003 is requested, leaving only the
/// batches before it on disk
async fn interrupted_count(dir: &TempDir, batch_size: usize) {
    let interrupted = CancellationToken::new();
    let api = Arc::new(
        FakeApi::new(parents(6))
            .with_pages("P00003", vec![1, 0])
            .cancel_when_requested("P00003", interrupted.clone()),
    );
    let pipeline = test_pipeline(dir.path(), api, batch_size);
    pipeline.download_stations().await.unwrap();
    pipeline.build_hierarchy().await.unwrap();
    assert!(pipeline.count(test_date(), false, &interrupted).await.is_err());
}

#[tokio::test]
async fn test_resume_rejects_changed_batch_size() {
    let dir = TempDir::new().unwrap();
    interrupted_count(&dir, 2).await;
    assert_eq!(DataDir::new(dir.path()).list_count_records(test_date()).unwrap(), vec![1]);

    // Batch 1 now spans P00001..P00003; the kept record lacks P00003
    let api = Arc::new(FakeApi::new(parents(6)).with_pages("P00003", vec![1, 0]));
    let resumed = test_pipeline(dir.path(), api.clone(), 3);
    let err = resumed
        .count(test_date(), true, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        DownloaderError::ResumeMismatch { batch, path } => {
            assert_eq!(batch, 1);
            assert_eq!(path, resumed.data().count_path(test_date(), 1));
        }
        other => panic!("expected ResumeMismatch, got {:?}", other),
    }
    assert_eq!(api.request_count(), 0);
    assert_eq!(resumed.data().list_count_records(test_date()).unwrap(), vec![1]);

    // A fresh count with the new batch size counts every station
    resumed
        .count(test_date(), false, &CancellationToken::new())
        .await
        .unwrap();
    let totals = resumed.aggregate(test_date()).await.unwrap();
    assert_eq!(totals.len(), 6);
    assert_eq!(totals["P00003"], 1);
}

#[tokio::test]
async fn test_resume_rejects_records_beyond_schedule() {
    let dir = TempDir::new().unwrap();
    interrupted_count(&dir, 1).await;
    assert_eq!(DataDir::new(dir.path()).list_count_records(test_date()).unwrap(), vec![1, 2]);

    let api = Arc::new(FakeApi::new(parents(6)));
    let resumed = test_pipeline(dir.path(), api.clone(), 6);
    let err = resumed
        .count(test_date(), true, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloaderError::ResumeMismatch { batch: 2, .. }));
    assert_eq!(api.request_count(), 0);
}

#[tokio::test]
async fn test_resume_rejects_changed_hierarchy() {
    let dir = TempDir::new().unwrap();
    interrupted_count(&dir, 2).await;

    // P00001 gained a platform since the interrupted run
    let mut stops = parents(6);
    stops.push(stop("C00001", Some("P00001")));
    let api = Arc::new(FakeApi::new(stops));
    let resumed = test_pipeline(dir.path(), api.clone(), 2);
    resumed.download_stations().await.unwrap();
    resumed.build_hierarchy().await.unwrap();

    let err = resumed
        .count(test_date(), true, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloaderError::ResumeMismatch { batch: 1, .. }));
    assert!(!api.was_requested("P00003"));
}

#[tokio::test]
async fn test_count_discards_totals_of_previous_run() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new(parents(6)).with_pages("P00003", vec![4, 0]));
    let pipeline = test_pipeline(dir.path(), api, 2);
    pipeline.download_stations().await.unwrap();
    pipeline.build_hierarchy().await.unwrap();
    pipeline
        .count(test_date(), false, &CancellationToken::new())
        .await
        .unwrap();
    pipeline.aggregate(test_date()).await.unwrap();
    assert!(pipeline.data().totals_path(test_date()).exists());

    // The next count is interrupted before aggregate runs again
    let interrupted = CancellationToken::new();
    let api = Arc::new(
        FakeApi::new(parents(6))
            .with_pages("P00003", vec![9, 0])
            .cancel_when_requested("P00003", interrupted.clone()),
    );
    let recount = test_pipeline(dir.path(), api, 2);
    assert!(recount.count(test_date(), false, &interrupted).await.is_err());

    assert!(!recount.data().totals_path(test_date()).exists());
    let err = recount.publish(test_date()).await.unwrap_err();
    assert!(matches!(err, DownloaderError::MissingStage { stage: stage::AGGREGATE, .. }));
    assert!(recount.recorded_dates().unwrap().is_empty());
}

#[tokio::test]
async fn test_fresh_count_discards_previous_records() {
    let dir = TempDir::new().unwrap();
    let pipeline = test_pipeline(dir.path(), Arc::new(FakeApi::new(parents(3))), 4000);
    pipeline.download_stations().await.unwrap();
    pipeline.build_hierarchy().await.unwrap();

    // Leftover of a run with a smaller batch size
    let mut stale = CountRecord::new();
    stale.insert("P00003", 99);
    pipeline
        .data()
        .save_count_record(test_date(), 9, &stale)
        .unwrap();

    pipeline
        .count(test_date(), false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(pipeline.data().list_count_records(test_date()).unwrap(), vec![1]);
    let totals = pipeline.aggregate(test_date()).await.unwrap();
    assert_eq!(totals["P00003"], 0);
}

#[tokio::test]
async fn test_already_cancelled_counts_nothing() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new(parents(3)));
    let pipeline = test_pipeline(dir.path(), api.clone(), 1);
    pipeline.download_stations().await.unwrap();
    pipeline.build_hierarchy().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = pipeline.count(test_date(), false, &cancel).await.unwrap_err();

    assert!(matches!(err, DownloaderError::Cancelled));
    assert_eq!(api.request_count(), 0);
    assert!(pipeline.data().list_count_records(test_date()).unwrap().is_empty());
}
