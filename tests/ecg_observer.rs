use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use komodo_sync::aggregator::{AgentStats, EcgObserver};
use komodo_sync::sensors::{EcgRecording, MemoryStore, SourceKind, VoltageMeasurement};
use komodo_sync::upload::{Endpoint, MemoryUploader};

macro_rules! eventually {
    ($what:expr, $cond:expr) => {{
        let mut reached = false;
        for _ in 0..200 {
            if $cond {
                reached = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reached, "condition never reached: {}", $what);
    }};
}

fn recording(id: u64) -> (EcgRecording, Vec<VoltageMeasurement>) {
    let measurements = vec![
        VoltageMeasurement { voltage: 0.0001 * id as f64, time_since_sample_start: 0.0 },
        VoltageMeasurement { voltage: 0.0002 * id as f64, time_since_sample_start: 0.5 },
    ];
    let recording = EcgRecording {
        id,
        start: DateTime::from_timestamp(1_000 * id as i64, 0).unwrap(),
        sampling_frequency: Some(512.0),
        number_of_voltage_measurements: measurements.len(),
    };
    (recording, measurements)
}

struct Fixture {
    store: Arc<MemoryStore>,
    uploader: Arc<MemoryUploader>,
    stats: Arc<AgentStats>,
    observer: Arc<EcgObserver>,
}

fn fixture(transmit: bool) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let uploader = Arc::new(MemoryUploader::new());
    let stats = Arc::new(AgentStats::new());
    let observer = Arc::new(EcgObserver::new(
        store.clone(),
        uploader.clone(),
        Arc::clone(&stats),
        transmit,
    ));
    Fixture { store, uploader, stats, observer }
}

fn starts(batch: &komodo_sync::upload::UploadBatch) -> Vec<DateTime<Utc>> {
    let mut starts: Vec<DateTime<Utc>> = batch.samples.iter().map(|s| s.timestamp).collect();
    starts.sort();
    starts
}

#[tokio::test]
async fn test_one_sub_fetch_per_recording_and_no_batch_until_all_complete() {
    let f = fixture(true);
    for id in 1..=3 {
        let (rec, volts) = recording(id);
        f.store.add_recording(rec, volts).await;
    }
    let gate = f.store.hold_voltages(2).await;

    Arc::clone(&f.observer).handle_notification().await;
    eventually!("three voltage queries", f.store.voltage_query_count().await == 3);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(f.stats.snapshot().ecg_batches_built, 0);
    assert_eq!(f.uploader.attempts(), 0);
    assert_eq!(f.observer.pending_notifications().await, 1);

    gate.notify_one();
    eventually!("ECG batch sent", f.uploader.batches().await.len() == 1);

    let batches = f.uploader.batches_for(Endpoint::Static).await;
    let batch = &batches[0];
    assert_eq!(batch.len(), 3);
    assert_eq!(batch.count_of(SourceKind::Electrocardiogram), 3);
    assert_eq!(f.observer.pending_notifications().await, 0);
}

#[tokio::test]
async fn test_overlapping_notifications_do_not_share_records() {
    let f = fixture(true);
    let (a, a_volts) = recording(1);
    let (b, b_volts) = recording(2);
    f.store.add_recording(a.clone(), a_volts).await;
    f.store.add_recording(b.clone(), b_volts).await;
    let gate = f.store.hold_voltages(1).await;

    let first = Arc::clone(&f.observer).handle_notification().await;
    eventually!("first notification queries", f.store.voltage_query_count().await == 2);

    // second notification sees a different recording set and completes first
    f.store.clear_recordings().await;
    let (c, c_volts) = recording(3);
    f.store.add_recording(c.clone(), c_volts).await;
    let second = Arc::clone(&f.observer).handle_notification().await;
    assert_ne!(first, second);

    eventually!("second batch", f.uploader.batches().await.len() == 1);
    assert_eq!(starts(&f.uploader.batches().await[0]), vec![c.start]);

    gate.notify_one();
    eventually!("first batch", f.uploader.batches().await.len() == 2);
    assert_eq!(starts(&f.uploader.batches().await[1]), vec![a.start, b.start]);
}

#[tokio::test]
async fn test_ecg_batch_built_but_not_sent_by_default() {
    let f = fixture(false);
    let (rec, volts) = recording(1);
    f.store.add_recording(rec, volts).await;

    Arc::clone(&f.observer).handle_notification().await;
    eventually!("ECG batch built", f.stats.snapshot().ecg_batches_built == 1);

    assert_eq!(f.uploader.attempts(), 0);
    assert_eq!(f.stats.snapshot().ecg_batches_sent, 0);
}

#[tokio::test]
async fn test_failed_voltage_query_still_releases_the_join() {
    let f = fixture(true);
    for id in 1..=2 {
        let (rec, volts) = recording(id);
        f.store.add_recording(rec, volts).await;
    }
    f.store.fail_voltages(2).await;

    Arc::clone(&f.observer).handle_notification().await;
    eventually!("partial ECG batch", f.uploader.batches().await.len() == 1);
    assert_eq!(f.uploader.batches().await[0].len(), 1);
    assert_eq!(f.observer.pending_notifications().await, 0);
}

#[tokio::test]
async fn test_all_voltage_queries_failing_builds_nothing() {
    let f = fixture(true);
    let (rec, volts) = recording(1);
    f.store.add_recording(rec, volts).await;
    f.store.fail_voltages(1).await;

    Arc::clone(&f.observer).handle_notification().await;
    eventually!("join released", f.observer.pending_notifications().await == 0);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(f.stats.snapshot().ecg_batches_built, 0);
    assert_eq!(f.uploader.attempts(), 0);
}

#[tokio::test]
async fn test_no_recordings_opens_no_join() {
    let f = fixture(true);
    Arc::clone(&f.observer).handle_notification().await;
    assert_eq!(f.store.voltage_query_count().await, 0);
    assert_eq!(f.observer.pending_notifications().await, 0);
}

#[tokio::test]
async fn test_subscription_drives_notifications() {
    let f = fixture(true);
    let (rec, volts) = recording(1);
    f.store.add_recording(rec, volts).await;

    let task = Arc::clone(&f.observer).start().await.unwrap();
    f.store.notify(SourceKind::Electrocardiogram).await;
    f.store.notify(SourceKind::Electrocardiogram).await;

    eventually!("two ECG batches", f.uploader.batches().await.len() == 2);
    task.abort();
}
