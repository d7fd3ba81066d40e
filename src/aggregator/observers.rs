//! Event-driven observers
//!
//! ECG and sleep data are not polled. Each observer holds a standing
//! subscription; every notification triggers its own fetch and a one-shot
//! batch that bypasses the accumulation buffer.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::barrier::CompletionBarrier;
use super::stats::AgentStats;
use crate::sensors::{EcgRecording, Sample, SensorStore, SleepInterval, SleepStage, SourceKind, StoreError};
use crate::upload::{UploadBatch, Uploader};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// ECG observer: fans out one voltage sub-query per recording and joins them per notification
pub struct EcgObserver {
    store: Arc<dyn SensorStore>,
    uploader: Arc<dyn Uploader>,
    stats: Arc<AgentStats>,
    transmit: bool,
    barrier: CompletionBarrier<Sample>,
    generation: AtomicU64,
}

impl EcgObserver {
    pub fn new(
        store: Arc<dyn SensorStore>,
        uploader: Arc<dyn Uploader>,
        stats: Arc<AgentStats>,
        transmit: bool,
    ) -> Self {
        EcgObserver {
            store,
            uploader,
            stats,
            transmit,
            barrier: CompletionBarrier::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Subscribes and spawns the notification loop
    pub async fn start(self: Arc<Self>) -> Result<JoinHandle<()>, StoreError> {
        let mut notifications = self.store.subscribe(SourceKind::Electrocardiogram).await?;
        tracing::info!("ECG observer query started");

        Ok(tokio::spawn(async move {
            while notifications.recv().await.is_some() {
                let observer = Arc::clone(&self);
                tokio::spawn(async move { observer.handle_notification().await });
            }
            tracing::info!("ECG subscription closed");
        }))
    }

    /// Fetches every recording and starts one voltage sub-query per recording.
    /// Returns the notification's generation.
    pub async fn handle_notification(self: Arc<Self>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let recordings = match self.store.ecg_recordings().await {
            Ok(recordings) => recordings,
            Err(e) => {
                self.stats.record_observer_failure();
                tracing::warn!(generation, error = %e, "Error fetching ECG samples");
                return generation;
            }
        };

        if !self.barrier.register(generation, recordings.len()).await {
            tracing::debug!(generation, "No ECG recordings available");
            return generation;
        }

        for recording in recordings {
            let observer = Arc::clone(&self);
            tokio::spawn(async move { observer.fetch_voltages(generation, recording).await });
        }
        generation
    }

    async fn fetch_voltages(&self, generation: u64, recording: EcgRecording) {
        let record = match self.store.voltage_measurements(&recording).await {
            Ok(measurements) => {
                tracing::debug!(generation, recording = recording.id, "Done retrieving voltage measurements");
                Some(Sample::ecg(&recording, measurements))
            }
            Err(e) => {
                tracing::warn!(generation, recording = recording.id, error = %e, "Error retrieving voltage measurements");
                None
            }
        };

        if let Some(records) = self.barrier.arrive(generation, record).await {
            self.finish(generation, records).await;
        }
    }

    async fn finish(&self, generation: u64, records: Vec<Sample>) {
        if records.is_empty() {
            tracing::debug!(generation, "ECG notification produced no records");
            return;
        }

        let batch = UploadBatch::one_shot(records);
        self.stats.record_ecg_batch_built();

        if !self.transmit {
            tracing::debug!(generation, records = batch.len(), "ECG batch built; transmission disabled");
            return;
        }

        match self.uploader.send(&batch).await {
            Ok(()) => {
                self.stats.record_ecg_batch_sent();
                tracing::info!(generation, records = batch.len(), "ECG data sent");
            }
            Err(e) => {
                self.stats.record_observer_failure();
                tracing::warn!(generation, error = %e, "Error sending ECG data; batch dropped");
            }
        }
    }

    /// Notifications whose sub-queries are still outstanding
    pub async fn pending_notifications(&self) -> usize {
        self.barrier.open_joins().await
    }
}

/// Per-stage sleep totals over a look-back window, in seconds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SleepSummary {
    pub awake: f64,
    pub core: f64,
    pub deep: f64,
    pub rem: f64,
    pub unspecified: f64,
    pub earliest_start: Option<DateTime<Utc>>,
    pub latest_start: Option<DateTime<Utc>>,
}

impl SleepSummary {
    pub fn aggregate(intervals: &[SleepInterval]) -> Self {
        let mut summary = SleepSummary::default();
        for interval in intervals {
            let seconds = (interval.end - interval.start).num_milliseconds().max(0) as f64 / 1000.0;
            match SleepStage::from_raw(interval.raw_value) {
                SleepStage::Awake => summary.awake += seconds,
                SleepStage::Core => summary.core += seconds,
                SleepStage::Deep => summary.deep += seconds,
                SleepStage::Rem => summary.rem += seconds,
                SleepStage::InBed | SleepStage::Unspecified => summary.unspecified += seconds,
            }

            if summary.earliest_start.map_or(true, |t| interval.start < t) {
                summary.earliest_start = Some(interval.start);
            }
            if summary.latest_start.map_or(true, |t| interval.start > t) {
                summary.latest_start = Some(interval.start);
            }
        }
        summary
    }

    /// Derived total: awake + core + deep + rem. Unspecified time is not included.
    pub fn in_bed(&self) -> f64 {
        self.awake + self.core + self.deep + self.rem
    }

    pub fn seconds(&self, stage: SleepStage) -> f64 {
        match stage {
            SleepStage::InBed => self.in_bed(),
            SleepStage::Awake => self.awake,
            SleepStage::Core => self.core,
            SleepStage::Deep => self.deep,
            SleepStage::Rem => self.rem,
            SleepStage::Unspecified => self.unspecified,
        }
    }

    pub fn hours(&self, stage: SleepStage) -> f64 {
        self.seconds(stage) / SECONDS_PER_HOUR
    }

    /// One sample per stage, stamped with the earliest interval start (epoch when empty)
    pub fn to_samples(&self) -> Vec<Sample> {
        let timestamp = self.earliest_start.unwrap_or_default();
        SleepStage::UPLOAD_ORDER
            .iter()
            .map(|&stage| Sample::sleep(stage, self.hours(stage), timestamp))
            .collect()
    }
}

/// Sleep observer: aggregates the look-back window and sends it immediately
pub struct SleepObserver {
    store: Arc<dyn SensorStore>,
    uploader: Arc<dyn Uploader>,
    stats: Arc<AgentStats>,
    lookback: ChronoDuration,
}

impl SleepObserver {
    pub fn new(
        store: Arc<dyn SensorStore>,
        uploader: Arc<dyn Uploader>,
        stats: Arc<AgentStats>,
        lookback_days: i64,
    ) -> Self {
        SleepObserver {
            store,
            uploader,
            stats,
            lookback: ChronoDuration::days(lookback_days),
        }
    }

    pub async fn start(self: Arc<Self>) -> Result<JoinHandle<()>, StoreError> {
        let mut notifications = self.store.subscribe(SourceKind::SleepAnalysis).await?;
        tracing::info!("Sleep analysis observer query started");

        Ok(tokio::spawn(async move {
            while notifications.recv().await.is_some() {
                let observer = Arc::clone(&self);
                tokio::spawn(async move { observer.handle_notification().await });
            }
            tracing::info!("Sleep subscription closed");
        }))
    }

    /// Fetch, aggregate and send one sleep batch
    pub async fn handle_notification(&self) {
        let since = Utc::now() - self.lookback;
        let intervals = match self.store.sleep_intervals(since).await {
            Ok(intervals) => intervals,
            Err(e) => {
                self.stats.record_observer_failure();
                tracing::warn!(error = %e, "Error fetching sleep data");
                return;
            }
        };

        let summary = SleepSummary::aggregate(&intervals);
        tracing::info!(
            intervals = intervals.len(),
            in_bed_hours = summary.hours(SleepStage::InBed),
            deep_hours = summary.hours(SleepStage::Deep),
            rem_hours = summary.hours(SleepStage::Rem),
            "Aggregated sleep data"
        );

        let batch = UploadBatch::one_shot(summary.to_samples());
        match self.uploader.send(&batch).await {
            Ok(()) => {
                self.stats.record_sleep_batch_sent();
                tracing::info!("Sleep data sent");
            }
            Err(e) => {
                self.stats.record_observer_failure();
                tracing::warn!(error = %e, "Error sending sleep data; batch dropped");
            }
        }
    }
}
