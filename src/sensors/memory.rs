use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};

use super::{
    EcgRecording, QuantityReading, SensorStore, SleepInterval, SourceKind, StoreError,
    VoltageMeasurement,
};

const SUBSCRIPTION_CAPACITY: usize = 16;

/// In-memory sensor store with scriptable failures, latencies and held queries
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    deny_authorization: bool,
    authorized: HashSet<SourceKind>,
    quantities: HashMap<SourceKind, Vec<QuantityReading>>,
    failing: HashSet<SourceKind>,
    failing_subscriptions: HashSet<SourceKind>,
    latency: HashMap<SourceKind, Duration>,
    recordings: Vec<EcgRecording>,
    voltages: HashMap<u64, Vec<VoltageMeasurement>>,
    failing_voltages: HashSet<u64>,
    held_voltages: HashMap<u64, Arc<Notify>>,
    voltage_queries: usize,
    sleep: Vec<SleepInterval>,
    subscribers: HashMap<SourceKind, Vec<mpsc::Sender<()>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub async fn deny_authorization(&self) {
        self.state.lock().await.deny_authorization = true;
    }

    pub async fn authorized_kinds(&self) -> HashSet<SourceKind> {
        self.state.lock().await.authorized.clone()
    }

    pub async fn push_quantity(&self, kind: SourceKind, value: f64, start: DateTime<Utc>) {
        self.state.lock().await
            .quantities
            .entry(kind)
            .or_insert_with(Vec::new)
            .push(QuantityReading { value, start });
    }

    pub async fn clear_quantities(&self, kind: SourceKind) {
        self.state.lock().await.quantities.remove(&kind);
    }

    /// Queries for `kind` fail until `restore_source` is called
    pub async fn fail_source(&self, kind: SourceKind) {
        self.state.lock().await.failing.insert(kind);
    }

    pub async fn restore_source(&self, kind: SourceKind) {
        self.state.lock().await.failing.remove(&kind);
    }

    /// Subscribing to `kind` fails
    pub async fn fail_subscription(&self, kind: SourceKind) {
        self.state.lock().await.failing_subscriptions.insert(kind);
    }

    /// Queries for `kind` resolve only after `latency` has elapsed
    pub async fn set_latency(&self, kind: SourceKind, latency: Duration) {
        self.state.lock().await.latency.insert(kind, latency);
    }

    pub async fn add_recording(&self, recording: EcgRecording, voltages: Vec<VoltageMeasurement>) {
        let mut state = self.state.lock().await;
        state.voltages.insert(recording.id, voltages);
        state.recordings.push(recording);
    }

    pub async fn clear_recordings(&self) {
        self.state.lock().await.recordings.clear();
    }

    pub async fn fail_voltages(&self, recording_id: u64) {
        self.state.lock().await.failing_voltages.insert(recording_id);
    }

    /// Holds the voltage query of a recording until the returned `Notify` is signalled
    pub async fn hold_voltages(&self, recording_id: u64) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().await.held_voltages.insert(recording_id, Arc::clone(&gate));
        gate
    }

    pub async fn voltage_query_count(&self) -> usize {
        self.state.lock().await.voltage_queries
    }

    pub async fn push_sleep(&self, interval: SleepInterval) {
        self.state.lock().await.sleep.push(interval);
    }

    /// Signals every subscriber of `kind` that new data may be available
    pub async fn notify(&self, kind: SourceKind) {
        let senders = self.state.lock().await
            .subscribers
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        for sender in senders {
            let _ = sender.send(()).await;
        }
    }

    async fn delay_for(&self, kind: SourceKind) {
        let latency = self.state.lock().await.latency.get(&kind).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn check_source(&self, kind: SourceKind) -> Result<(), StoreError> {
        if self.state.lock().await.failing.contains(&kind) {
            return Err(StoreError::Query {
                kind,
                message: "source unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SensorStore for MemoryStore {
    async fn request_authorization(&self, kinds: &[SourceKind]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.deny_authorization {
            return Err(StoreError::AuthorizationDenied("read access refused".to_string()));
        }
        state.authorized.extend(kinds.iter().copied());
        Ok(())
    }

    async fn latest_quantities(&self, kind: SourceKind, limit: usize)
        -> Result<Vec<QuantityReading>, StoreError>
    {
        self.delay_for(kind).await;
        self.check_source(kind).await?;

        let mut readings = self.state.lock().await
            .quantities
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        readings.sort_by(|a, b| b.start.cmp(&a.start));
        readings.truncate(limit);
        Ok(readings)
    }

    async fn ecg_recordings(&self) -> Result<Vec<EcgRecording>, StoreError> {
        self.delay_for(SourceKind::Electrocardiogram).await;
        self.check_source(SourceKind::Electrocardiogram).await?;
        Ok(self.state.lock().await.recordings.clone())
    }

    async fn voltage_measurements(&self, recording: &EcgRecording)
        -> Result<Vec<VoltageMeasurement>, StoreError>
    {
        let gate = {
            let mut state = self.state.lock().await;
            state.voltage_queries += 1;
            state.held_voltages.get(&recording.id).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let state = self.state.lock().await;
        if state.failing_voltages.contains(&recording.id) {
            return Err(StoreError::Query {
                kind: SourceKind::Electrocardiogram,
                message: format!("voltage query for recording {} failed", recording.id),
            });
        }
        Ok(state.voltages.get(&recording.id).cloned().unwrap_or_default())
    }

    async fn sleep_intervals(&self, since: DateTime<Utc>) -> Result<Vec<SleepInterval>, StoreError> {
        self.delay_for(SourceKind::SleepAnalysis).await;
        self.check_source(SourceKind::SleepAnalysis).await?;

        let mut intervals: Vec<SleepInterval> = self.state.lock().await
            .sleep
            .iter()
            .filter(|interval| interval.end > since)
            .cloned()
            .collect();
        intervals.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(intervals)
    }

    async fn subscribe(&self, kind: SourceKind) -> Result<mpsc::Receiver<()>, StoreError> {
        let mut state = self.state.lock().await;
        if state.failing_subscriptions.contains(&kind) {
            return Err(StoreError::Subscription {
                kind,
                message: "observer query refused".to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        state
            .subscribers
            .entry(kind)
            .or_insert_with(Vec::new)
            .push(tx);
        Ok(rx)
    }
}
