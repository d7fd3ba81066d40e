use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{
    EcgRecording, QuantityReading, SensorStore, SleepInterval, SourceKind, StoreError,
    VoltageMeasurement,
};
use crate::config::SimulationConfig;

const READING_SPACING_SECS: i64 = 5;
const ECG_FREQUENCY_HZ: f64 = 128.0;
const ECG_SECONDS: usize = 2;
/// Only the most recent recordings stay visible to queries
const RETAINED_RECORDINGS: u64 = 12;

/// Synthetic store used by the binary when no real device store is attached.
///
/// Vitals are drawn from resting-adult ranges; ECG and sleep subscriptions fire
/// on fixed intervals.
#[derive(Debug)]
pub struct SimulatedStore {
    config: SimulationConfig,
    recordings_issued: AtomicU64,
}

impl SimulatedStore {
    pub fn new(config: SimulationConfig) -> Self {
        SimulatedStore {
            config,
            recordings_issued: AtomicU64::new(0),
        }
    }

    fn value_range(kind: SourceKind) -> Option<(f64, f64)> {
        match kind {
            SourceKind::HeartRate => Some((55.0, 110.0)),
            SourceKind::RespiratoryRate => Some((12.0, 20.0)),
            SourceKind::BodyTemperature => Some((35.5, 37.5)),
            _ => None,
        }
    }

    fn notify_interval(&self, kind: SourceKind) -> Option<Duration> {
        match kind {
            SourceKind::Electrocardiogram => Some(Duration::from_secs(self.config.ecg_every_secs)),
            SourceKind::SleepAnalysis => Some(Duration::from_secs(self.config.sleep_every_secs)),
            _ => None,
        }
    }

    fn synthesize_trace(count: usize) -> Vec<VoltageMeasurement> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|i| {
                let t = i as f64 / ECG_FREQUENCY_HZ;
                // roughly one beat per second on top of baseline noise
                let phase = (t % 1.0) * std::f64::consts::TAU;
                let voltage = 0.0008 * phase.sin().powi(15) + rng.gen_range(-0.00005..0.00005);
                VoltageMeasurement { voltage, time_since_sample_start: t }
            })
            .collect()
    }

    /// One night ending at 07:00 UTC of the current day, cycling through stages
    fn synthesize_night(now: DateTime<Utc>) -> Vec<SleepInterval> {
        let mut rng = rand::thread_rng();
        let wake = now.date_naive().and_hms_opt(7, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        let wake = if wake > now { wake - ChronoDuration::days(1) } else { wake };

        let mut start = wake - ChronoDuration::hours(8);
        let mut intervals = Vec::new();
        // awake, core, deep, core, rem
        let cycle = [2_i64, 3, 4, 3, 5];
        while start < wake {
            for raw_value in cycle {
                let minutes = rng.gen_range(10..40);
                let end = (start + ChronoDuration::minutes(minutes)).min(wake);
                intervals.push(SleepInterval { raw_value, start, end });
                start = end;
                if start >= wake {
                    break;
                }
            }
        }
        intervals
    }
}

#[async_trait]
impl SensorStore for SimulatedStore {
    async fn request_authorization(&self, _kinds: &[SourceKind]) -> Result<(), StoreError> {
        if self.config.deny_authorization {
            return Err(StoreError::AuthorizationDenied("simulated denial".to_string()));
        }
        Ok(())
    }

    async fn latest_quantities(&self, kind: SourceKind, limit: usize)
        -> Result<Vec<QuantityReading>, StoreError>
    {
        let (low, high) = Self::value_range(kind).ok_or_else(|| StoreError::Query {
            kind,
            message: "not a quantity type".to_string(),
        })?;

        let now = Utc::now();
        let mut rng = rand::thread_rng();
        let readings = (0..limit)
            .map(|i| QuantityReading {
                value: (rng.gen_range(low..high) * 10.0).round() / 10.0,
                start: now - ChronoDuration::seconds(i as i64 * READING_SPACING_SECS),
            })
            .collect();
        Ok(readings)
    }

    async fn ecg_recordings(&self) -> Result<Vec<EcgRecording>, StoreError> {
        let issued = self.recordings_issued.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let count = ECG_SECONDS * ECG_FREQUENCY_HZ as usize;
        let oldest = issued.saturating_sub(RETAINED_RECORDINGS) + 1;
        Ok((oldest..=issued)
            .map(|id| EcgRecording {
                id,
                start: now - ChronoDuration::minutes((issued - id) as i64 * 5),
                sampling_frequency: Some(ECG_FREQUENCY_HZ),
                number_of_voltage_measurements: count,
            })
            .collect())
    }

    async fn voltage_measurements(&self, recording: &EcgRecording)
        -> Result<Vec<VoltageMeasurement>, StoreError>
    {
        Ok(Self::synthesize_trace(recording.number_of_voltage_measurements))
    }

    async fn sleep_intervals(&self, since: DateTime<Utc>) -> Result<Vec<SleepInterval>, StoreError> {
        Ok(Self::synthesize_night(Utc::now())
            .into_iter()
            .filter(|interval| interval.end > since)
            .collect())
    }

    async fn subscribe(&self, kind: SourceKind) -> Result<mpsc::Receiver<()>, StoreError> {
        let period = self.notify_interval(kind).ok_or_else(|| StoreError::Subscription {
            kind,
            message: "kind does not support observation".to_string(),
        })?;
        if period.is_zero() {
            return Err(StoreError::Subscription {
                kind,
                message: "notification interval must be positive".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
