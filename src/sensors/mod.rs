//! Sensor store abstraction
//!
//! Describes the on-device health data the agent reads:
//! - Source kinds and the samples produced from them
//! - The `SensorStore` seam (authorize, query, subscribe)
//! - In-memory and simulated store implementations

mod memory;
mod simulated;

pub use memory::MemoryStore;
pub use simulated::SimulatedStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Fixed sensor categories the agent is authorized to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SourceKind {
    HeartRate,
    RespiratoryRate,
    BodyTemperature,
    Electrocardiogram,
    SleepAnalysis,
}

impl SourceKind {
    /// Every kind the agent asks read access for
    pub const ALL: [SourceKind; 5] = [
        SourceKind::HeartRate,
        SourceKind::RespiratoryRate,
        SourceKind::BodyTemperature,
        SourceKind::Electrocardiogram,
        SourceKind::SleepAnalysis,
    ];

    /// Kinds polled by the repeating timer
    pub const POLLED: [SourceKind; 3] = [
        SourceKind::HeartRate,
        SourceKind::RespiratoryRate,
        SourceKind::BodyTemperature,
    ];

    /// Key used for this kind in upload payloads
    pub fn wire_tag(&self) -> &'static str {
        match self {
            SourceKind::HeartRate => "heartRate",
            SourceKind::RespiratoryRate => "respiratoryRate",
            SourceKind::BodyTemperature => "bodyTemperature",
            SourceKind::Electrocardiogram => "electrocardiogram",
            SourceKind::SleepAnalysis => "sleepAnalysis",
        }
    }

    pub fn is_polled(&self) -> bool {
        Self::POLLED.contains(self)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::HeartRate => "heart rate",
            SourceKind::RespiratoryRate => "respiratory rate",
            SourceKind::BodyTemperature => "body temperature",
            SourceKind::Electrocardiogram => "ECG",
            SourceKind::SleepAnalysis => "sleep analysis",
        };
        write!(f, "{}", name)
    }
}

/// Aggregated sleep stages reported to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SleepStage {
    InBed,
    Awake,
    Core,
    Deep,
    Rem,
    Unspecified,
}

impl SleepStage {
    /// Upload order; `InBed` leads so receivers can detect a sleep batch from the first entry
    pub const UPLOAD_ORDER: [SleepStage; 6] = [
        SleepStage::InBed,
        SleepStage::Awake,
        SleepStage::Core,
        SleepStage::Deep,
        SleepStage::Rem,
        SleepStage::Unspecified,
    ];

    pub fn wire_tag(&self) -> &'static str {
        match self {
            SleepStage::InBed => "inBed",
            SleepStage::Awake => "awake",
            SleepStage::Core => "core",
            SleepStage::Deep => "deep",
            SleepStage::Rem => "rem",
            SleepStage::Unspecified => "unspecified",
        }
    }

    /// Maps a raw sleep-analysis category value to the stage it is counted under.
    /// In-bed intervals and unknown values are counted as unspecified; `InBed` itself is derived.
    pub fn from_raw(raw: i64) -> SleepStage {
        match raw {
            2 => SleepStage::Awake,
            3 => SleepStage::Core,
            4 => SleepStage::Deep,
            5 => SleepStage::Rem,
            _ => SleepStage::Unspecified,
        }
    }
}

/// One quantity reading as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityReading {
    pub value: f64,
    pub start: DateTime<Utc>,
}

/// An ECG recording header; voltages are fetched separately
#[derive(Debug, Clone, PartialEq)]
pub struct EcgRecording {
    pub id: u64,
    pub start: DateTime<Utc>,
    pub sampling_frequency: Option<f64>,  // Hz
    pub number_of_voltage_measurements: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageMeasurement {
    pub voltage: f64,                 // volts
    pub time_since_sample_start: f64, // seconds
}

/// A categorized sleep interval
#[derive(Debug, Clone, PartialEq)]
pub struct SleepInterval {
    pub raw_value: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A finished ECG trace ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct EcgTrace {
    pub sampling_frequency: f64,
    pub number_of_voltage_measurements: usize,
    pub measurements: Vec<VoltageMeasurement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Scalar(f64),
    SleepHours { stage: SleepStage, hours: f64 },
    Ecg(EcgTrace),
}

/// One immutable observation from one source
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub kind: SourceKind,
    pub value: SampleValue,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn scalar(kind: SourceKind, value: f64, timestamp: DateTime<Utc>) -> Self {
        Sample { kind, value: SampleValue::Scalar(value), timestamp }
    }

    pub fn sleep(stage: SleepStage, hours: f64, timestamp: DateTime<Utc>) -> Self {
        Sample {
            kind: SourceKind::SleepAnalysis,
            value: SampleValue::SleepHours { stage, hours },
            timestamp,
        }
    }

    pub fn ecg(recording: &EcgRecording, measurements: Vec<VoltageMeasurement>) -> Self {
        Sample {
            kind: SourceKind::Electrocardiogram,
            value: SampleValue::Ecg(EcgTrace {
                sampling_frequency: recording.sampling_frequency.unwrap_or(0.0),
                number_of_voltage_measurements: recording.number_of_voltage_measurements,
                measurements,
            }),
            timestamp: recording.start,
        }
    }
}

/// Seconds since the Unix epoch, with sub-second precision
pub fn epoch_seconds(timestamp: &DateTime<Utc>) -> f64 {
    timestamp.timestamp() as f64 + f64::from(timestamp.timestamp_subsec_nanos()) / 1e9
}

impl Serialize for VoltageMeasurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("voltage", &self.voltage)?;
        map.serialize_entry("timeSinceSampleStart", &self.time_since_sample_start)?;
        map.end()
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let timestamp = epoch_seconds(&self.timestamp);
        match &self.value {
            SampleValue::Scalar(value) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(self.kind.wire_tag(), value)?;
                map.serialize_entry("timestamp", &timestamp)?;
                map.end()
            }
            SampleValue::SleepHours { stage, hours } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(stage.wire_tag(), hours)?;
                map.serialize_entry("timestamp", &timestamp)?;
                map.end()
            }
            SampleValue::Ecg(trace) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("ecgStartDate", &timestamp)?;
                map.serialize_entry("samplingFrequency", &trace.sampling_frequency)?;
                map.serialize_entry("numberOfVoltageMeasurements", &trace.number_of_voltage_measurements)?;
                map.serialize_entry("voltageMeasurements", &trace.measurements)?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Health data is not available on this device")]
    Unavailable,
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("Query for {kind} failed: {message}")]
    Query { kind: SourceKind, message: String },
    #[error("Subscription for {kind} failed: {message}")]
    Subscription { kind: SourceKind, message: String },
}

/// The external on-device health store.
///
/// Queries complete asynchronously; subscriptions deliver a bare signal that new
/// data may exist, and the caller follows up with a query.
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// One-time read authorization for the given kinds
    async fn request_authorization(&self, kinds: &[SourceKind]) -> Result<(), StoreError>;

    /// Most recent quantity readings, newest first, at most `limit`
    async fn latest_quantities(&self, kind: SourceKind, limit: usize)
        -> Result<Vec<QuantityReading>, StoreError>;

    /// All ECG recordings, no limit
    async fn ecg_recordings(&self) -> Result<Vec<EcgRecording>, StoreError>;

    /// Voltage trace of one recording; resolves once the trace is complete
    async fn voltage_measurements(&self, recording: &EcgRecording)
        -> Result<Vec<VoltageMeasurement>, StoreError>;

    /// Sleep intervals that end after `since`, oldest first. An interval that
    /// straddles `since` is returned whole.
    async fn sleep_intervals(&self, since: DateTime<Utc>) -> Result<Vec<SleepInterval>, StoreError>;

    /// Standing subscription: one message per "new data may be available" signal
    async fn subscribe(&self, kind: SourceKind) -> Result<mpsc::Receiver<()>, StoreError>;
}
