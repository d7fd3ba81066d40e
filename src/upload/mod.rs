//! Batch transmission
//!
//! Upload batches are JSON arrays of samples posted to one of two backend
//! endpoints. Every send is fire-and-forget from the agent's perspective:
//! failures are reported to the caller for logging, never retried.

mod http;
mod memory;

pub use http::HttpUploader;
pub use memory::MemoryUploader;

use async_trait::async_trait;
use thiserror::Error;

use crate::sensors::{Sample, SourceKind};

/// Backend endpoint a batch is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Timer-driven vitals batches
    Data,
    /// Event-driven one-shot batches (sleep, ECG)
    Static,
}

/// The payload of one HTTP transmission
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBatch {
    pub endpoint: Endpoint,
    pub samples: Vec<Sample>,
}

impl UploadBatch {
    pub fn periodic(samples: Vec<Sample>) -> Self {
        UploadBatch { endpoint: Endpoint::Data, samples }
    }

    pub fn one_shot(samples: Vec<Sample>) -> Self {
        UploadBatch { endpoint: Endpoint::Static, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn count_of(&self, kind: SourceKind) -> usize {
        self.samples.iter().filter(|s| s.kind == kind).count()
    }

    /// JSON body: an ordered array of `{tag: value, "timestamp": seconds}` objects
    pub fn encode(&self) -> Result<Vec<u8>, UploadError> {
        Ok(serde_json::to_vec(&self.samples)?)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Server responded with status {0}")]
    Status(u16),
    #[error("Uploader rejected the batch: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Http(e.to_string())
    }
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn send(&self, batch: &UploadBatch) -> Result<(), UploadError>;
}
