use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{Endpoint, UploadBatch, UploadError, Uploader};

/// Keeps every batch it is handed instead of sending it anywhere
#[derive(Debug, Default)]
pub struct MemoryUploader {
    sent: Mutex<Vec<UploadBatch>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryUploader {
    pub fn new() -> Self {
        MemoryUploader::default()
    }

    /// While failing, batches are rejected and not recorded
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn batches(&self) -> Vec<UploadBatch> {
        self.sent.lock().await.clone()
    }

    pub async fn batches_for(&self, endpoint: Endpoint) -> Vec<UploadBatch> {
        self.sent.lock().await
            .iter()
            .filter(|batch| batch.endpoint == endpoint)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Uploader for MemoryUploader {
    async fn send(&self, batch: &UploadBatch) -> Result<(), UploadError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UploadError::Rejected("uploader set to fail".to_string()));
        }
        // same serialization path as a real transmission
        batch.encode()?;
        self.sent.lock().await.push(batch.clone());
        Ok(())
    }
}
