use std::sync::Arc;

use super::buffer::BufferHandle;
use super::stats::AgentStats;
use crate::sensors::{Sample, SensorStore, SourceKind, StoreError};

/// Timer-driven fetch for one polled source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VitalsAdapter {
    kind: SourceKind,
    limit: usize,
}

impl VitalsAdapter {
    pub fn new(kind: SourceKind, limit: usize) -> Self {
        VitalsAdapter { kind, limit }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Queries the newest readings and converts them to samples
    pub async fn fetch(&self, store: &dyn SensorStore) -> Result<Vec<Sample>, StoreError> {
        let readings = store.latest_quantities(self.kind, self.limit).await?;
        Ok(readings
            .into_iter()
            .map(|reading| Sample::scalar(self.kind, reading.value, reading.start))
            .collect())
    }

    /// Fetches and appends to the buffer. Failures are logged and contribute nothing.
    pub async fn run(self, store: Arc<dyn SensorStore>, buffer: BufferHandle, stats: Arc<AgentStats>) {
        match self.fetch(store.as_ref()).await {
            Ok(samples) => {
                let count = samples.len();
                if let Err(e) = buffer.append(samples).await {
                    tracing::error!(kind = %self.kind, error = %e, "Dropping fetched samples");
                    return;
                }
                tracing::debug!(kind = %self.kind, count, "Fetched and appended samples");
            }
            Err(e) => {
                stats.record_fetch_failure();
                tracing::warn!(kind = %self.kind, error = %e, "Error fetching samples");
            }
        }
    }
}

/// One adapter per polled kind, in a fixed order
pub fn default_adapters(limit: usize) -> Vec<VitalsAdapter> {
    SourceKind::POLLED
        .iter()
        .map(|&kind| VitalsAdapter::new(kind, limit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::buffer::spawn_buffer;
    use crate::sensors::MemoryStore;
    use chrono::DateTime;

    #[tokio::test]
    async fn test_fetch_converts_readings() {
        let store = MemoryStore::new();
        store.push_quantity(SourceKind::BodyTemperature, 36.4, DateTime::from_timestamp(102, 0).unwrap()).await;

        let samples = VitalsAdapter::new(SourceKind::BodyTemperature, 10).fetch(&store).await.unwrap();
        assert_eq!(samples, vec![Sample::scalar(
            SourceKind::BodyTemperature,
            36.4,
            DateTime::from_timestamp(102, 0).unwrap(),
        )]);
    }

    #[tokio::test]
    async fn test_failed_fetch_appends_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.push_quantity(SourceKind::HeartRate, 80.0, DateTime::from_timestamp(1, 0).unwrap()).await;
        store.fail_source(SourceKind::HeartRate).await;
        let buffer = spawn_buffer();
        let stats = Arc::new(AgentStats::new());

        VitalsAdapter::new(SourceKind::HeartRate, 10)
            .run(store, buffer.clone(), Arc::clone(&stats))
            .await;

        assert_eq!(buffer.len().await.unwrap(), 0);
        assert_eq!(stats.snapshot().fetch_failures, 1);
    }

    #[test]
    fn test_default_adapters_cover_polled_kinds() {
        let kinds: Vec<SourceKind> = default_adapters(10).iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, SourceKind::POLLED.to_vec());
    }
}
