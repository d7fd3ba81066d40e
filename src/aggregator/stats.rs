use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the scheduler, the observers and the status API
#[derive(Debug, Default)]
pub struct AgentStats {
    ticks: AtomicU64,
    fetch_failures: AtomicU64,
    samples_flushed: AtomicU64,
    empty_flushes: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    ecg_batches_built: AtomicU64,
    ecg_batches_sent: AtomicU64,
    sleep_batches_sent: AtomicU64,
    observer_failures: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub fetch_failures: u64,
    pub samples_flushed: u64,
    pub empty_flushes: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub ecg_batches_built: u64,
    pub ecg_batches_sent: u64,
    pub sleep_batches_sent: u64,
    pub observer_failures: u64,
}

macro_rules! counter {
    ($($record:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $record(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl AgentStats {
    pub fn new() -> Self {
        AgentStats::default()
    }

    counter! {
        record_tick => ticks,
        record_fetch_failure => fetch_failures,
        record_empty_flush => empty_flushes,
        record_batch_sent => batches_sent,
        record_batch_failed => batches_failed,
        record_ecg_batch_built => ecg_batches_built,
        record_ecg_batch_sent => ecg_batches_sent,
        record_sleep_batch_sent => sleep_batches_sent,
        record_observer_failure => observer_failures,
    }

    pub fn record_samples_flushed(&self, count: usize) {
        self.samples_flushed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            samples_flushed: self.samples_flushed.load(Ordering::Relaxed),
            empty_flushes: self.empty_flushes.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            ecg_batches_built: self.ecg_batches_built.load(Ordering::Relaxed),
            ecg_batches_sent: self.ecg_batches_sent.load(Ordering::Relaxed),
            sleep_batches_sent: self.sleep_batches_sent.load(Ordering::Relaxed),
            observer_failures: self.observer_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = AgentStats::new();
        stats.record_tick();
        stats.record_tick();
        stats.record_samples_flushed(3);
        stats.record_batch_failed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.samples_flushed, 3);
        assert_eq!(snapshot.batches_failed, 1);
        assert_eq!(snapshot.batches_sent, 0);
    }
}
