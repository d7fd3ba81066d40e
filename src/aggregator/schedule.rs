//! Repeating sample schedule
//!
//! Each tick fans out to every registered adapter and, independently, arms a
//! grace-delay callback that flushes the buffer. The flush never waits on the
//! tick's fetches: a fetch that outlives the grace delay lands in the buffer
//! anyway and goes out with the next tick's flush.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::adapters::VitalsAdapter;
use super::buffer::BufferHandle;
use super::stats::AgentStats;
use crate::sensors::SensorStore;
use crate::upload::{UploadBatch, Uploader};

/// The single live repeating timer
#[derive(Debug)]
struct TimerHandle {
    generation: u64,
    task: JoinHandle<()>,
}

/// State every tick and flush works against
struct TickContext {
    store: Arc<dyn SensorStore>,
    uploader: Arc<dyn Uploader>,
    buffer: BufferHandle,
    adapters: Vec<VitalsAdapter>,
    stats: Arc<AgentStats>,
    grace: Duration,
}

pub struct Scheduler {
    context: Arc<TickContext>,
    period: Duration,
    timer: Mutex<Option<TimerHandle>>,
    generation: AtomicU64,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn SensorStore>,
        uploader: Arc<dyn Uploader>,
        buffer: BufferHandle,
        adapters: Vec<VitalsAdapter>,
        stats: Arc<AgentStats>,
        period: Duration,
        grace: Duration,
    ) -> Self {
        Scheduler {
            context: Arc::new(TickContext { store, uploader, buffer, adapters, stats, grace }),
            period,
            timer: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Arms the repeating timer, cancelling the previous one if any.
    /// The first tick fires one full period after arming.
    pub async fn start_schedule(&self) {
        let mut timer = self.timer.lock().await;
        if let Some(previous) = timer.take() {
            previous.task.abort();
            tracing::info!(generation = previous.generation, "Replaced running schedule");
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let context = Arc::clone(&self.context);
        let period = self.period;
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                context.tick(generation);
            }
        });

        *timer = Some(TimerHandle { generation, task });
        tracing::info!(
            generation,
            period_secs = period.as_secs(),
            adapters = self.context.adapters.len(),
            "Synchronized timer started"
        );
    }

    /// Cancels the live timer. A flush already armed by a fired tick still runs.
    pub async fn stop(&self) {
        if let Some(previous) = self.timer.lock().await.take() {
            previous.task.abort();
            tracing::info!(generation = previous.generation, "Schedule stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.timer.lock().await
            .as_ref()
            .map_or(false, |timer| !timer.task.is_finished())
    }

    /// Generation of the most recently armed schedule (0 before the first)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn buffer(&self) -> &BufferHandle {
        &self.context.buffer
    }

    /// Transmits and clears the buffer; normally called by a tick's grace callback
    pub async fn flush(&self) {
        self.context.flush().await;
    }
}

impl TickContext {
    fn tick(self: &Arc<Self>, generation: u64) {
        self.stats.record_tick();
        tracing::debug!(generation, "Tick");

        for adapter in &self.adapters {
            tokio::spawn(adapter.run(
                Arc::clone(&self.store),
                self.buffer.clone(),
                Arc::clone(&self.stats),
            ));
        }

        let context = Arc::clone(self);
        tokio::spawn(async move {
            time::sleep(context.grace).await;
            context.flush().await;
        });
    }

    async fn flush(&self) {
        let samples = match self.buffer.drain().await {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!(error = %e, "Flush skipped");
                return;
            }
        };

        if samples.is_empty() {
            self.stats.record_empty_flush();
            tracing::info!("No data to send");
            return;
        }

        let batch = UploadBatch::periodic(samples);
        tracing::info!(samples = batch.len(), "Flushing accumulated data");

        let uploader = Arc::clone(&self.uploader);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            match uploader.send(&batch).await {
                Ok(()) => {
                    stats.record_batch_sent();
                    stats.record_samples_flushed(batch.len());
                    tracing::info!(samples = batch.len(), "Data sent successfully");
                }
                Err(e) => {
                    stats.record_batch_failed();
                    tracing::warn!(samples = batch.len(), error = %e, "Error sending data; batch dropped");
                }
            }
        });
    }
}
