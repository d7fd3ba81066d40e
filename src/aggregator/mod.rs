//! Sampling aggregator
//!
//! Ties the pieces together:
//! - A repeating schedule that polls vitals into a shared buffer and flushes it
//! - Observers that turn ECG and sleep notifications into one-shot uploads
//!
//! Nothing starts until the sensor store grants read access.

pub mod adapters;
pub mod barrier;
pub mod buffer;
pub mod observers;
pub mod schedule;
pub mod stats;

pub use adapters::VitalsAdapter;
pub use barrier::CompletionBarrier;
pub use buffer::{spawn_buffer, BufferClosed, BufferHandle};
pub use observers::{EcgObserver, SleepObserver, SleepSummary};
pub use schedule::Scheduler;
pub use stats::{AgentStats, StatsSnapshot};

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::AgentError;
use crate::sensors::{SensorStore, SourceKind};
use crate::upload::Uploader;

pub struct Agent {
    store: Arc<dyn SensorStore>,
    scheduler: Arc<Scheduler>,
    ecg: Arc<EcgObserver>,
    sleep: Arc<SleepObserver>,
    stats: Arc<AgentStats>,
    observer_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Agent {
    /// Must be called inside a tokio runtime; the buffer task is spawned here.
    pub fn new(config: &Config, store: Arc<dyn SensorStore>, uploader: Arc<dyn Uploader>) -> Self {
        let stats = Arc::new(AgentStats::new());
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&uploader),
            spawn_buffer(),
            adapters::default_adapters(config.schedule.fetch_limit),
            Arc::clone(&stats),
            config.schedule.period(),
            config.schedule.grace(),
        );
        let ecg = EcgObserver::new(
            Arc::clone(&store),
            Arc::clone(&uploader),
            Arc::clone(&stats),
            config.observers.ecg_transmit,
        );
        let sleep = SleepObserver::new(
            Arc::clone(&store),
            uploader,
            Arc::clone(&stats),
            config.observers.sleep_lookback_days,
        );

        Agent {
            store,
            scheduler: Arc::new(scheduler),
            ecg: Arc::new(ecg),
            sleep: Arc::new(sleep),
            stats,
            observer_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Requests read access once, then starts the schedule and both observers.
    /// A denial leaves the agent idle and is not retried. Starting again
    /// replaces the running timer and observer subscriptions.
    pub async fn start(&self) -> Result<(), AgentError> {
        if let Err(e) = self.store.request_authorization(&SourceKind::ALL).await {
            tracing::error!(error = %e, "Authorization failed; sampling will not start");
            return Err(AgentError::Authorization(e));
        }
        tracing::info!("Authorization granted for all requested data");

        self.scheduler.start_schedule().await;

        let mut tasks = self.observer_tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        match Arc::clone(&self.ecg).start().await {
            Ok(task) => tasks.push(task),
            Err(e) => tracing::warn!(error = %e, "ECG observer query error"),
        }
        match Arc::clone(&self.sleep).start().await {
            Ok(task) => tasks.push(task),
            Err(e) => tracing::warn!(error = %e, "Sleep analysis observer query error"),
        }
        Ok(())
    }

    /// Stops the schedule and the observer loops. In-flight fetches and sends are left to finish.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        for task in self.observer_tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn ecg_observer(&self) -> Arc<EcgObserver> {
        Arc::clone(&self.ecg)
    }

    pub fn stats(&self) -> Arc<AgentStats> {
        Arc::clone(&self.stats)
    }
}
