use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use komodo_sync::aggregator::{AgentStats, SleepObserver};
use komodo_sync::config::Config;
use komodo_sync::sensors::{MemoryStore, SleepInterval, SourceKind};
use komodo_sync::upload::{Endpoint, MemoryUploader};
use komodo_sync::Agent;

macro_rules! eventually {
    ($what:expr, $cond:expr) => {{
        let mut reached = false;
        for _ in 0..200 {
            if $cond {
                reached = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reached, "condition never reached: {}", $what);
    }};
}

async fn store_with_last_night() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    store.push_sleep(SleepInterval {
        raw_value: 3,
        start: now - ChronoDuration::hours(6),
        end: now - ChronoDuration::hours(4),
    }).await;
    store
}

#[tokio::test]
async fn test_sleep_subscription_drives_notifications() {
    let store = store_with_last_night().await;
    let uploader = Arc::new(MemoryUploader::new());
    let stats = Arc::new(AgentStats::new());
    let observer = Arc::new(SleepObserver::new(store.clone(), uploader.clone(), Arc::clone(&stats), 7));

    let task = Arc::clone(&observer).start().await.unwrap();
    store.notify(SourceKind::SleepAnalysis).await;
    store.notify(SourceKind::SleepAnalysis).await;

    eventually!("two sleep batches", uploader.batches_for(Endpoint::Static).await.len() == 2);
    assert_eq!(stats.snapshot().sleep_batches_sent, 2);
    task.abort();
}

#[tokio::test]
async fn test_restarting_agent_does_not_duplicate_observers() {
    let store = store_with_last_night().await;
    let uploader = Arc::new(MemoryUploader::new());
    let agent = Agent::new(&Config::default(), store.clone(), uploader.clone());

    agent.start().await.unwrap();
    agent.start().await.unwrap();
    store.notify(SourceKind::SleepAnalysis).await;

    eventually!("sleep batch sent", uploader.batches_for(Endpoint::Static).await.len() == 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(uploader.batches_for(Endpoint::Static).await.len(), 1);
    assert_eq!(agent.stats().snapshot().sleep_batches_sent, 1);
    agent.shutdown().await;
}

#[tokio::test]
async fn test_failed_subscription_leaves_other_paths_running() {
    let store = store_with_last_night().await;
    store.fail_subscription(SourceKind::Electrocardiogram).await;
    let uploader = Arc::new(MemoryUploader::new());
    let agent = Agent::new(&Config::default(), store.clone(), uploader.clone());

    agent.start().await.unwrap();
    assert!(agent.scheduler().is_running().await);

    store.notify(SourceKind::SleepAnalysis).await;
    eventually!("sleep batch sent", agent.stats().snapshot().sleep_batches_sent == 1);
    agent.shutdown().await;
}
