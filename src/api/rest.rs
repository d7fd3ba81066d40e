use std::convert::Infallible;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use warp::Filter;
use warp::reply::Json;

use crate::aggregator::{AgentStats, Scheduler, StatsSnapshot};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    fn success(message: &str, data: Option<serde_json::Value>) -> Self {
        ApiResponse { status: "success".to_string(), message: message.to_string(), data }
    }

    fn error(message: String) -> Self {
        ApiResponse { status: "error".to_string(), message, data: None }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentStatus {
    pub running: bool,
    pub generation: u64,
    pub samples_buffered: usize,
    #[serde(flatten)]
    pub counters: StatsSnapshot,
}

pub struct RestApi {
    scheduler: Arc<Scheduler>,
    stats: Arc<AgentStats>,
}

impl RestApi {
    pub fn new(scheduler: Arc<Scheduler>, stats: Arc<AgentStats>) -> Self {
        RestApi { scheduler, stats }
    }

    pub fn routes(&self) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        self.get_status().or(self.get_health())
    }

    fn get_status(&self) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let scheduler = Arc::clone(&self.scheduler);
        let stats = Arc::clone(&self.stats);

        warp::path!("status")
            .and(warp::get())
            .and_then(move || {
                let scheduler = Arc::clone(&scheduler);
                let stats = Arc::clone(&stats);
                async move {
                    let samples_buffered = match scheduler.buffer().len().await {
                        Ok(len) => len,
                        Err(e) => {
                            let response = ApiResponse::error(e.to_string());
                            return Ok::<Json, Infallible>(warp::reply::json(&response));
                        }
                    };

                    let status = AgentStatus {
                        running: scheduler.is_running().await,
                        generation: scheduler.generation(),
                        samples_buffered,
                        counters: stats.snapshot(),
                    };
                    let response = match serde_json::to_value(&status) {
                        Ok(data) => ApiResponse::success("Agent status", Some(data)),
                        Err(e) => ApiResponse::error(format!("Failed to encode status: {}", e)),
                    };
                    Ok::<Json, Infallible>(warp::reply::json(&response))
                }
            })
    }

    fn get_health(&self) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        warp::path!("health")
            .and(warp::get())
            .map(|| warp::reply::json(&ApiResponse::success("ok", None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{adapters::default_adapters, spawn_buffer};
    use crate::sensors::{MemoryStore, Sample, SourceKind};
    use crate::upload::MemoryUploader;
    use std::time::Duration;

    fn api() -> (RestApi, Arc<Scheduler>) {
        let stats = Arc::new(AgentStats::new());
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryUploader::new()),
            spawn_buffer(),
            default_adapters(10),
            Arc::clone(&stats),
            Duration::from_secs(30),
            Duration::from_secs(5),
        ));
        (RestApi::new(Arc::clone(&scheduler), stats), scheduler)
    }

    #[tokio::test]
    async fn test_status_reports_buffer_and_schedule() {
        let (api, scheduler) = api();
        scheduler.buffer()
            .append(vec![Sample::scalar(SourceKind::HeartRate, 71.0, chrono::Utc::now())])
            .await
            .unwrap();
        scheduler.start_schedule().await;

        let response = warp::test::request()
            .method("GET")
            .path("/status")
            .reply(&api.routes())
            .await;
        assert_eq!(response.status(), 200);

        let body: ApiResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.status, "success");
        let status: AgentStatus = serde_json::from_value(body.data.unwrap()).unwrap();
        assert!(status.running);
        assert_eq!(status.generation, 1);
        assert_eq!(status.samples_buffered, 1);
        assert_eq!(status.counters.ticks, 0);
    }

    #[tokio::test]
    async fn test_health() {
        let (api, _) = api();
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&api.routes())
            .await;
        assert_eq!(response.status(), 200);
        let body: ApiResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.message, "ok");
    }

    #[tokio::test]
    async fn test_unknown_path_rejected() {
        let (api, _) = api();
        let response = warp::test::request()
            .method("GET")
            .path("/fhir/Observation")
            .reply(&api.routes())
            .await;
        assert_eq!(response.status(), 404);
    }
}
