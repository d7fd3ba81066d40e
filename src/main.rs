use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use komodo_sync::api::rest::RestApi;
use komodo_sync::config::{load_config, Config};
use komodo_sync::sensors::SimulatedStore;
use komodo_sync::upload::HttpUploader;
use komodo_sync::{Agent, AgentError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));

    let config = if config_path.exists() {
        load_config(&config_path).map_err(AgentError::from)?
    } else {
        Config::default()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !config_path.exists() {
        tracing::info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    tracing::info!(backend = %config.upload.base_url, "Starting komodo-sync");

    let uploader = Arc::new(HttpUploader::new(&config.upload).map_err(AgentError::from)?);
    let store = Arc::new(SimulatedStore::new(config.simulation.clone()));
    let agent = Agent::new(&config, store, uploader);

    // Create a channel for shutdown signal
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_handle = if config.api.enabled {
        let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
            .parse()
            .map_err(|e| AgentError::Api(format!("invalid status address: {}", e)))?;
        let api = RestApi::new(agent.scheduler(), agent.stats());

        let (bound, server) = warp::serve(api.routes())
            .try_bind_with_graceful_shutdown(addr, async move {
                shutdown_rx.await.ok();
                tracing::info!("Shutting down status server");
            })
            .map_err(|e| AgentError::Api(e.to_string()))?;
        tracing::info!(%bound, "Status API listening");
        Some(tokio::spawn(server))
    } else {
        None
    };

    if let Err(e) = agent.start().await {
        // idle until interrupted; the status API still reports running=false
        tracing::error!(error = %e, "Sampling disabled");
    }

    signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, starting graceful shutdown");

    agent.shutdown().await;
    shutdown_tx.send(()).ok();
    if let Some(handle) = server_handle {
        handle.await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
