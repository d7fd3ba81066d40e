use thiserror::Error;

use crate::config::ConfigError;
use crate::sensors::StoreError;
use crate::upload::UploadError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Sensor data authorization failed: {0}")]
    Authorization(StoreError),
    #[error("Upload client error: {0}")]
    Upload(#[from] UploadError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Status API error: {0}")]
    Api(String),
}
