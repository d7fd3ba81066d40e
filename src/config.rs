use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upload: UploadConfig,
    pub schedule: ScheduleConfig,
    pub observers: ObserverConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub simulation: SimulationConfig,
}

/// Backend the batches are posted to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub base_url: String,
    pub data_path: String,    // periodic vitals batches
    pub static_path: String,  // one-shot sleep/ECG batches
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            base_url: "http://127.0.0.1:8000".to_string(),
            data_path: "/api/data".to_string(),
            static_path: "/api/static".to_string(),
            timeout_secs: 10,
        }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub period_secs: u64,
    pub grace_secs: u64,
    pub fetch_limit: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            period_secs: 30,
            grace_secs: 5,
            fetch_limit: 10,
        }
    }
}

impl ScheduleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Completed ECG batches are only built, not sent, unless this is set
    pub ecg_transmit: bool,
    pub sleep_lookback_days: i64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        ObserverConfig {
            ecg_transmit: false,
            sleep_lookback_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when RUST_LOG is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub deny_authorization: bool,
    pub ecg_every_secs: u64,
    pub sleep_every_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            deny_authorization: false,
            ecg_every_secs: 300,
            sleep_every_secs: 3600,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.period_secs == 0 {
            return Err(ConfigError::Invalid("schedule.period_secs must be positive".to_string()));
        }
        if self.schedule.grace_secs >= self.schedule.period_secs {
            return Err(ConfigError::Invalid(format!(
                "schedule.grace_secs ({}) must be shorter than schedule.period_secs ({})",
                self.schedule.grace_secs, self.schedule.period_secs
            )));
        }
        if self.schedule.fetch_limit == 0 {
            return Err(ConfigError::Invalid("schedule.fetch_limit must be positive".to_string()));
        }
        if self.upload.timeout_secs == 0 {
            return Err(ConfigError::Invalid("upload.timeout_secs must be positive".to_string()));
        }
        if self.simulation.ecg_every_secs == 0 || self.simulation.sleep_every_secs == 0 {
            return Err(ConfigError::Invalid(
                "simulation.ecg_every_secs and simulation.sleep_every_secs must be positive".to_string(),
            ));
        }
        if self.observers.sleep_lookback_days <= 0 {
            return Err(ConfigError::Invalid("observers.sleep_lookback_days must be positive".to_string()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)?;
    Config::from_yaml_str(&contents)
}
