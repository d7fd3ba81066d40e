//! komodo-sync: periodic health-sensor sampling and batched upload
//!
//! komodo-sync reads vitals from an on-device health store on a fixed
//! schedule, accumulates them and posts one batch per tick to a monitoring
//! backend. ECG and sleep data arrive through store notifications and are
//! uploaded as one-shot batches outside the schedule.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod sensors;
pub mod upload;

pub use aggregator::Agent;
pub use config::{load_config, Config};
pub use error::AgentError;
