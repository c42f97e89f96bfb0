//! Host configuration for the example worker.
//!
//! Layered like the middleware's own configuration: defaults, then an
//! optional `edge-worker.toml`, then `EDGE_WORKER_` environment variables
//! (nested keys split on `_`, e.g. `EDGE_WORKER_SCHEDULE_INTERVAL=30`).

use crate::WorkerError;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "edge-worker.toml";
const ENV_PREFIX: &str = "EDGE_WORKER_";

/// Host settings: where to listen, where inventory lives, the timer and the
/// log subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub listen: SocketAddr,
    /// Base URL of the inventory service.
    pub inventory: String,
    pub schedule: ScheduleConfig,
    pub log: LogConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            inventory: "http://127.0.0.1:8788".to_string(),
            schedule: ScheduleConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from the default file location and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed.
    pub fn load() -> Result<Self, WorkerError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a specific file path and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, WorkerError> {
        let config = Figment::new()
            .merge(Serialized::defaults(WorkerConfig::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("_"))
            .extract()?;
        Ok(config)
    }
}

/// Timer that produces scheduled events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Seconds between scheduled events.
    pub interval: u64,
    /// Cron expression reported with each scheduled event.
    pub cron: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 60,
            cron: Some("* * * * *".to_string()),
        }
    }
}

impl ScheduleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }
}

/// Subscriber settings. `RUST_LOG` overrides `filter` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info,edge_telemetry=debug".to_string(),
        }
    }
}
