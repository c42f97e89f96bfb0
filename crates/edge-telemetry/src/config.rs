//! Configuration loading and management.
//!
//! Layered configuration using figment, loaded from (in order of priority):
//! 1. Default values (compiled in)
//! 2. Config file: `edge-telemetry.toml` (optional)
//! 3. Environment variables with the `EDGE_TELEMETRY_` prefix
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `EDGE_TELEMETRY_SERVICE_NAME` | `service.name` | Name stamped on every record and sent as `x-caller` |
//! | `EDGE_TELEMETRY_EMIT_ENABLED` | `emit.enabled` | Whether payloads are handed to the emitter |
//! | `EDGE_TELEMETRY_EMIT_TIMEOUT` | `emit.timeout` | Milliseconds before a background emission is abandoned |
//! | `EDGE_TELEMETRY_CAPTURE_CLIENT` | `capture.client` | Whether client/geo metadata is copied into request summaries |

use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "edge-telemetry.toml";
const ENV_PREFIX: &str = "EDGE_TELEMETRY_";

/// Main configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub emit: EmitConfig,
    pub capture: CaptureConfig,
}

impl Config {
    /// Loads configuration from defaults, `edge-telemetry.toml` in the
    /// working directory (if present) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any source fails to parse.
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration using a custom config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if any source fails to parse.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("_"));

        Ok(figment.extract()?)
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Identity of the instrumented service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "edge-service".to_string(),
        }
    }
}

/// Payload emission behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitConfig {
    pub enabled: bool,
    /// Upper bound on how long a background emission may keep the invocation
    /// alive.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(5),
        }
    }
}

/// What goes into the event summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Copy client/network metadata (ip, geo, colo, asn, ...) into request
    /// summaries.
    pub client: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { client: true }
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service.name = name.into();
        self
    }

    pub fn emit_enabled(mut self, enabled: bool) -> Self {
        self.config.emit.enabled = enabled;
        self
    }

    pub fn emit_timeout(mut self, timeout: Duration) -> Self {
        self.config.emit.timeout = timeout;
        self
    }

    pub fn capture_client(mut self, capture: bool) -> Self {
        self.config.capture.client = capture;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
