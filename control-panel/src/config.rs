use config::{ConfigError, Environment, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

type Builder = config::ConfigBuilder<DefaultState>;

/// Configuration file, relative to the working directory, without extension.
const CONFIG_FILE: &str = "control-panel/config";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub session: SessionConfig,
    pub telemetry: TelemetryConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Generate readings locally instead of talking to the robot.
    pub simulate: bool,
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub connect_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Load configuration from built-in defaults, then `control-panel/config.toml`
    /// (optional), then `PANEL_*` environment variables, e.g.
    /// `PANEL_DEVICE__HOST=10.0.0.7`.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Self::defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix("PANEL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML document layered over the defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<Builder, ConfigError> {
        config::Config::builder()
            .set_default("device.simulate", true)?
            .set_default("device.host", "192.168.1.100")?
            .set_default("device.port", 80)?
            .set_default("device.request_timeout_ms", 2000)?
            .set_default("session.connect_delay_ms", 1500)?
            .set_default("session.connect_timeout_ms", 5000)?
            .set_default("telemetry.poll_interval_ms", 2000)?
            .set_default("api.host", "127.0.0.1")?
            .set_default("api.port", 3000)
    }
}

impl DeviceConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SessionConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl TelemetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ApiConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
