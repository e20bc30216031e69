use crate::estimation::geometry::VesselGeometry;
use crate::monitor::interval::SampleInterval;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_INTERVAL: &str = "05:00:00";
pub const DEFAULT_FILL_MODE_INTERVAL: &str = "00:01:00";
pub const DEFAULT_POLL_PERIOD_SECS: u64 = 10;
pub const DEFAULT_SETTLE_SECS: u64 = 20;
pub const DEFAULT_FILL_MODE_TIMEOUT_SECS: u64 = 7200;
pub const DEFAULT_METER_SERVER: &str = "lm_510";
pub const DEFAULT_DATAVAULT_SERVER: &str = "data_vault";
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STATUS_TABLE: &str = "Status";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    pub vessel: VesselSection,
    pub hardware: HardwareSection,
    #[serde(default)]
    pub sampling: Option<SamplingSection>,
    #[serde(default)]
    pub datavault: Option<DataVaultSection>,
    #[serde(default)]
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

/// Dewar geometry, all lengths in sensor inches.
#[derive(Debug, Deserialize, Clone)]
pub struct VesselSection {
    /// Sensor range mapped to 0-100 %.
    pub active_length_in: f64,
    pub belly_bottom_in: f64,
    pub belly_top_in: f64,
    /// Liters per inch in the belly, measured with the insert in.
    pub belly_liters_per_in: f64,
    /// Liters per inch in the tail, measured with the insert in.
    pub tail_liters_per_in: f64,
    /// Level at which the dewar gets refilled.
    pub fill_level_in: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SamplingSection {
    /// Meter interval as "HH:MM:SS" or "manual" (default: 05:00:00)
    pub default_interval: Option<String>,
    /// Meter interval while in fill mode (default: 00:01:00)
    pub fill_mode_interval: Option<String>,
    /// How often the loop reads the meter (default: 10)
    pub poll_period_secs: Option<u64>,
    /// Wait after the first prep before polling (default: 20)
    pub settle_secs: Option<u64>,
    /// Fill mode switches itself off after this long (default: 7200)
    pub fill_mode_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HardwareSection {
    /// JSON RPC endpoint of the hardware manager
    pub endpoint: String,
    /// Level meter device server (default: lm_510)
    pub meter_server: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataVaultSection {
    /// Defaults to the hardware endpoint
    pub endpoint: Option<String>,
    pub server: Option<String>,
    /// System identifier the datasets are filed under
    pub system: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSection {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub database: String,
    pub table: Option<String>,
    /// File holding the database password on its first line
    pub password_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("failed to read database password file {path}: {source}")]
    PasswordFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let vessel = &self.vessel;
        let lengths = [
            vessel.active_length_in,
            vessel.belly_bottom_in,
            vessel.belly_top_in,
            vessel.belly_liters_per_in,
            vessel.tail_liters_per_in,
            vessel.fill_level_in,
        ];
        if lengths.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::Invalid(
                "vessel values must be finite and non-negative".to_string(),
            ));
        }
        if vessel.active_length_in <= 0.0 {
            return Err(ConfigError::Invalid(
                "vessel.active_length_in must be positive".to_string(),
            ));
        }
        if vessel.belly_bottom_in > vessel.belly_top_in
            || vessel.belly_top_in > vessel.active_length_in
        {
            return Err(ConfigError::Invalid(
                "expected belly_bottom_in <= belly_top_in <= active_length_in".to_string(),
            ));
        }
        if vessel.fill_level_in > vessel.active_length_in {
            return Err(ConfigError::Invalid(
                "vessel.fill_level_in exceeds active_length_in".to_string(),
            ));
        }
        self.default_interval()?;
        let fill = self.fill_mode_interval()?;
        if fill.is_manual() {
            return Err(ConfigError::Invalid(
                "sampling.fill_mode_interval cannot be manual".to_string(),
            ));
        }
        if self.poll_period().is_zero() {
            return Err(ConfigError::Invalid(
                "sampling.poll_period_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn geometry(&self) -> VesselGeometry {
        let vessel = &self.vessel;
        VesselGeometry {
            active_length_in: vessel.active_length_in,
            belly_bottom_in: vessel.belly_bottom_in,
            belly_top_in: vessel.belly_top_in,
            belly_liters_per_in: vessel.belly_liters_per_in,
            tail_liters_per_in: vessel.tail_liters_per_in,
            fill_level_in: vessel.fill_level_in,
        }
    }

    pub fn default_interval(&self) -> Result<SampleInterval, ConfigError> {
        let raw = self
            .sampling
            .as_ref()
            .and_then(|s| s.default_interval.as_deref())
            .unwrap_or(DEFAULT_INTERVAL);
        parse_interval("sampling.default_interval", raw)
    }

    pub fn fill_mode_interval(&self) -> Result<SampleInterval, ConfigError> {
        let raw = self
            .sampling
            .as_ref()
            .and_then(|s| s.fill_mode_interval.as_deref())
            .unwrap_or(DEFAULT_FILL_MODE_INTERVAL);
        parse_interval("sampling.fill_mode_interval", raw)
    }

    pub fn poll_period(&self) -> Duration {
        let secs = self
            .sampling
            .as_ref()
            .and_then(|s| s.poll_period_secs)
            .unwrap_or(DEFAULT_POLL_PERIOD_SECS);
        Duration::from_secs(secs)
    }

    pub fn settle_period(&self) -> Duration {
        let secs = self
            .sampling
            .as_ref()
            .and_then(|s| s.settle_secs)
            .unwrap_or(DEFAULT_SETTLE_SECS);
        Duration::from_secs(secs)
    }

    pub fn fill_mode_timeout(&self) -> Duration {
        let secs = self
            .sampling
            .as_ref()
            .and_then(|s| s.fill_mode_timeout_secs)
            .unwrap_or(DEFAULT_FILL_MODE_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn meter_server(&self) -> &str {
        self.hardware
            .meter_server
            .as_deref()
            .unwrap_or(DEFAULT_METER_SERVER)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(
            self.hardware
                .timeout_secs
                .unwrap_or(DEFAULT_RPC_TIMEOUT_SECS),
        )
    }

    /// Data vault endpoint, falling back to the hardware manager.
    pub fn datavault_endpoint(&self) -> &str {
        self.datavault
            .as_ref()
            .and_then(|s| s.endpoint.as_deref())
            .unwrap_or(&self.hardware.endpoint)
    }

    pub fn datavault_server(&self) -> &str {
        self.datavault
            .as_ref()
            .and_then(|s| s.server.as_deref())
            .unwrap_or(DEFAULT_DATAVAULT_SERVER)
    }

    pub fn datavault_system(&self) -> Option<&str> {
        self.datavault.as_ref().map(|s| s.system.as_str())
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}

impl DatabaseSection {
    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(DEFAULT_STATUS_TABLE)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_MYSQL_PORT)
    }

    /// Reads the password file; a missing path means no password.
    pub fn password(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = self.password_file.as_deref() else {
            return Ok(None);
        };
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::PasswordFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(contents.lines().next().map(|line| line.trim().to_string()))
    }
}

fn parse_interval(key: &str, raw: &str) -> Result<SampleInterval, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: {raw:?} is not HH:MM:SS or manual")))
}
