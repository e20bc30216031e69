use crate::error::AppError;
use crate::estimation::geometry::round_to;
use async_trait::async_trait;

pub mod mock;
pub mod remote;

pub const PERCENT_UNITS: &str = "%";

/// Automatic sampling mode of the level meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// Sample on the configured interval.
    Sample,
}

impl SampleMode {
    pub fn code(self) -> &'static str {
        match self {
            SampleMode::Sample => "S",
        }
    }
}

/// Mode reported by the meter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeterMode {
    Off,
    Other(String),
}

impl MeterMode {
    pub fn from_reported(mode: &str) -> Self {
        if mode.trim() == "Off" {
            MeterMode::Off
        } else {
            MeterMode::Other(mode.trim().to_string())
        }
    }
}

/// Operations of a liquid helium level meter behind the hardware manager.
#[async_trait]
pub trait LevelMeter: Send + Sync {
    async fn select_device(&self) -> Result<(), AppError>;
    async fn set_sample_mode(&self, mode: SampleMode) -> Result<(), AppError>;
    /// `interval` is formatted "HH:MM:SS".
    async fn set_sample_interval(&self, interval: &str) -> Result<(), AppError>;
    async fn set_off_mode(&self) -> Result<(), AppError>;
    async fn set_units(&self, units: &str) -> Result<(), AppError>;
    /// Ask the meter to take a measurement.
    async fn prep_measure(&self) -> Result<(), AppError>;
    /// Last measurement as reported, e.g. "45.3 %".
    async fn get_measure(&self) -> Result<String, AppError>;
    async fn get_mode(&self) -> Result<MeterMode, AppError>;
}

/// Parses a "45.3 %" style reading into a percent rounded to 0.01.
pub fn parse_percent_reading(raw: &str) -> Result<f64, AppError> {
    let number = raw.trim().trim_end_matches('%').trim();
    let percent: f64 = number
        .parse()
        .map_err(|_| AppError::InvalidReading(raw.to_string()))?;
    if !percent.is_finite() {
        return Err(AppError::InvalidReading(raw.to_string()));
    }
    Ok(round_to(percent, 2))
}
