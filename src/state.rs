use crate::estimation::{ConsumptionFit, Sample, TimeToFill};
use crate::monitor::interval::SampleInterval;
use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Error,
}

/// Latest level, refreshed whenever a new sample is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelReport {
    pub inches: f64,
    pub percent: f64,
    pub volume_liters: i64,
    /// %/hour between the last two samples.
    pub recent_rate: Option<f64>,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FillModeStatus {
    pub active: bool,
    pub since: Option<SystemTime>,
}

#[derive(Debug)]
pub struct AppState {
    status: ConnectionStatus,
    dataset: Option<String>,
    samples: Vec<Sample>,
    level: Option<LevelReport>,
    fit: Option<ConsumptionFit>,
    time_to_fill: Option<TimeToFill>,
    fill_mode: FillModeStatus,
    interval: Option<SampleInterval>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            dataset: None,
            samples: Vec::new(),
            level: None,
            fit: None,
            time_to_fill: None,
            fill_mode: FillModeStatus::default(),
            interval: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    pub fn dataset(&self) -> Option<&str> {
        self.dataset.as_deref()
    }

    pub fn set_dataset(&mut self, dataset: Option<String>) {
        self.dataset = dataset;
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn set_samples(&mut self, samples: Vec<Sample>) {
        self.samples = samples;
    }

    pub fn level(&self) -> Option<&LevelReport> {
        self.level.as_ref()
    }

    pub fn set_level(&mut self, level: LevelReport) {
        self.level = Some(level);
    }

    pub fn fit(&self) -> Option<&ConsumptionFit> {
        self.fit.as_ref()
    }

    pub fn set_fit(&mut self, fit: Option<ConsumptionFit>) {
        self.fit = fit;
    }

    pub fn time_to_fill(&self) -> Option<&TimeToFill> {
        self.time_to_fill.as_ref()
    }

    pub fn set_time_to_fill(&mut self, time_to_fill: Option<TimeToFill>) {
        self.time_to_fill = time_to_fill;
    }

    pub fn fill_mode(&self) -> FillModeStatus {
        self.fill_mode
    }

    pub fn set_fill_mode(&mut self, fill_mode: FillModeStatus) {
        self.fill_mode = fill_mode;
    }

    pub fn interval(&self) -> Option<SampleInterval> {
        self.interval
    }

    pub fn set_interval(&mut self, interval: SampleInterval) {
        self.interval = Some(interval);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
