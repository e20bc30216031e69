//! Level trend estimation: sample history, consumption fit and time to fill.
//!
//! Everything here is pure arithmetic over the recorded samples; the polling
//! loop in [`crate::monitor`] decides when to call it.

use serde::Serialize;
use std::fmt;

pub mod geometry;
pub mod linear;

use geometry::VesselGeometry;
use linear::LinearFit;

/// Samples newer than this many hours before the latest one form the preferred fit window.
pub const TRAILING_WINDOW_HOURS: f64 = 24.0;
/// Fit window used when the trailing window is too sparse or rising (a refill).
pub const FALLBACK_SAMPLE_COUNT: usize = 4;
pub const CHART_SPAN_HOURS: f64 = 72.0;
pub const FILL_MODE_CHART_SPAN_HOURS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Hours since the monitor started.
    pub elapsed_hours: f64,
    pub percent: f64,
    pub inches: f64,
}

/// Append-only sample history that ignores repeated levels.
#[derive(Debug, Clone, Default)]
pub struct SampleLog {
    samples: Vec<Sample>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `inches` differs from the last recorded level.
    pub fn is_new_level(&self, inches: f64) -> bool {
        self.samples.last().is_none_or(|last| last.inches != inches)
    }

    /// Appends the sample if its level changed. Returns whether it was kept.
    pub fn record(&mut self, sample: Sample) -> bool {
        if !self.is_new_level(sample.inches) {
            return false;
        }
        self.samples.push(sample);
        true
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Percent per hour between the last two samples.
pub fn recent_rate(samples: &[Sample]) -> Option<f64> {
    let [.., previous, last] = samples else {
        return None;
    };
    let dt = last.elapsed_hours - previous.elapsed_hours;
    if dt == 0.0 {
        return None;
    }
    Some((last.percent - previous.percent) / dt)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitWindow {
    Trailing24h,
    LastSamples,
}

/// Least-squares consumption fit and the samples it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsumptionFit {
    pub line: LinearFit,
    pub window: FitWindow,
    /// Index of the first sample in the fit window.
    pub start_index: usize,
}

impl ConsumptionFit {
    /// Percent per hour; negative while helium boils off.
    pub fn rate(&self) -> f64 {
        self.line.slope
    }
}

pub fn consumption_fit(samples: &[Sample]) -> Option<ConsumptionFit> {
    let rows = samples.len();
    if rows < 2 {
        return None;
    }

    let cutoff = samples[rows - 1].elapsed_hours - TRAILING_WINDOW_HOURS;
    let trailing_start = samples.partition_point(|s| s.elapsed_hours < cutoff);

    let (start_index, window) =
        if trailing_start < rows - 1 && mean_step(&samples[trailing_start..]) <= 0.0 {
            (trailing_start, FitWindow::Trailing24h)
        } else {
            (rows.saturating_sub(FALLBACK_SAMPLE_COUNT), FitWindow::LastSamples)
        };

    let line = linear::fit(
        samples[start_index..]
            .iter()
            .map(|s| (s.elapsed_hours, s.percent)),
    )?;

    Some(ConsumptionFit {
        line,
        window,
        start_index,
    })
}

/// Mean difference between consecutive percent values.
fn mean_step(samples: &[Sample]) -> f64 {
    let steps = samples.len().saturating_sub(1);
    if steps == 0 {
        return 0.0;
    }
    let total: f64 = samples
        .windows(2)
        .map(|pair| pair[1].percent - pair[0].percent)
        .sum();
    total / steps as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Comfortable,
    Soon,
    Critical,
}

/// Hours until the extrapolated level reaches the fill level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeToFill {
    /// Raw extrapolation; may be negative when the fill level was already passed.
    pub hours: f64,
}

impl TimeToFill {
    pub fn clamped_hours(&self) -> f64 {
        self.hours.max(0.0)
    }

    pub fn days(&self) -> u64 {
        (self.clamped_hours() / 24.0).floor() as u64
    }

    /// Whole hours left over after the whole days.
    pub fn hours_part(&self) -> u64 {
        (self.clamped_hours() % 24.0).floor() as u64
    }

    pub fn urgency(&self) -> Urgency {
        if self.hours >= 24.0 {
            Urgency::Comfortable
        } else if self.hours > 1.0 {
            Urgency::Soon
        } else {
            Urgency::Critical
        }
    }
}

impl fmt::Display for TimeToFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} days, {} hours", self.days(), self.hours_part())
    }
}

/// Extrapolates the fit to `now_hours` and solves for the fill level.
///
/// Returns `None` for a flat fit, which never reaches the fill level.
pub fn time_to_fill(
    fit: &ConsumptionFit,
    now_hours: f64,
    geometry: &VesselGeometry,
) -> Option<TimeToFill> {
    let inches_per_percent = geometry.active_length_in / 100.0;
    let burn = fit.line.slope.abs() * inches_per_percent;
    if burn == 0.0 || !burn.is_finite() {
        return None;
    }
    let predicted_percent = fit.line.predict(now_hours);
    let hours = (predicted_percent * inches_per_percent - geometry.fill_level_in) / burn;
    hours.is_finite().then_some(TimeToFill { hours })
}

/// X range for the level chart, or `None` to auto range.
pub fn chart_window(samples: &[Sample], fill_mode: bool) -> Option<(f64, f64)> {
    let last = samples.last()?.elapsed_hours;
    if fill_mode {
        Some((last - FILL_MODE_CHART_SPAN_HOURS, last))
    } else if last > CHART_SPAN_HOURS {
        Some((last - CHART_SPAN_HOURS, last))
    } else {
        None
    }
}

/// Fit line evaluated at every sample of its window.
pub fn fit_line(samples: &[Sample], fit: &ConsumptionFit) -> Vec<(f64, f64)> {
    samples
        .get(fit.start_index..)
        .unwrap_or_default()
        .iter()
        .map(|s| (s.elapsed_hours, fit.line.predict(s.elapsed_hours)))
        .collect()
}
