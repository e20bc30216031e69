//! Unit conversions between sensor inches, percent of the active length and liters.
//!
//! The dewar has a narrow tail below a wide belly, so volume is piecewise
//! linear in the level: one liters-per-inch factor below the belly bottom and
//! another above it.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VesselGeometry {
    pub active_length_in: f64,
    pub belly_bottom_in: f64,
    pub belly_top_in: f64,
    pub belly_liters_per_in: f64,
    pub tail_liters_per_in: f64,
    pub fill_level_in: f64,
}

impl VesselGeometry {
    /// Level in inches for a meter percent, rounded to 0.01 in.
    pub fn percent_to_inches(&self, percent: f64) -> f64 {
        round_to(percent * self.active_length_in / 100.0, 2)
    }

    pub fn inches_to_percent(&self, inches: f64) -> f64 {
        100.0 * inches / self.active_length_in
    }

    pub fn volume_liters(&self, inches: f64) -> f64 {
        if inches < self.belly_bottom_in {
            inches * self.tail_liters_per_in
        } else {
            let tail = self.belly_bottom_in * self.tail_liters_per_in;
            tail + (inches - self.belly_bottom_in) * self.belly_liters_per_in
        }
    }

    /// Volume truncated to whole liters, as displayed and stored.
    pub fn whole_liters(&self, inches: f64) -> i64 {
        self.volume_liters(inches).trunc() as i64
    }

    pub fn fill_level_percent(&self) -> f64 {
        round_to(self.inches_to_percent(self.fill_level_in), 1)
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
