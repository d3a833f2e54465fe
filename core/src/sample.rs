use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped reading of every monitored heat pump sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub time: DateTime<Utc>,
    pub outside_temp: f64,
    pub inside_temp: f64,
    pub heat_dist_circuit1_temp: f64,
    pub heat_dist_circuit2_temp: f64,
    pub heat_dist_circuit3_temp: f64,
    pub lower_tank_temp: f64,
    pub upper_tank_temp: f64,
    pub compressor_running: bool,
    #[serde(default)]
    pub compressor_usage: Option<f64>,

    // Thresholds configured on the unit at sample time
    pub lower_tank_minimum: f64,
    pub lower_tank_maximum: f64,
    pub upper_tank_minimum: f64,
    pub upper_tank_maximum: f64,
    pub heat_dist_circuit3_target: f64,
}

impl TelemetrySample {
    /// Compressor usage as a fraction, clamped to [0, 1]. Missing usage reads as idle.
    pub fn compressor_usage(&self) -> f64 {
        self.compressor_usage.unwrap_or(0.0).clamp(0.0, 1.0)
    }

    pub fn has_time_after(&self, other: &TelemetrySample) -> bool {
        self.time > other.time
    }
}

#[cfg(test)]
pub(crate) fn sample_at(time: DateTime<Utc>, outside_temp: f64) -> TelemetrySample {
    TelemetrySample {
        time,
        outside_temp,
        inside_temp: 21.0,
        heat_dist_circuit1_temp: 30.0,
        heat_dist_circuit2_temp: 29.5,
        heat_dist_circuit3_temp: 28.0,
        lower_tank_temp: 45.0,
        upper_tank_temp: 52.0,
        compressor_running: false,
        compressor_usage: None,
        lower_tank_minimum: 40.0,
        lower_tank_maximum: 50.0,
        upper_tank_minimum: 48.0,
        upper_tank_maximum: 58.0,
        heat_dist_circuit3_target: 27.0,
    }
}
