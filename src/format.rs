//! Display formatting for the live tracker readout.

use serde::{Deserialize, Serialize};

use crate::track::RunMetrics;

/// Shown when pace cannot be computed yet.
pub const PACE_PLACEHOLDER: &str = "--:--";

/// Elapsed time as `MM:SS`; minutes keep counting past 59.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Distance in metres below 1 km, otherwise kilometres with two decimals.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{:.0} m", km * 1000.0)
    } else {
        format!("{:.2} km", km)
    }
}

/// Pace as `M:SS` per km, or the placeholder.
pub fn format_pace(minutes_per_km: Option<f64>) -> String {
    match minutes_per_km {
        Some(pace) if pace.is_finite() && pace > 0.0 => {
            let mins = pace.floor();
            let secs = ((pace - mins) * 60.0).floor() as u64;
            format!("{}:{:02}", mins as u64, secs)
        }
        _ => PACE_PLACEHOLDER.to_string(),
    }
}

/// Speed with one decimal; unknown speed reads as zero.
pub fn format_speed(kmh: Option<f64>) -> String {
    let speed = kmh.filter(|s| s.is_finite()).unwrap_or(0.0);
    format!("{:.1} km/h", speed)
}

/// The four tracker tiles, formatted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayReadout {
    pub distance: String,
    pub time: String,
    pub pace: String,
    pub speed: String,
}

impl From<&RunMetrics> for DisplayReadout {
    fn from(metrics: &RunMetrics) -> Self {
        Self {
            distance: format_distance(metrics.distance_km),
            time: format_time(metrics.elapsed_seconds),
            pace: format_pace(metrics.pace_min_per_km),
            speed: format_speed(metrics.speed_kmh),
        }
    }
}
