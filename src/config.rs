//! Tracker and API configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunSquadError};

/// Environment variable holding the API base URL.
pub const API_URL_ENV: &str = "RUNSQUAD_API_URL";

/// Base URL used when no override is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Options passed to the location source when a watch is opened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    /// Time allowed per fix before the source reports a timeout
    pub timeout_ms: u64,
    /// Maximum age of a cached fix; 0 forces fresh readings
    pub maximum_age_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 0,
        }
    }
}

/// Filtering thresholds and timing for the GPS tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Fixes reporting a worse accuracy radius are dropped.
    /// Default: 50 meters
    pub max_accuracy_m: f64,

    /// Consecutive fixes at least this far apart count as a GPS jump.
    /// Default: 0.1 km
    pub jump_threshold_km: f64,

    /// Shortest run that may be saved.
    /// Default: 0.01 km
    pub min_save_distance_km: f64,

    /// Display timer period in milliseconds.
    /// Default: 1000
    pub tick_interval_ms: u64,

    pub watch: WatchOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 50.0,
            jump_threshold_km: 0.1,
            min_save_distance_km: 0.01,
            tick_interval_ms: 1000,
            watch: WatchOptions::default(),
        }
    }
}

impl TrackerConfig {
    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RunSquadError::config(format!("invalid tracker config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Reject thresholds that would make the filters meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_accuracy_m.is_finite() && self.max_accuracy_m > 0.0) {
            return Err(RunSquadError::config("max_accuracy_m must be positive"));
        }
        if !(self.jump_threshold_km.is_finite() && self.jump_threshold_km > 0.0) {
            return Err(RunSquadError::config("jump_threshold_km must be positive"));
        }
        if !(self.min_save_distance_km.is_finite() && self.min_save_distance_km >= 0.0) {
            return Err(RunSquadError::config(
                "min_save_distance_km must not be negative",
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(RunSquadError::config("tick_interval_ms must be non-zero"));
        }
        Ok(())
    }
}

/// Connection settings for the RunSquad REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Always ends in `/api` after [`ApiConfig::new`] or [`ApiConfig::from_env`]
    pub base_url: String,
    pub timeout_secs: u64,
    /// Retries for idempotent requests on 429 or transport errors
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_api_url(base_url),
            ..Self::default()
        }
    }

    /// Read the base URL from `RUNSQUAD_API_URL`, falling back to the default.
    pub fn from_env() -> Self {
        match std::env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => {
                log::info!("[ApiConfig] Using {} from environment", API_URL_ENV);
                Self::new(url.trim())
            }
            _ => Self::default(),
        }
    }
}

/// Ensure the API URL ends with `/api`.
pub fn normalize_api_url(url: &str) -> String {
    if url.ends_with("/api") {
        url.to_string()
    } else if url.ends_with('/') {
        format!("{}api", url)
    } else {
        format!("{}/api", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_accuracy_m, 50.0);
        assert_eq!(config.jump_threshold_km, 0.1);
        assert_eq!(config.min_save_distance_km, 0.01);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(config.watch.enable_high_accuracy);
        assert_eq!(config.watch.timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tracker_from_json_partial() {
        let config = TrackerConfig::from_json(r#"{"max_accuracy_m": 25.0}"#).unwrap();
        assert_eq!(config.max_accuracy_m, 25.0);
        assert_eq!(config.jump_threshold_km, 0.1);
    }

    #[test]
    fn test_tracker_from_json_rejects_bad_values() {
        assert!(matches!(
            TrackerConfig::from_json(r#"{"tick_interval_ms": 0}"#),
            Err(RunSquadError::Config { .. })
        ));
        assert!(TrackerConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_normalize_api_url() {
        assert_eq!(
            normalize_api_url("http://localhost:5000/api"),
            "http://localhost:5000/api"
        );
        assert_eq!(
            normalize_api_url("https://runsquad.example.com/"),
            "https://runsquad.example.com/api"
        );
        assert_eq!(
            normalize_api_url("https://runsquad.example.com"),
            "https://runsquad.example.com/api"
        );
        assert_eq!(ApiConfig::new("http://h").base_url, "http://h/api");
    }
}
