//! # RunSquad
//!
//! GPS run tracking and the RunSquad API client.
//!
//! This library provides:
//! - A run tracker that turns noisy location fixes into distance, time,
//!   pace and speed, with pause/resume and save/discard
//! - Cancellable location and timer subscriptions behind traits, so the
//!   tracker runs against real devices or scripted feeds alike
//! - A REST client for submitting runs, reading progress and taking part
//!   in club runs and challenges
//!
//! ## Features
//!
//! - **`http`** (default) - Enable the HTTP client for the RunSquad API
//!
//! ## Quick Start
//!
//! ```rust
//! use runsquad::source::{event_channel, Feed, FeedSource, FeedTicker, ManualClock};
//! use runsquad::{Fix, GpsTracker, TrackerConfig};
//! use std::time::Duration;
//!
//! let gps = Feed::new();
//! let timer = Feed::new();
//! let clock = ManualClock::new(0);
//! let (sink, mut events) = event_channel();
//!
//! let mut tracker = GpsTracker::new(
//!     TrackerConfig::default(),
//!     FeedSource::new(gps.clone()),
//!     FeedTicker::new(timer.clone()),
//!     clock.clone(),
//!     sink,
//! )
//! .unwrap();
//! tracker.start().unwrap();
//!
//! gps.push_fix(Fix::new(51.5074, -0.1278, 5.0, 0));
//! gps.push_fix(Fix::new(51.5077, -0.1278, 5.0, 1_000));
//! clock.advance(Duration::from_secs(10));
//! timer.tick();
//!
//! while let Ok(event) = events.try_recv() {
//!     let _ = tracker.handle_event(event);
//! }
//! println!("{} in {}", tracker.snapshot().readout.distance, tracker.snapshot().readout.time);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, RunSquadError};

// Configuration (tracker thresholds, API connection)
pub mod config;
pub use config::{ApiConfig, TrackerConfig, WatchOptions};

// Geographic utilities (Haversine, bounds)
pub mod geo_utils;

// Run track state machine
pub mod track;
pub use track::{FixOutcome, RunMetrics, RunTrack, TrackState, TrackSummary};

// Location/timer subscriptions and clocks
pub mod source;
pub use source::{
    Clock, LocationError, LocationSource, StampedEvent, Subscription, Ticker, TrackerEvent,
};

// Run records and the save seam
pub mod records;
pub use records::{Progress, ProgressStatistics, RunRecord, RunSink, SavedRun};

// Tracker controller
pub mod tracker;
pub use tracker::{GpsTracker, TrackerSnapshot};

// Single-task event loop
pub mod driver;
pub use driver::{Command, TrackerDriver};

// Display formatting
pub mod format;
pub use format::DisplayReadout;

// IST date helpers
pub mod dates;

// Clubs, scheduled runs and challenges
pub mod clubs;
pub use clubs::{
    Activity, Challenge, ChallengeType, Club, Leaderboard, NewChallenge, NewClub,
    NewScheduledRun, ScheduledRun,
};

// HTTP client for the RunSquad API
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{ApiClient, AuthResponse, Session, TokenClaims, User};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Bounding box for a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// A single location sample reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters (lower is better)
    pub accuracy_m: f64,
    /// Unix time in milliseconds
    pub timestamp_ms: i64,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            timestamp_ms,
        }
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validity() {
        assert!(GpsPoint::new(51.5074, -0.1278).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, -180.5).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_fix_point() {
        let fix = Fix::new(1.5, 2.5, 8.0, 1_000);
        assert_eq!(fix.point(), GpsPoint::new(1.5, 2.5));
    }
}
