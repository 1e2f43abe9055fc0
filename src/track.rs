//! # Run Track
//!
//! The in-progress run as a plain state machine. It owns the accepted
//! samples, the running distance and the pause-aware clock, and knows
//! nothing about where fixes or timer ticks come from. Callers pass the
//! current time in milliseconds to every time-dependent transition.
//!
//! ## Sample acceptance
//!
//! 1. Fixes with non-finite or out-of-range coordinates, or an accuracy
//!    radius above `max_accuracy_m`, are dropped and never become the
//!    baseline.
//! 2. The Haversine distance to the baseline (last accepted fix) is computed.
//! 3. A distance at or above `jump_threshold_km` is a GPS jump: nothing is
//!    added, but the baseline still moves to the new fix.
//! 4. Otherwise the distance is added and the baseline moves.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::{Result, RunSquadError};
use crate::geo_utils::{compute_bounds, haversine_km};
use crate::{Bounds, Fix, GpsPoint};

/// Lifecycle of a run track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Idle,
    Tracking,
    Paused,
    /// Stopped and not yet saved or discarded
    Stopped,
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackState::Idle => "idle",
            TrackState::Tracking => "tracking",
            TrackState::Paused => "paused",
            TrackState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What happened to a fix handed to [`RunTrack::record_fix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixOutcome {
    /// Not tracking; the fix was dropped
    Ignored,
    /// Coordinates not a real position; the fix was dropped
    InvalidPoint,
    /// Accuracy radius too large; the fix was dropped
    LowAccuracy { accuracy_m: f64 },
    /// First accepted fix; it becomes the baseline
    First,
    /// Distance added to the total
    Accumulated { distance_km: f64 },
    /// Displacement too large; baseline moved, nothing added
    Jump { distance_km: f64 },
}

impl FixOutcome {
    /// Whether the fix was appended to the samples.
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            FixOutcome::First | FixOutcome::Accumulated { .. } | FixOutcome::Jump { .. }
        )
    }
}

/// Readout derived from distance and elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub distance_km: f64,
    pub elapsed_seconds: f64,
    /// `None` until both distance and elapsed time are positive
    pub pace_min_per_km: Option<f64>,
    pub speed_kmh: Option<f64>,
}

impl RunMetrics {
    pub fn compute(distance_km: f64, elapsed_seconds: f64) -> Self {
        let valid = distance_km > 0.0 && elapsed_seconds > 0.0;
        let pace = (elapsed_seconds / 60.0) / distance_km;
        let speed = (distance_km / elapsed_seconds) * 3600.0;
        Self {
            distance_km,
            elapsed_seconds,
            pace_min_per_km: (valid && pace.is_finite()).then_some(pace),
            speed_kmh: (valid && speed.is_finite()).then_some(speed),
        }
    }
}

/// Overview of the accepted samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub point_count: usize,
    pub distance_km: f64,
    pub elapsed_seconds: f64,
    pub bounds: Option<Bounds>,
}

/// In-progress run state.
#[derive(Debug, Clone)]
pub struct RunTrack {
    state: TrackState,
    samples: Vec<Fix>,
    distance_km: f64,
    baseline: Option<Fix>,

    // Clock: elapsed = now - start_ms while tracking
    start_ms: i64,
    paused_elapsed_ms: i64,
    elapsed_seconds: f64,

    max_accuracy_m: f64,
    jump_threshold_km: f64,
}

impl RunTrack {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            state: TrackState::Idle,
            samples: Vec::new(),
            distance_km: 0.0,
            baseline: None,
            start_ms: 0,
            paused_elapsed_ms: 0,
            elapsed_seconds: 0.0,
            max_accuracy_m: config.max_accuracy_m,
            jump_threshold_km: config.jump_threshold_km,
        }
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn samples(&self) -> &[Fix] {
        &self.samples
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn duration_minutes(&self) -> f64 {
        self.elapsed_seconds / 60.0
    }

    /// Last accepted fix, the reference for the next distance.
    pub fn baseline(&self) -> Option<&Fix> {
        self.baseline.as_ref()
    }

    pub fn metrics(&self) -> RunMetrics {
        RunMetrics::compute(self.distance_km, self.elapsed_seconds)
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            point_count: self.samples.len(),
            distance_km: self.distance_km,
            elapsed_seconds: self.elapsed_seconds,
            bounds: compute_bounds(&self.points()),
        }
    }

    /// Accepted samples as plain coordinates.
    pub fn points(&self) -> Vec<GpsPoint> {
        self.samples.iter().map(Fix::point).collect()
    }

    /// Idle -> tracking. The paused-time baseline starts at zero.
    pub fn begin(&mut self, now_ms: i64) -> Result<()> {
        self.expect_state(&[TrackState::Idle], "start")?;
        self.paused_elapsed_ms = 0;
        self.start_ms = now_ms;
        self.elapsed_seconds = 0.0;
        self.state = TrackState::Tracking;
        Ok(())
    }

    /// Apply the acceptance filters to a fix.
    pub fn record_fix(&mut self, fix: Fix) -> FixOutcome {
        if self.state != TrackState::Tracking {
            return FixOutcome::Ignored;
        }

        if !fix.point().is_valid() {
            warn!(
                "[RunTrack] Invalid coordinates ({}, {}), fix dropped",
                fix.latitude, fix.longitude
            );
            return FixOutcome::InvalidPoint;
        }

        // Written negated so a NaN accuracy is rejected too
        #[allow(clippy::neg_cmp_op_on_partial_ord)]
        if !(fix.accuracy_m <= self.max_accuracy_m) {
            warn!(
                "[RunTrack] GPS accuracy low: {:.1} meters, fix dropped",
                fix.accuracy_m
            );
            return FixOutcome::LowAccuracy {
                accuracy_m: fix.accuracy_m,
            };
        }

        self.samples.push(fix);

        let outcome = match self.baseline {
            None => FixOutcome::First,
            Some(ref last) => {
                let distance_km = haversine_km(&last.point(), &fix.point());
                if distance_km < self.jump_threshold_km {
                    self.distance_km += distance_km;
                    FixOutcome::Accumulated { distance_km }
                } else {
                    debug!(
                        "[RunTrack] GPS jump of {:.0} m skipped",
                        distance_km * 1000.0
                    );
                    FixOutcome::Jump { distance_km }
                }
            }
        };

        // The baseline follows every accepted fix, jumps included.
        self.baseline = Some(fix);
        outcome
    }

    /// Advance the elapsed time. No-op unless tracking.
    pub fn tick(&mut self, now_ms: i64) {
        if self.state == TrackState::Tracking {
            self.elapsed_seconds = (now_ms - self.start_ms).max(0) as f64 / 1000.0;
        }
    }

    pub fn pause(&mut self, now_ms: i64) -> Result<()> {
        self.expect_state(&[TrackState::Tracking], "pause")?;
        self.tick(now_ms);
        self.paused_elapsed_ms = (now_ms - self.start_ms).max(0);
        self.state = TrackState::Paused;
        Ok(())
    }

    /// Paused -> tracking, shifting the start so the pause is not counted.
    pub fn resume(&mut self, now_ms: i64) -> Result<()> {
        self.expect_state(&[TrackState::Paused], "resume")?;
        self.start_ms = now_ms - self.paused_elapsed_ms;
        self.state = TrackState::Tracking;
        Ok(())
    }

    /// Freeze the track. Elapsed time stops at its current value.
    pub fn stop(&mut self, now_ms: i64) -> Result<()> {
        self.expect_state(&[TrackState::Tracking, TrackState::Paused], "stop")?;
        self.tick(now_ms);
        self.state = TrackState::Stopped;
        Ok(())
    }

    /// Drop everything and return to idle.
    pub fn reset(&mut self) {
        self.state = TrackState::Idle;
        self.samples.clear();
        self.distance_km = 0.0;
        self.baseline = None;
        self.start_ms = 0;
        self.paused_elapsed_ms = 0;
        self.elapsed_seconds = 0.0;
    }

    fn expect_state(&self, allowed: &[TrackState], action: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RunSquadError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ~0.000449 deg of longitude on the equator is 50 m.
    const FIFTY_M_DEG: f64 = 0.05 / 111.194_926_6;

    fn fix(lon: f64, t: i64) -> Fix {
        Fix::new(0.0, lon, 5.0, t)
    }

    fn tracking() -> RunTrack {
        let mut track = RunTrack::new(&TrackerConfig::default());
        track.begin(0).unwrap();
        track
    }

    #[test]
    fn test_first_fix_sets_baseline() {
        let mut track = tracking();
        assert_eq!(track.record_fix(fix(0.0, 0)), FixOutcome::First);
        assert_eq!(track.distance_km(), 0.0);
        assert_eq!(track.baseline().unwrap().longitude, 0.0);
        assert_eq!(track.samples().len(), 1);
    }

    #[test]
    fn test_accumulates_haversine_between_fixes() {
        let mut track = tracking();
        track.record_fix(fix(0.0, 0));
        track.record_fix(fix(FIFTY_M_DEG, 1000));
        track.record_fix(fix(2.0 * FIFTY_M_DEG, 2000));

        let expected = haversine_km(&GpsPoint::new(0.0, 0.0), &GpsPoint::new(0.0, FIFTY_M_DEG))
            + haversine_km(
                &GpsPoint::new(0.0, FIFTY_M_DEG),
                &GpsPoint::new(0.0, 2.0 * FIFTY_M_DEG),
            );
        assert!((track.distance_km() - expected).abs() < 1e-12);
        assert!((track.distance_km() - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_low_accuracy_never_touches_distance_or_baseline() {
        let mut track = tracking();
        track.record_fix(fix(0.0, 0));

        let noisy = Fix::new(0.0, FIFTY_M_DEG, 50.5, 1000);
        assert_eq!(
            track.record_fix(noisy),
            FixOutcome::LowAccuracy { accuracy_m: 50.5 }
        );
        assert_eq!(track.distance_km(), 0.0);
        assert_eq!(track.baseline().unwrap().longitude, 0.0);
        assert_eq!(track.samples().len(), 1);

        // Exactly at the bound is accepted
        let edge = Fix::new(0.0, FIFTY_M_DEG, 50.0, 2000);
        assert!(track.record_fix(edge).is_accepted());
    }

    #[test]
    fn test_nan_accuracy_rejected() {
        let mut track = tracking();
        let outcome = track.record_fix(Fix::new(0.0, 0.0, f64::NAN, 0));
        assert!(matches!(outcome, FixOutcome::LowAccuracy { .. }));
        assert!(track.baseline().is_none());
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        let mut track = tracking();
        track.record_fix(fix(0.0, 0));

        for (lat, lon) in [
            (f64::NAN, 0.0),
            (0.0, f64::INFINITY),
            (90.5, 0.0),
            (0.0, -181.0),
        ] {
            let outcome = track.record_fix(Fix::new(lat, lon, 5.0, 1000));
            assert_eq!(outcome, FixOutcome::InvalidPoint);
            assert!(!outcome.is_accepted());
        }
        assert_eq!(track.samples().len(), 1);
        assert_eq!(track.baseline().unwrap().longitude, 0.0);
        assert!(track.summary().bounds.unwrap().min_lat.is_finite());

        // Ten 50 m steps after the bad fix all count
        for i in 1..=10 {
            let outcome = track.record_fix(fix(i as f64 * FIFTY_M_DEG, 1000 + i));
            assert!(matches!(outcome, FixOutcome::Accumulated { .. }));
        }
        assert!((track.distance_km() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_jump_moves_baseline_without_distance() {
        let mut track = tracking();
        track.record_fix(fix(0.0, 0));

        // 5.56 km jump
        let outcome = track.record_fix(fix(0.05, 1000));
        match outcome {
            FixOutcome::Jump { distance_km } => assert!((distance_km - 5.5597).abs() < 1e-3),
            other => panic!("expected jump, got {:?}", other),
        }
        assert_eq!(track.distance_km(), 0.0);
        assert_eq!(track.baseline().unwrap().longitude, 0.05);
        assert_eq!(track.samples().len(), 2);

        // Next fix measured from the jumped-to point
        track.record_fix(fix(0.05 + FIFTY_M_DEG, 2000));
        assert!((track.distance_km() - 0.05).abs() < 1e-4);
    }

    #[test]
    fn test_jump_threshold_is_exclusive() {
        let mut track = tracking();
        track.record_fix(fix(0.0, 0));
        let outcome = track.record_fix(fix(2.0 * FIFTY_M_DEG + 1e-6, 1000));
        assert!(matches!(outcome, FixOutcome::Jump { .. }));
    }

    #[test]
    fn test_fixes_ignored_unless_tracking() {
        let mut track = RunTrack::new(&TrackerConfig::default());
        assert_eq!(track.record_fix(fix(0.0, 0)), FixOutcome::Ignored);

        track.begin(0).unwrap();
        track.pause(1000).unwrap();
        assert_eq!(track.record_fix(fix(0.0, 1500)), FixOutcome::Ignored);
        assert!(track.samples().is_empty());
    }

    #[test]
    fn test_elapsed_excludes_pause() {
        let mut track = tracking();
        track.tick(10_000);
        assert_eq!(track.elapsed_seconds(), 10.0);

        track.pause(12_000).unwrap();
        assert_eq!(track.elapsed_seconds(), 12.0);

        // Ticks during the pause do not advance time
        track.tick(60_000);
        assert_eq!(track.elapsed_seconds(), 12.0);

        track.resume(100_000).unwrap();
        track.tick(100_000);
        assert_eq!(track.elapsed_seconds(), 12.0);
        track.tick(103_000);
        assert_eq!(track.elapsed_seconds(), 15.0);
    }

    #[test]
    fn test_stop_freezes_elapsed() {
        let mut track = tracking();
        track.stop(30_000).unwrap();
        assert_eq!(track.state(), TrackState::Stopped);
        assert_eq!(track.elapsed_seconds(), 30.0);
        track.tick(90_000);
        assert_eq!(track.elapsed_seconds(), 30.0);
        assert!((track.duration_minutes() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stop_from_paused_keeps_paused_elapsed() {
        let mut track = tracking();
        track.pause(20_000).unwrap();
        track.stop(80_000).unwrap();
        assert_eq!(track.elapsed_seconds(), 20.0);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut track = RunTrack::new(&TrackerConfig::default());
        assert!(matches!(
            track.pause(0),
            Err(RunSquadError::InvalidTransition {
                from: TrackState::Idle,
                action: "pause"
            })
        ));
        assert!(track.resume(0).is_err());
        assert!(track.stop(0).is_err());

        track.begin(0).unwrap();
        assert!(track.begin(0).is_err());
        assert!(track.resume(0).is_err());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut track = tracking();
        track.record_fix(fix(0.0, 0));
        track.record_fix(fix(FIFTY_M_DEG, 1000));
        track.tick(5_000);
        track.stop(5_000).unwrap();

        track.reset();
        assert_eq!(track.state(), TrackState::Idle);
        assert!(track.samples().is_empty());
        assert_eq!(track.distance_km(), 0.0);
        assert_eq!(track.elapsed_seconds(), 0.0);
        assert!(track.baseline().is_none());
    }

    #[test]
    fn test_metrics_zero_guard() {
        let m = RunMetrics::compute(0.0, 120.0);
        assert!(m.pace_min_per_km.is_none());
        assert!(m.speed_kmh.is_none());

        let m = RunMetrics::compute(1.0, 0.0);
        assert!(m.pace_min_per_km.is_none());
        assert!(m.speed_kmh.is_none());

        let m = RunMetrics::compute(2.0, 600.0);
        assert!((m.pace_min_per_km.unwrap() - 5.0).abs() < 1e-12);
        assert!((m.speed_kmh.unwrap() - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_bounds() {
        let mut track = tracking();
        assert!(track.summary().bounds.is_none());
        track.record_fix(fix(0.0, 0));
        track.record_fix(fix(FIFTY_M_DEG, 1000));
        let summary = track.summary();
        assert_eq!(summary.point_count, 2);
        let bounds = summary.bounds.unwrap();
        assert_eq!(bounds.min_lng, 0.0);
        assert_eq!(bounds.max_lng, FIFTY_M_DEG);
    }
}
