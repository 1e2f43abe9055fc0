//! # GPS Tracker
//!
//! Controller around a [`RunTrack`]. It opens and cancels the location watch
//! and the display timer as the run moves through its lifecycle, routes
//! incoming [`TrackerEvent`]s into the track, and turns a stopped track into
//! a [`RunRecord`] for a [`RunSink`].
//!
//! ```text
//!   idle --start--> tracking --pause--> paused
//!                     ^  |                 |
//!                     |  +-----resume------+
//!                     |        |
//!                   stop     stop
//!                     v        v
//!                    stopped --save/discard--> idle
//! ```
//!
//! Every subscription is cancelled on pause and stop, and again when the
//! tracker is dropped.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::{Result, RunSquadError};
use crate::format::DisplayReadout;
use crate::records::{RunRecord, RunSink, SavedRun};
use crate::source::{
    Clock, EventSink, LocationSource, StampedEvent, Subscription, Ticker, TrackerEvent,
};
use crate::track::{FixOutcome, RunMetrics, RunTrack, TrackState, TrackSummary};

/// Callback invoked after a confirmed discard.
pub type CancelCallback = Box<dyn FnMut() + Send>;

/// Everything a UI needs to render the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub state: TrackState,
    /// `Tracking...` or `Paused` while a run is live
    pub status: Option<String>,
    pub points_recorded: usize,
    pub metrics: RunMetrics,
    pub readout: DisplayReadout,
    pub error: Option<String>,
    pub notes: String,
    /// Whether the save/discard panel applies
    pub can_save: bool,
}

/// The GPS run tracker.
pub struct GpsTracker<S, T, C> {
    config: TrackerConfig,
    track: RunTrack,
    source: S,
    ticker: T,
    clock: C,
    sink: EventSink,

    location_sub: Option<Box<dyn Subscription>>,
    timer_sub: Option<Box<dyn Subscription>>,
    /// Bumped on every cancel; events stamped with an older epoch are stale
    epoch: u64,

    last_error: Option<RunSquadError>,
    notes: String,
    on_cancel: Option<CancelCallback>,
}

impl<S, T, C> GpsTracker<S, T, C>
where
    S: LocationSource,
    T: Ticker,
    C: Clock,
{
    /// Create an idle tracker. Producers will send into `sink`.
    ///
    /// Fails with `Config` when the thresholds or the tick interval are
    /// unusable.
    pub fn new(
        config: TrackerConfig,
        source: S,
        ticker: T,
        clock: C,
        sink: EventSink,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            track: RunTrack::new(&config),
            config,
            source,
            ticker,
            clock,
            sink,
            location_sub: None,
            timer_sub: None,
            epoch: 0,
            last_error: None,
            notes: String::new(),
            on_cancel: None,
        })
    }

    /// Register the callback run after a confirmed discard.
    pub fn on_cancel(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn track(&self) -> &RunTrack {
        &self.track
    }

    pub fn state(&self) -> TrackState {
        self.track.state()
    }

    pub fn metrics(&self) -> RunMetrics {
        self.track.metrics()
    }

    pub fn summary(&self) -> TrackSummary {
        self.track.summary()
    }

    pub fn last_error(&self) -> Option<&RunSquadError> {
        self.last_error.as_ref()
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    pub fn is_watching(&self) -> bool {
        self.location_sub.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer_sub.as_ref().is_some_and(|s| s.is_active())
    }

    /// Begin a run: open the location watch and the display timer.
    pub fn start(&mut self) -> Result<()> {
        if self.track.state() != TrackState::Idle {
            return Err(RunSquadError::InvalidTransition {
                from: self.track.state(),
                action: "start",
            });
        }
        if !self.source.is_available() {
            return Err(self.record_error(RunSquadError::CapabilityUnavailable));
        }

        self.open_watch()?;
        self.track.begin(self.clock.now_ms())?;
        self.start_timer();
        self.last_error = None;

        info!("[GpsTracker] Tracking started");
        Ok(())
    }

    /// Halt sampling and the timer, keeping everything recorded.
    pub fn pause(&mut self) -> Result<()> {
        self.track.pause(self.clock.now_ms())?;
        self.cancel_subscriptions();
        info!(
            "[GpsTracker] Paused at {:.3} km, {:.0} s",
            self.track.distance_km(),
            self.track.elapsed_seconds()
        );
        Ok(())
    }

    /// Reopen the watch; the paused interval does not count as elapsed time.
    pub fn resume(&mut self) -> Result<()> {
        if self.track.state() != TrackState::Paused {
            return Err(RunSquadError::InvalidTransition {
                from: self.track.state(),
                action: "resume",
            });
        }

        self.open_watch()?;
        self.track.resume(self.clock.now_ms())?;
        self.start_timer();
        self.last_error = None;

        info!("[GpsTracker] Tracking resumed");
        Ok(())
    }

    /// Stop for good; the run can now be saved or discarded.
    pub fn stop(&mut self) -> Result<()> {
        self.track.stop(self.clock.now_ms())?;
        self.cancel_subscriptions();
        info!(
            "[GpsTracker] Stopped: {:.3} km in {:.0} s ({} points)",
            self.track.distance_km(),
            self.track.elapsed_seconds(),
            self.track.samples().len()
        );
        Ok(())
    }

    /// Route one event from a producer.
    ///
    /// Location errors are recorded for display and returned; tracking
    /// continues regardless.
    pub fn handle_event(&mut self, stamped: StampedEvent) -> Result<Option<FixOutcome>> {
        let StampedEvent { epoch, event } = stamped;
        if epoch != self.epoch {
            debug!("[GpsTracker] Dropping {:?} from a cancelled subscription", event);
            return Ok(match event {
                TrackerEvent::Fix(_) => Some(FixOutcome::Ignored),
                _ => None,
            });
        }

        match event {
            TrackerEvent::Fix(fix) => Ok(Some(self.track.record_fix(fix))),
            TrackerEvent::Tick => {
                self.track.tick(self.clock.now_ms());
                Ok(None)
            }
            TrackerEvent::LocationError(err) => {
                if self.track.state() != TrackState::Tracking {
                    debug!("[GpsTracker] Ignoring {:?} while {}", err, self.track.state());
                    return Ok(None);
                }
                warn!("[GpsTracker] Geolocation error: {:?}", err);
                Err(self.record_error(err.into()))
            }
        }
    }

    /// The record that [`GpsTracker::save`] would submit right now.
    pub fn pending_record(&self, notes: Option<String>) -> RunRecord {
        RunRecord::new(
            self.track.distance_km(),
            self.track.duration_minutes(),
            notes,
            self.clock.now_utc(),
        )
    }

    /// Submit the stopped run and reset.
    ///
    /// Fails with `DistanceTooShort` below the configured minimum, in any
    /// state and without touching anything. A rejected submission keeps the
    /// run (and the notes) so the user can retry.
    pub async fn save<R>(&mut self, notes: Option<String>, sink: &R) -> Result<SavedRun>
    where
        R: RunSink + ?Sized,
    {
        let distance_km = self.track.distance_km();
        if distance_km < self.config.min_save_distance_km {
            return Err(RunSquadError::DistanceTooShort {
                distance_km,
                minimum_km: self.config.min_save_distance_km,
            });
        }
        if self.track.state() != TrackState::Stopped {
            return Err(RunSquadError::InvalidTransition {
                from: self.track.state(),
                action: "save",
            });
        }

        if let Some(notes) = notes {
            self.notes = notes;
        }
        let record = self.pending_record(Some(self.notes.clone()));

        match sink.submit(record).await {
            Ok(saved) => {
                info!(
                    "[GpsTracker] Run saved: {:.2} km in {:.1} min",
                    saved.distance_km, saved.duration_minutes
                );
                self.reset();
                Ok(saved)
            }
            Err(err) => {
                warn!("[GpsTracker] Run submission failed: {}", err);
                Err(self.record_error(submission_failure(err)))
            }
        }
    }

    /// Throw the run away after `confirm` agrees. Works in any state.
    ///
    /// Returns whether the run was discarded.
    pub fn discard(&mut self, confirm: impl FnOnce() -> bool) -> bool {
        if !confirm() {
            return false;
        }
        self.reset();
        if let Some(callback) = self.on_cancel.as_mut() {
            callback();
        }
        info!("[GpsTracker] Run discarded");
        true
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.track.state();
        let metrics = self.track.metrics();
        let status = match state {
            TrackState::Tracking => Some("Tracking...".to_string()),
            TrackState::Paused => Some("Paused".to_string()),
            _ => None,
        };

        TrackerSnapshot {
            state,
            status,
            points_recorded: self.track.samples().len(),
            readout: DisplayReadout::from(&metrics),
            metrics,
            error: self.last_error.as_ref().map(RunSquadError::user_message),
            notes: self.notes.clone(),
            can_save: state == TrackState::Stopped && self.track.distance_km() > 0.0,
        }
    }

    fn open_watch(&mut self) -> Result<()> {
        if let Some(mut old) = self.location_sub.take() {
            old.cancel();
        }
        let sink = self.sink.with_epoch(self.epoch);
        match self.source.subscribe(&self.config.watch, sink) {
            Ok(sub) => {
                self.location_sub = Some(sub);
                Ok(())
            }
            Err(err) => Err(self.record_error(err)),
        }
    }

    fn start_timer(&mut self) {
        if let Some(mut old) = self.timer_sub.take() {
            old.cancel();
        }
        let period = self.config.tick_interval();
        let sink = self.sink.with_epoch(self.epoch);
        self.timer_sub = Some(self.ticker.start(period, sink));
    }

    fn cancel_subscriptions(&mut self) {
        if let Some(mut sub) = self.location_sub.take() {
            sub.cancel();
        }
        if let Some(mut sub) = self.timer_sub.take() {
            sub.cancel();
        }
        self.epoch += 1;
    }

    fn reset(&mut self) {
        self.cancel_subscriptions();
        self.track.reset();
        self.notes.clear();
        self.last_error = None;
    }

    fn record_error(&mut self, err: RunSquadError) -> RunSquadError {
        self.last_error = Some(err.clone());
        err
    }
}

impl<S, T, C> Drop for GpsTracker<S, T, C> {
    fn drop(&mut self) {
        if let Some(sub) = self.location_sub.as_mut() {
            sub.cancel();
        }
        if let Some(sub) = self.timer_sub.as_mut() {
            sub.cancel();
        }
    }
}

/// Keep the server's message when there is one.
fn submission_failure(err: RunSquadError) -> RunSquadError {
    let message = match err {
        RunSquadError::SubmissionFailed { message } => message,
        RunSquadError::Http {
            message,
            status_code: Some(_),
        } => message,
        _ => String::new(),
    };
    RunSquadError::SubmissionFailed { message }
}
