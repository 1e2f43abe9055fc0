//! Event loop for a [`GpsTracker`].
//!
//! Location fixes, timer ticks and user commands are handled one at a time
//! on a single task, so the tracker never needs a lock. After every step the
//! latest [`TrackerSnapshot`] is published on a `watch` channel for the UI.

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::Result;
use crate::records::{RunSink, SavedRun};
use crate::source::{Clock, EventStream, LocationSource, Ticker};
use crate::track::FixOutcome;
use crate::tracker::{GpsTracker, TrackerSnapshot};

/// User actions sent to a running driver.
#[derive(Debug)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    SetNotes(String),
    Save {
        notes: Option<String>,
        reply: Option<oneshot::Sender<Result<SavedRun>>>,
    },
    /// Discard; `confirmed` carries the user's answer to the prompt
    Discard { confirmed: bool },
    Shutdown,
}

/// Owns a tracker and the receiving end of its event channel.
pub struct TrackerDriver<S, T, C> {
    tracker: GpsTracker<S, T, C>,
    events: EventStream,
    snapshots: watch::Sender<TrackerSnapshot>,
}

impl<S, T, C> TrackerDriver<S, T, C>
where
    S: LocationSource,
    T: Ticker,
    C: Clock,
{
    /// `events` must be the receiver paired with the tracker's sink.
    pub fn new(
        tracker: GpsTracker<S, T, C>,
        events: EventStream,
    ) -> (Self, watch::Receiver<TrackerSnapshot>) {
        let (snapshots, rx) = watch::channel(tracker.snapshot());
        (
            Self {
                tracker,
                events,
                snapshots,
            },
            rx,
        )
    }

    pub fn tracker(&self) -> &GpsTracker<S, T, C> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut GpsTracker<S, T, C> {
        &mut self.tracker
    }

    pub fn into_tracker(self) -> GpsTracker<S, T, C> {
        self.tracker
    }

    /// Handle every event already queued, without waiting. Returns the count.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            let _ = self.tracker.handle_event(event);
            handled += 1;
        }
        if handled > 0 {
            self.publish();
        }
        handled
    }

    /// Wait for the next event and handle it.
    pub async fn next_event(&mut self) -> Option<Result<Option<FixOutcome>>> {
        let event = self.events.recv().await?;
        let outcome = self.tracker.handle_event(event);
        self.publish();
        Some(outcome)
    }

    /// Run until `Shutdown` or until every command sender is gone.
    ///
    /// Returns the tracker so the caller can inspect it; dropping it cancels
    /// any open subscription.
    pub async fn run<R>(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        sink: &R,
    ) -> GpsTracker<S, T, C>
    where
        R: RunSink + ?Sized,
    {
        info!("[TrackerDriver] Event loop started");
        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    let _ = self.tracker.handle_event(event);
                }
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.apply(command, sink).await,
                    }
                }
            }
            self.publish();
        }
        info!("[TrackerDriver] Event loop finished");
        self.tracker
    }

    async fn apply<R>(&mut self, command: Command, sink: &R)
    where
        R: RunSink + ?Sized,
    {
        debug!("[TrackerDriver] Command {:?}", command);
        let result = match command {
            Command::Start => self.tracker.start(),
            Command::Pause => self.tracker.pause(),
            Command::Resume => self.tracker.resume(),
            Command::Stop => self.tracker.stop(),
            Command::SetNotes(notes) => {
                self.tracker.set_notes(notes);
                Ok(())
            }
            Command::Save { notes, reply } => {
                let result = self.tracker.save(notes, sink).await;
                let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
                outcome
            }
            Command::Discard { confirmed } => {
                self.tracker.discard(|| confirmed);
                Ok(())
            }
            Command::Shutdown => Ok(()),
        };

        if let Err(err) = result {
            warn!("[TrackerDriver] {}", err);
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.tracker.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::source::{event_channel, Feed, FeedSource, IntervalTicker, TokioClock};
    use crate::track::TrackState;
    use crate::{Fix, RunRecord, RunSquadError};
    use std::time::Duration;

    const FIFTY_M_DEG: f64 = 0.05 / 111.194_926_6;

    async fn accept(record: RunRecord) -> Result<SavedRun> {
        Ok(SavedRun {
            id: 42,
            distance_km: record.distance_km,
            duration_minutes: record.duration_minutes,
            speed_kmh: record.speed_kmh(),
            date: record.date.to_rfc3339(),
            notes: record.notes,
        })
    }

    fn driver(
        gps: &Feed,
    ) -> (
        TrackerDriver<FeedSource, IntervalTicker, TokioClock>,
        watch::Receiver<TrackerSnapshot>,
    ) {
        let (sink, events) = event_channel();
        let tracker = GpsTracker::new(
            TrackerConfig::default(),
            FeedSource::new(gps.clone()),
            IntervalTicker,
            TokioClock::new(),
            sink,
        )
        .unwrap();
        TrackerDriver::new(tracker, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_through_event_loop() {
        let gps = Feed::new();
        let (driver, snapshots) = driver(&gps);
        let (tx, rx) = mpsc::channel(16);

        let script = async {
            tx.send(Command::Start).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            assert!(gps.push_fix(Fix::new(0.0, 0.0, 4.0, 0)));
            assert!(gps.push_fix(Fix::new(0.0, FIFTY_M_DEG, 4.0, 0)));
            assert!(gps.push_fix(Fix::new(0.0, 2.0 * FIFTY_M_DEG, 80.0, 0)));
            tokio::time::sleep(Duration::from_millis(2_000)).await;

            tx.send(Command::Pause).await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            assert!(!gps.is_subscribed());

            tx.send(Command::Resume).await.unwrap();
            tokio::time::sleep(Duration::from_secs(3)).await;
            tx.send(Command::Stop).await.unwrap();

            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(Command::Save {
                notes: Some("parkrun".to_string()),
                reply: Some(reply_tx),
            })
            .await
            .unwrap();
            let saved = reply_rx.await.unwrap().unwrap();
            tx.send(Command::Shutdown).await.unwrap();
            saved
        };

        let (tracker, saved) = tokio::join!(driver.run(rx, &accept), script);

        assert_eq!(saved.id, 42);
        assert!((saved.distance_km - 0.05).abs() < 1e-4);
        // 3.5 s before the pause plus 3 s after it
        assert!((saved.duration_minutes * 60.0 - 6.5).abs() < 0.01);
        assert_eq!(saved.notes.as_deref(), Some("parkrun"));

        assert_eq!(tracker.state(), TrackState::Idle);
        assert!(!tracker.is_timer_running());
        assert_eq!(snapshots.borrow().state, TrackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_update_published_snapshot() {
        let gps = Feed::new();
        let (mut driver, snapshots) = driver(&gps);

        driver.tracker_mut().start().unwrap();
        for _ in 0..3 {
            driver.next_event().await.unwrap().unwrap();
        }
        let snap = snapshots.borrow().clone();
        assert_eq!(snap.readout.time, "00:03");
        assert_eq!(snap.readout.pace, "--:--");
        assert_eq!(snap.status.as_deref(), Some("Tracking..."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_and_location_error() {
        let gps = Feed::new();
        let (mut driver, snapshots) = driver(&gps);
        assert_eq!(driver.pump(), 0);

        driver.tracker_mut().start().unwrap();
        gps.push_error(crate::source::LocationError::PositionUnavailable);
        assert_eq!(driver.pump(), 1);
        assert_eq!(
            driver.tracker().last_error(),
            Some(&RunSquadError::SignalUnavailable)
        );
        assert_eq!(
            snapshots.borrow().error.as_deref(),
            Some("Location unavailable. Check your GPS signal.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_command_channel_ends_loop() {
        let gps = Feed::new();
        let (driver, _snapshots) = driver(&gps);
        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::Start).await.unwrap();
        drop(tx);

        let tracker = driver.run(rx, &accept).await;
        assert_eq!(tracker.state(), TrackState::Tracking);
        drop(tracker);
        assert!(!gps.is_subscribed());
    }
}
