//! # Event Sources
//!
//! Location fixes and timer ticks reach the tracker as [`TrackerEvent`]s on a
//! single unbounded channel. Each producer is opened through a trait and
//! handed the channel's sender; what comes back is a [`Subscription`] that
//! the tracker cancels when it pauses, stops or is dropped.
//!
//! Provided producers:
//! - [`FeedSource`] / [`FeedTicker`]: driven by the host through a cloneable
//!   [`Feed`]. Platform geolocation callbacks push into the feed; tests do
//!   the same by hand.
//! - [`IntervalTicker`]: a tokio interval task, the real 1 s display timer.
//!
//! Time comes from a [`Clock`] so tests can control it.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::WatchOptions;
use crate::error::{Result, RunSquadError};
use crate::Fix;

/// Reasons a location watch reports instead of a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    PermissionDenied = 1,
    PositionUnavailable = 2,
    Timeout = 3,
}

impl LocationError {
    /// Map the numeric codes used by geolocation APIs.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::PermissionDenied),
            2 => Some(Self::PositionUnavailable),
            3 => Some(Self::Timeout),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

impl From<LocationError> for RunSquadError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => RunSquadError::PermissionDenied,
            LocationError::PositionUnavailable => RunSquadError::SignalUnavailable,
            LocationError::Timeout => RunSquadError::SignalTimeout,
        }
    }
}

/// Everything the tracker reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Fix(Fix),
    LocationError(LocationError),
    Tick,
}

/// An event tagged with the epoch of the subscription that produced it.
///
/// The tracker bumps its epoch whenever it cancels its subscriptions, so
/// events still queued from a cancelled watch can be told apart from fresh
/// ones after a resume.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedEvent {
    pub epoch: u64,
    pub event: TrackerEvent,
}

/// Sending half handed to producers. Everything sent carries the sink's epoch.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StampedEvent>,
    epoch: u64,
}

impl EventSink {
    pub fn send(
        &self,
        event: TrackerEvent,
    ) -> std::result::Result<(), mpsc::error::SendError<StampedEvent>> {
        self.tx.send(StampedEvent {
            epoch: self.epoch,
            event,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Same channel, stamping with `epoch`.
    pub fn with_epoch(&self, epoch: u64) -> Self {
        Self {
            tx: self.tx.clone(),
            epoch,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub type EventStream = mpsc::UnboundedReceiver<StampedEvent>;

/// Channel shared by all producers feeding one tracker. The sink starts at
/// epoch 0.
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx, epoch: 0 }, rx)
}

/// Handle to an open producer. Cancelling twice is harmless.
pub trait Subscription: Send {
    fn cancel(&mut self);
    fn is_active(&self) -> bool;
}

/// Continuous location watching.
pub trait LocationSource {
    /// Whether the device has any location capability at all.
    fn is_available(&self) -> bool {
        true
    }

    fn subscribe(&mut self, options: &WatchOptions, sink: EventSink)
        -> Result<Box<dyn Subscription>>;
}

/// Periodic tick producer.
pub trait Ticker {
    fn start(&mut self, period: Duration, sink: EventSink) -> Box<dyn Subscription>;
}

/// Wall-clock source.
pub trait Clock {
    fn now_ms(&self) -> i64;

    fn now_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Clock on tokio's timer, so paused test runtimes control it.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    origin_ms: i64,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            origin_ms: Utc::now().timestamp_millis(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        self.origin_ms + self.origin.elapsed().as_millis() as i64
    }
}

// ============================================================================
// Feed-driven producers
// ============================================================================

#[derive(Debug, Default)]
struct FeedInner {
    /// Open sink tagged with the generation of the subscription owning it
    sink: Mutex<Option<(usize, EventSink)>>,
    subscriptions: AtomicUsize,
}

/// Host-side handle that pushes events into whichever subscription is open.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    inner: Arc<FeedInner>,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event. Returns `false` when nothing is subscribed.
    pub fn push(&self, event: TrackerEvent) -> bool {
        let guard = match self.inner.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some((_, sink)) => sink.send(event).is_ok(),
            None => false,
        }
    }

    pub fn push_fix(&self, fix: Fix) -> bool {
        self.push(TrackerEvent::Fix(fix))
    }

    pub fn push_error(&self, error: LocationError) -> bool {
        self.push(TrackerEvent::LocationError(error))
    }

    pub fn tick(&self) -> bool {
        self.push(TrackerEvent::Tick)
    }

    /// Whether a subscription is currently open.
    pub fn is_subscribed(&self) -> bool {
        self.inner
            .sink
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Number of subscriptions opened so far.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.load(Ordering::SeqCst)
    }

    fn open(&self, sink: EventSink) -> FeedSubscription {
        let generation = self.inner.subscriptions.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut guard) = self.inner.sink.lock() {
            *guard = Some((generation, sink));
        }
        FeedSubscription {
            feed: self.clone(),
            generation,
            active: true,
        }
    }

    fn close(&self, generation: usize) {
        if let Ok(mut guard) = self.inner.sink.lock() {
            // A newer subscription may already own the feed
            if matches!(guard.as_ref(), Some((open, _)) if *open == generation) {
                *guard = None;
            }
        }
    }
}

/// Subscription whose cancel detaches the feed.
#[derive(Debug)]
pub struct FeedSubscription {
    feed: Feed,
    generation: usize,
    active: bool,
}

impl Subscription for FeedSubscription {
    fn cancel(&mut self) {
        if self.active {
            self.active = false;
            self.feed.close(self.generation);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Location source backed by a [`Feed`].
#[derive(Debug, Clone)]
pub struct FeedSource {
    feed: Feed,
    available: bool,
    /// Watch options of the most recent subscription
    last_options: Option<WatchOptions>,
}

impl FeedSource {
    pub fn new(feed: Feed) -> Self {
        Self {
            feed,
            available: true,
            last_options: None,
        }
    }

    /// A source for a device without location capability.
    pub fn unavailable(feed: Feed) -> Self {
        Self {
            available: false,
            ..Self::new(feed)
        }
    }

    pub fn last_options(&self) -> Option<&WatchOptions> {
        self.last_options.as_ref()
    }
}

impl LocationSource for FeedSource {
    fn is_available(&self) -> bool {
        self.available
    }

    fn subscribe(
        &mut self,
        options: &WatchOptions,
        sink: EventSink,
    ) -> Result<Box<dyn Subscription>> {
        if !self.available {
            return Err(RunSquadError::CapabilityUnavailable);
        }
        self.last_options = Some(*options);
        debug!(
            "[FeedSource] Watch opened (high accuracy: {}, timeout: {} ms)",
            options.enable_high_accuracy, options.timeout_ms
        );
        Ok(Box::new(self.feed.open(sink)))
    }
}

/// Ticker backed by a [`Feed`]; ticks arrive only when the host sends them.
#[derive(Debug, Clone)]
pub struct FeedTicker {
    feed: Feed,
}

impl FeedTicker {
    pub fn new(feed: Feed) -> Self {
        Self { feed }
    }
}

impl Ticker for FeedTicker {
    fn start(&mut self, _period: Duration, sink: EventSink) -> Box<dyn Subscription> {
        Box::new(self.feed.open(sink))
    }
}

// ============================================================================
// Tokio interval ticker
// ============================================================================

/// Ticker that spawns a tokio interval task. Must be started inside a runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalTicker;

impl Ticker for IntervalTicker {
    fn start(&mut self, period: Duration, sink: EventSink) -> Box<dyn Subscription> {
        let active = Arc::new(AtomicBool::new(true));
        let task_active = Arc::clone(&active);

        // interval_at panics on a zero period
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let first = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !task_active.load(Ordering::SeqCst) || sink.send(TrackerEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Box::new(TaskSubscription { handle, active })
    }
}

/// Subscription owning a spawned task.
#[derive(Debug)]
pub struct TaskSubscription {
    handle: JoinHandle<()>,
    active: Arc<AtomicBool>,
}

impl Subscription for TaskSubscription {
    fn cancel(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.handle.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

impl Drop for TaskSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
