//! Run records exchanged with the run API.
//!
//! [`RunRecord`] is the payload a finished track turns into. Whoever
//! persists it implements [`RunSink`]; the HTTP client does, and so does any
//! `Fn(RunRecord) -> impl Future<Output = Result<SavedRun>>` closure.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::Result;

/// Payload for `POST /runs/track`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub distance_km: f64,
    pub duration_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(serialize_with = "serialize_iso_millis")]
    pub date: DateTime<Utc>,
}

impl RunRecord {
    /// Build a record; blank notes are dropped.
    pub fn new(
        distance_km: f64,
        duration_minutes: f64,
        notes: Option<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            distance_km,
            duration_minutes,
            notes: notes.filter(|n| !n.trim().is_empty()),
            date,
        }
    }

    /// Average speed as the backend computes it.
    pub fn speed_kmh(&self) -> f64 {
        if self.duration_minutes > 0.0 {
            self.distance_km / self.duration_minutes * 60.0
        } else {
            0.0
        }
    }
}

/// `2024-01-15T08:30:00.000Z`, the shape browsers produce.
fn serialize_iso_millis<S: Serializer>(
    date: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Run as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRun {
    pub id: i64,
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub speed_kmh: f64,
    pub date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Aggregate figures over a runner's history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressStatistics {
    pub total_runs: usize,
    pub total_distance_km: f64,
    pub total_duration_minutes: f64,
    pub average_speed_kmh: f64,
}

impl ProgressStatistics {
    /// Totals rounded to two decimals; average speed is total distance over
    /// total duration.
    pub fn from_runs(runs: &[SavedRun]) -> Self {
        let total_distance: f64 = runs.iter().map(|r| r.distance_km).sum();
        let total_duration: f64 = runs.iter().map(|r| r.duration_minutes).sum();
        let average_speed = if total_duration > 0.0 {
            total_distance / total_duration * 60.0
        } else {
            0.0
        };

        Self {
            total_runs: runs.len(),
            total_distance_km: round2(total_distance),
            total_duration_minutes: round2(total_duration),
            average_speed_kmh: round2(average_speed),
        }
    }
}

/// Response of `GET /runs/my-progress`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub runs: Vec<SavedRun>,
    pub statistics: ProgressStatistics,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Destination for finished runs.
pub trait RunSink: Send + Sync {
    fn submit(&self, record: RunRecord) -> BoxFuture<'_, Result<SavedRun>>;
}

impl<F, Fut> RunSink for F
where
    F: Fn(RunRecord) -> Fut + Send + Sync,
    Fut: Future<Output = Result<SavedRun>> + Send + 'static,
{
    fn submit(&self, record: RunRecord) -> BoxFuture<'_, Result<SavedRun>> {
        Box::pin(self(record))
    }
}
