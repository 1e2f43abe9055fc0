//! Clubs, scheduled runs, challenges and the club activity feed.
//!
//! Models mirror the API's JSON. Form builders take the `YYYY-MM-DDTHH:mm`
//! values a runner enters and send them to the server as IST.

use serde::{Deserialize, Serialize};

use crate::dates::{convert_ist_to_local, convert_local_to_ist, format_date_ist, parse_iso};
use crate::error::{Result, RunSquadError};

/// A running club as listed by `GET /clubs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub member_count: u32,
    /// Whether the logged-in runner belongs to the club
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Body of `POST /clubs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewClub {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl NewClub {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(RunSquadError::invalid_input("Club name is required"));
        }
        Ok(Self {
            name,
            description: None,
            location: None,
        })
    }
}

/// Who created a scheduled run or challenge. The id is absent when the
/// account no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorRef {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
}

/// A group run on a club's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRun {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO date-time, IST wall time
    pub scheduled_date: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub created_by: Option<CreatorRef>,
    #[serde(default)]
    pub participant_count: u32,
}

impl ScheduledRun {
    /// `DD/MM/YYYY, HH:mm` in IST.
    pub fn display_date(&self) -> String {
        format_date_ist(&self.scheduled_date)
    }

    /// The date as a form input value.
    pub fn input_value(&self) -> String {
        convert_ist_to_local(&self.scheduled_date)
    }
}

/// Body of `POST /runs/schedule`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewScheduledRun {
    pub club_id: i64,
    pub title: String,
    pub scheduled_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl NewScheduledRun {
    /// Build from form values; `date_time_local` is read as IST.
    pub fn from_form(
        club_id: i64,
        title: &str,
        date_time_local: &str,
        description: Option<String>,
        location: Option<String>,
    ) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RunSquadError::invalid_input("Title is required"));
        }
        let scheduled_date = ist_input(date_time_local, "scheduled date")?;
        Ok(Self {
            club_id,
            title: title.to_string(),
            scheduled_date,
            description: non_empty(description),
            location: non_empty(location),
        })
    }
}

/// What a challenge measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    /// Kilometres within each week
    WeeklyMileage,
    /// Best 5 km time, minutes
    #[serde(rename = "fastest_5k")]
    Fastest5k,
    /// Kilometres over the whole challenge
    TotalDistance,
    /// Minutes over the whole challenge
    TotalTime,
}

impl ChallengeType {
    /// Unit of the goal value.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::WeeklyMileage | Self::TotalDistance => "km",
            Self::Fastest5k | Self::TotalTime => "min",
        }
    }
}

/// A club challenge with the logged-in runner's standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub challenge_type: ChallengeType,
    pub goal_value: f64,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub participant_count: u32,
    #[serde(default)]
    pub is_participating: bool,
    #[serde(default)]
    pub user_progress: f64,
    #[serde(default)]
    pub created_by: Option<CreatorRef>,
}

impl Challenge {
    /// Progress towards the goal, 0-100.
    pub fn progress_percentage(&self) -> f64 {
        if self.goal_value <= 0.0 {
            return 0.0;
        }
        (self.user_progress / self.goal_value * 100.0).clamp(0.0, 100.0)
    }
}

/// Body of `POST /challenges/club/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewChallenge {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub challenge_type: ChallengeType,
    pub goal_value: f64,
    pub start_date: String,
    pub end_date: String,
}

impl NewChallenge {
    /// Build from form values. Both dates are read as IST and the end must
    /// fall after the start.
    pub fn from_form(
        title: &str,
        description: Option<String>,
        challenge_type: ChallengeType,
        goal_value: f64,
        start_local: &str,
        end_local: &str,
    ) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RunSquadError::invalid_input("Title is required"));
        }
        if !(goal_value.is_finite() && goal_value > 0.0) {
            return Err(RunSquadError::invalid_input("Goal must be greater than zero"));
        }
        let start_date = ist_input(start_local, "start date")?;
        let end_date = ist_input(end_local, "end date")?;
        match (parse_iso(&start_date), parse_iso(&end_date)) {
            (Some(start), Some(end)) if end > start => {}
            _ => {
                return Err(RunSquadError::invalid_input(
                    "End date must be after start date",
                ))
            }
        }
        Ok(Self {
            title: title.to_string(),
            description: non_empty(description),
            challenge_type,
            goal_value,
            start_date,
            end_date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: i64,
    pub user_name: String,
    pub progress_value: f64,
    pub progress_percentage: f64,
    #[serde(default)]
    pub is_current_user: bool,
}

/// `GET /challenges/{id}/leaderboard`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub challenge_id: i64,
    pub challenge_title: String,
    pub challenge_type: ChallengeType,
    pub goal_value: f64,
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// The logged-in runner's row, if they take part.
    pub fn current_user(&self) -> Option<&LeaderboardEntry> {
        self.leaderboard.iter().find(|e| e.is_current_user)
    }
}

/// One entry of a club's activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub user_name: String,
    pub created_at: String,
}

impl Activity {
    pub fn display_date(&self) -> String {
        format_date_ist(&self.created_at)
    }
}

/// Reply of the join endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

fn ist_input(value: &str, field: &str) -> Result<String> {
    convert_local_to_ist(value)
        .ok_or_else(|| RunSquadError::invalid_input(format!("Invalid {}: '{}'", field, value)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
