//! Unified error handling for the runsquad library.
//!
//! Every tracker and API failure is a [`RunSquadError`]. None of them are
//! fatal: callers show [`RunSquadError::user_message`] and let the user retry.

use thiserror::Error;

use crate::track::TrackState;

/// Unified error type for runsquad operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunSquadError {
    /// The device exposes no location capability
    #[error("geolocation capability unavailable")]
    CapabilityUnavailable,
    /// The user refused location access
    #[error("location permission denied")]
    PermissionDenied,
    /// No fix arrived within the watch timeout
    #[error("location request timed out")]
    SignalTimeout,
    /// The device could not determine a position
    #[error("location unavailable")]
    SignalUnavailable,
    /// Save attempted below the minimum distance
    #[error("run is {distance_km:.3} km, minimum {minimum_km:.3} km required")]
    DistanceTooShort { distance_km: f64, minimum_km: f64 },
    /// The run sink rejected the record
    #[error("run submission failed: {message}")]
    SubmissionFailed { message: String },
    /// Operation not valid in the current tracker state
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: TrackState,
        action: &'static str,
    },
    /// HTTP/API error
    #[error("{}", format_http(.message, .status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },
    /// Token rejected or missing
    #[error("not authenticated")]
    Unauthorized,
    /// Configuration error
    #[error("configuration error: {message}")]
    Config { message: String },
    /// Form values the API would refuse
    #[error("{message}")]
    InvalidInput { message: String },
}

impl RunSquadError {
    /// Creates an HTTP error without a status code.
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
            status_code: None,
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Message shown to the runner.
    pub fn user_message(&self) -> String {
        match self {
            Self::CapabilityUnavailable => {
                "Geolocation is not supported by your browser".to_string()
            }
            Self::PermissionDenied => {
                "Location access denied. Please enable location permissions.".to_string()
            }
            Self::SignalUnavailable => "Location unavailable. Check your GPS signal.".to_string(),
            Self::SignalTimeout => "Location request timeout. Check your GPS signal.".to_string(),
            Self::DistanceTooShort { .. } => {
                "Distance too short. Please track at least 10 meters.".to_string()
            }
            Self::SubmissionFailed { message } if !message.is_empty() => message.clone(),
            Self::SubmissionFailed { .. } => "Failed to save run".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this error came from the location source.
    pub fn is_location_error(&self) -> bool {
        matches!(
            self,
            Self::CapabilityUnavailable
                | Self::PermissionDenied
                | Self::SignalTimeout
                | Self::SignalUnavailable
        )
    }
}

fn format_http(message: &str, status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!("HTTP error ({}): {}", code, message),
        None => format!("HTTP error: {}", message),
    }
}

/// Result type alias for runsquad operations.
pub type Result<T> = std::result::Result<T, RunSquadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RunSquadError::DistanceTooShort {
            distance_km: 0.004,
            minimum_km: 0.01,
        };
        assert!(err.to_string().contains("0.004 km"));

        let err = RunSquadError::Http {
            message: "boom".to_string(),
            status_code: Some(500),
        };
        assert_eq!(err.to_string(), "HTTP error (500): boom");
        assert_eq!(RunSquadError::http("down").to_string(), "HTTP error: down");
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            RunSquadError::PermissionDenied.user_message(),
            "Location access denied. Please enable location permissions."
        );
        assert_eq!(
            RunSquadError::SubmissionFailed {
                message: String::new()
            }
            .user_message(),
            "Failed to save run"
        );
        assert_eq!(
            RunSquadError::SubmissionFailed {
                message: "Missing distance or duration".to_string()
            }
            .user_message(),
            "Missing distance or duration"
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = RunSquadError::InvalidTransition {
            from: TrackState::Idle,
            action: "pause",
        };
        assert_eq!(err.to_string(), "cannot pause while idle");
        assert!(!err.is_location_error());
        assert!(RunSquadError::SignalTimeout.is_location_error());
        assert_eq!(
            RunSquadError::invalid_input("Title is required").user_message(),
            "Title is required"
        );
    }
}
