use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Why a walk session could not be started. One variant per missing or
/// invalid input so the host can re-prompt for the specific field.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum PreconditionError {
    #[error("a destination is required")]
    MissingDestination,

    #[error("total walk duration must be greater than zero")]
    InvalidDuration,

    #[error("check-in interval must be greater than zero")]
    InvalidCheckInInterval,

    #[error("walk duration too long")]
    DurationTooLong,

    #[error("grace period must be between 1 and {interval} seconds")]
    InvalidGracePeriod { interval: u64 },

    #[error("no emergency contact is set; add one in settings first")]
    MissingEmergencyContact,

    #[error("current location is unavailable; enable location access and retry")]
    MissingLocation,

    #[error("a walk session is already in progress")]
    SessionInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum LocationUnavailableError {
    #[error("location access was denied")]
    Denied,

    #[error("location could not be determined: {0}")]
    Unavailable(String),

    #[error("location request timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum MessageDispatchError {
    #[error("'{0}' is not a usable phone number")]
    InvalidRecipient(String),

    #[error("message could not be delivered: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Location(#[from] LocationUnavailableError),

    /// Settings file or alert log failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("walk controller must be created inside a tokio runtime")]
    NoRuntime,
}
