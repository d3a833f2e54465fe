use chrono::Weekday;

use crate::schedule::ScheduleVariable;

/// Failures of the remote command/telemetry backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("session expired")]
    Unauthorized,
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("backend unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    /// An expired session routes the operator to re-authentication instead of a retry.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, BackendError::Unauthorized)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("no start confirmation is pending")]
    NoPendingConfirmation,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ControlError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ControlError::Backend(e) if e.is_session_expired())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown schedule variable: {0}")]
    UnknownVariable(String),
    #[error("{variable} schedule has {days} of 7 weekdays")]
    Incomplete { variable: ScheduleVariable, days: usize },
    #[error("{variable} {day}: hour {hour} is outside 0-24")]
    HourOutOfRange {
        variable: ScheduleVariable,
        day: Weekday,
        hour: u8,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ScheduleError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ScheduleError::Backend(e) if e.is_session_expired())
    }
}
