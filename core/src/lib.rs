//! Client side coordination for a terrace heat pump installation: the bounded
//! telemetry window, the heating circuit state machine and the weekly boost
//! schedules, plus the backend they talk to.

pub mod backend;
pub mod controller;
pub mod error;
pub mod http;
pub mod live;
pub mod sample;
pub mod schedule;
pub mod session;
pub mod window;

#[cfg(test)]
mod mock;

pub use backend::{CircuitState, CommandExecutor, TelemetrySource};
pub use controller::{
    decide_toggle, ConfirmationChoice, ConfirmationPrompt, ControllerSnapshot, HeatingController,
    HeatingStatus, ToggleDecision, ToggleOutcome,
};
pub use error::{BackendError, ControlError, ScheduleError};
pub use http::HttpBackend;
pub use sample::TelemetrySample;
pub use schedule::{default_schedule, ScheduleStore, ScheduleVariable, VariableSchedule, WeekDayEntry};
pub use session::Session;
pub use window::{AppendOutcome, SharedWindow, TelemetryWindow, MAX_COVERAGE_DAYS};
