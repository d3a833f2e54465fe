use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::{CircuitState, CommandExecutor};
use crate::error::ControlError;

/// Starts below this outside temperature need operator confirmation.
pub const SOFT_START_THRESHOLD: f64 = 10.0;
/// At or below this only a soft-start is offered.
pub const FREEZING_THRESHOLD: f64 = 0.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeatingStatus {
    #[default]
    Stopped,
    Running,
    SoftStart,
    /// Set by the server side scheduler only.
    Boosting,
}

impl HeatingStatus {
    pub fn is_active(&self) -> bool {
        *self != HeatingStatus::Stopped
    }
}

/// Operator question raised for a start in cold weather.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationPrompt {
    pub outside_temperature: Option<f64>,
    /// Declining falls back to a normal start; otherwise declining does nothing.
    pub decline_starts_normally: bool,
}

impl ConfirmationPrompt {
    pub fn question(&self) -> String {
        let reading = match self.outside_temperature {
            Some(t) => format!("Outside temperature is {:.1}°C.", t),
            None => "Outside temperature is unknown.".to_string(),
        };
        if self.decline_starts_normally {
            format!("{} Use soft-start? (declining starts normally)", reading)
        } else {
            format!("{} Only soft-start is allowed. Soft-start now?", reading)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToggleDecision {
    Shutdown,
    Start,
    Confirm(ConfirmationPrompt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfirmationChoice {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ToggleOutcome {
    Committed(CircuitState),
    NeedsConfirmation(ConfirmationPrompt),
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transition {
    NormalStart,
    SoftStart,
    Shutdown,
}

/// What a toggle should do for the given status and outside temperature.
/// An unknown temperature is treated as freezing.
pub fn decide_toggle(status: HeatingStatus, outside_temperature: Option<f64>) -> ToggleDecision {
    if status.is_active() {
        return ToggleDecision::Shutdown;
    }
    match outside_temperature {
        Some(t) if t >= SOFT_START_THRESHOLD => ToggleDecision::Start,
        Some(t) if t > FREEZING_THRESHOLD => ToggleDecision::Confirm(ConfirmationPrompt {
            outside_temperature: Some(t),
            decline_starts_normally: true,
        }),
        other => ToggleDecision::Confirm(ConfirmationPrompt {
            outside_temperature: other,
            decline_starts_normally: false,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub status: HeatingStatus,
    pub scheduling_enabled: bool,
    pub pending_confirmation: Option<ConfirmationPrompt>,
}

/// Heating circuit state machine. Local state moves only after the backend
/// confirms a command.
#[derive(Debug, Default)]
pub struct HeatingController {
    state: CircuitState,
    pending: Option<ConfirmationPrompt>,
}

impl HeatingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> HeatingStatus {
        self.state.status
    }

    pub fn scheduling_enabled(&self) -> bool {
        self.state.scheduling_enabled
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn pending_confirmation(&self) -> Option<ConfirmationPrompt> {
        self.pending
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            status: self.state.status,
            scheduling_enabled: self.state.scheduling_enabled,
            pending_confirmation: self.pending,
        }
    }

    /// Adopts the backend's current view; picks up boosting changes made by the scheduler.
    pub async fn refresh(&mut self, backend: &dyn CommandExecutor) -> Result<CircuitState, ControlError> {
        let state = match backend.fetch_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!("reading circuit state failed: {}", e);
                return Err(e.into());
            }
        };
        if state != self.state {
            info!("circuit state now {:?} (scheduling {})", state.status, state.scheduling_enabled);
        }
        self.commit(state);
        Ok(state)
    }

    pub async fn toggle(
        &mut self,
        backend: &dyn CommandExecutor,
        outside_temperature: Option<f64>,
    ) -> Result<ToggleOutcome, ControlError> {
        self.pending = None;
        match decide_toggle(self.state.status, outside_temperature) {
            ToggleDecision::Shutdown => self.execute(backend, Transition::Shutdown).await,
            ToggleDecision::Start => self.execute(backend, Transition::NormalStart).await,
            ToggleDecision::Confirm(prompt) => {
                info!("start at {:?}°C needs confirmation", prompt.outside_temperature);
                self.pending = Some(prompt);
                Ok(ToggleOutcome::NeedsConfirmation(prompt))
            }
        }
    }

    pub async fn confirm(
        &mut self,
        backend: &dyn CommandExecutor,
        choice: ConfirmationChoice,
    ) -> Result<ToggleOutcome, ControlError> {
        let prompt = self.pending.take().ok_or(ControlError::NoPendingConfirmation)?;
        let transition = match choice {
            ConfirmationChoice::Accept => Transition::SoftStart,
            ConfirmationChoice::Decline if prompt.decline_starts_normally => Transition::NormalStart,
            ConfirmationChoice::Decline => {
                info!("soft-start declined, circuit stays stopped");
                return Ok(ToggleOutcome::Declined);
            }
        };
        self.execute(backend, transition).await
    }

    pub fn cancel_prompt(&mut self) {
        self.pending = None;
    }

    /// Forgets the confirmed state; nothing is known until the next refresh.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub async fn set_scheduling(
        &mut self,
        backend: &dyn CommandExecutor,
        enabled: bool,
    ) -> Result<CircuitState, ControlError> {
        let status = match backend.set_scheduling_enabled(enabled).await {
            Ok(status) => status,
            Err(e) => {
                warn!("setting scheduling to {} failed: {}", enabled, e);
                return Err(e.into());
            }
        };
        let state = CircuitState {
            status,
            scheduling_enabled: enabled,
        };
        info!("scheduling {}", if enabled { "enabled" } else { "disabled" });
        self.commit(state);
        Ok(state)
    }

    async fn execute(
        &mut self,
        backend: &dyn CommandExecutor,
        transition: Transition,
    ) -> Result<ToggleOutcome, ControlError> {
        let result = match transition {
            Transition::NormalStart => backend.start_circuit(false).await,
            Transition::SoftStart => backend.start_circuit(true).await,
            Transition::Shutdown => backend.stop_circuit().await,
        };
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                warn!("{:?} failed: {}", transition, e);
                return Err(e.into());
            }
        };

        let scheduling_enabled = match transition {
            Transition::NormalStart => true,
            Transition::SoftStart => self.state.scheduling_enabled,
            Transition::Shutdown => false,
        };
        let state = CircuitState {
            status,
            scheduling_enabled,
        };
        info!("{:?} confirmed, status {:?}", transition, status);
        self.commit(state);
        Ok(ToggleOutcome::Committed(state))
    }

    fn commit(&mut self, state: CircuitState) {
        if state.status.is_active() {
            self.pending = None;
        }
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockBackend};

    fn running() -> CircuitState {
        CircuitState {
            status: HeatingStatus::Running,
            scheduling_enabled: true,
        }
    }

    #[test]
    fn decision_table() {
        use HeatingStatus::*;
        assert_eq!(decide_toggle(Running, Some(-20.0)), ToggleDecision::Shutdown);
        assert_eq!(decide_toggle(SoftStart, None), ToggleDecision::Shutdown);
        assert_eq!(decide_toggle(Boosting, Some(15.0)), ToggleDecision::Shutdown);
        assert_eq!(decide_toggle(Stopped, Some(10.0)), ToggleDecision::Start);
        assert_eq!(
            decide_toggle(Stopped, Some(9.9)),
            ToggleDecision::Confirm(ConfirmationPrompt {
                outside_temperature: Some(9.9),
                decline_starts_normally: true
            })
        );
        assert_eq!(
            decide_toggle(Stopped, Some(0.0)),
            ToggleDecision::Confirm(ConfirmationPrompt {
                outside_temperature: Some(0.0),
                decline_starts_normally: false
            })
        );
        assert!(matches!(
            decide_toggle(Stopped, None),
            ToggleDecision::Confirm(ConfirmationPrompt { decline_starts_normally: false, .. })
        ));
        assert!(matches!(
            decide_toggle(Stopped, Some(f64::NAN)),
            ToggleDecision::Confirm(ConfirmationPrompt { decline_starts_normally: false, .. })
        ));
    }

    #[tokio::test]
    async fn warm_start_needs_no_confirmation() {
        let backend = MockBackend::new();
        let mut controller = HeatingController::new();

        let outcome = controller.toggle(&backend, Some(15.0)).await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Committed(running()));
        assert_eq!(backend.calls(), vec![Call::Start { soft_start: false }]);
        assert!(controller.scheduling_enabled());
        assert!(controller.pending_confirmation().is_none());
    }

    #[tokio::test]
    async fn freezing_start_decline_does_nothing() {
        let backend = MockBackend::new();
        let mut controller = HeatingController::new();

        let outcome = controller.toggle(&backend, Some(-5.0)).await.unwrap();
        assert!(matches!(outcome, ToggleOutcome::NeedsConfirmation(_)));
        assert!(backend.calls().is_empty());

        let outcome = controller.confirm(&backend, ConfirmationChoice::Decline).await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Declined);
        assert!(backend.calls().is_empty());
        assert_eq!(controller.status(), HeatingStatus::Stopped);
    }

    #[tokio::test]
    async fn freezing_start_accept_soft_starts() {
        let backend = MockBackend::new();
        let mut controller = HeatingController::new();

        controller.toggle(&backend, Some(-5.0)).await.unwrap();
        let outcome = controller.confirm(&backend, ConfirmationChoice::Accept).await.unwrap();

        assert_eq!(backend.calls(), vec![Call::Start { soft_start: true }]);
        assert_eq!(controller.status(), HeatingStatus::SoftStart);
        assert!(!controller.scheduling_enabled());
        assert!(matches!(outcome, ToggleOutcome::Committed(_)));
    }

    #[tokio::test]
    async fn mild_start_decline_starts_normally() {
        let backend = MockBackend::new();
        let mut controller = HeatingController::new();

        controller.toggle(&backend, Some(4.0)).await.unwrap();
        controller.confirm(&backend, ConfirmationChoice::Decline).await.unwrap();

        assert_eq!(backend.calls(), vec![Call::Start { soft_start: false }]);
        assert_eq!(controller.state(), running());
    }

    #[tokio::test]
    async fn running_toggle_shuts_down_and_disables_scheduling() {
        let backend = MockBackend::new();
        backend.set_state(running());
        let mut controller = HeatingController::new();
        controller.refresh(&backend).await.unwrap();
        assert!(controller.scheduling_enabled());

        let outcome = controller.toggle(&backend, Some(-30.0)).await.unwrap();
        assert_eq!(backend.calls(), vec![Call::FetchState, Call::Stop]);
        assert_eq!(outcome, ToggleOutcome::Committed(CircuitState::default()));
        assert!(!controller.scheduling_enabled());
    }

    #[tokio::test]
    async fn status_moves_only_after_confirmed_command() {
        let backend = MockBackend::new();
        let mut controller = HeatingController::new();

        backend.fail_next(1);
        let err = controller.toggle(&backend, Some(12.0)).await.unwrap_err();
        assert!(!err.is_session_expired());
        assert_eq!(controller.state(), CircuitState::default());

        controller.toggle(&backend, Some(12.0)).await.unwrap();
        assert_eq!(controller.state(), running());
    }

    #[tokio::test]
    async fn confirm_without_prompt_is_an_error() {
        let backend = MockBackend::new();
        let mut controller = HeatingController::new();
        let err = controller.confirm(&backend, ConfirmationChoice::Accept).await.unwrap_err();
        assert!(matches!(err, ControlError::NoPendingConfirmation));

        controller.toggle(&backend, Some(1.0)).await.unwrap();
        controller.cancel_prompt();
        assert!(controller.confirm(&backend, ConfirmationChoice::Accept).await.is_err());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn scheduling_toggle_mirrors_confirmation() {
        let backend = MockBackend::new();
        backend.set_state(running());
        let mut controller = HeatingController::new();
        controller.refresh(&backend).await.unwrap();

        let state = controller.set_scheduling(&backend, false).await.unwrap();
        assert_eq!(state.status, HeatingStatus::Running);
        assert!(!controller.scheduling_enabled());

        backend.fail_next(1);
        assert!(controller.set_scheduling(&backend, true).await.is_err());
        assert!(!controller.scheduling_enabled());
    }

    #[tokio::test]
    async fn expired_session_is_reported() {
        let backend = MockBackend::new();
        backend.expire_session();
        let mut controller = HeatingController::new();
        let err = controller.toggle(&backend, Some(20.0)).await.unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(controller.status(), HeatingStatus::Stopped);
    }

    #[tokio::test]
    async fn refresh_picks_up_boosting() {
        let backend = MockBackend::new();
        let mut controller = HeatingController::new();
        backend.set_state(CircuitState {
            status: HeatingStatus::Boosting,
            scheduling_enabled: true,
        });
        controller.refresh(&backend).await.unwrap();
        assert_eq!(controller.status(), HeatingStatus::Boosting);
        assert_eq!(decide_toggle(controller.status(), Some(20.0)), ToggleDecision::Shutdown);
    }

    #[test]
    fn prompt_questions() {
        let mild = ConfirmationPrompt {
            outside_temperature: Some(4.0),
            decline_starts_normally: true,
        };
        assert!(mild.question().contains("4.0°C"));
        assert!(mild.question().contains("declining starts normally"));
        let freezing = ConfirmationPrompt {
            outside_temperature: None,
            decline_starts_normally: false,
        };
        assert!(freezing.question().contains("Only soft-start"));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(ToggleOutcome::Committed(running())).unwrap();
        assert_eq!(json["outcome"], "committed");
        assert_eq!(json["status"], "running");
        assert_eq!(json["schedulingEnabled"], true);
    }
}
