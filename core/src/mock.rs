use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{CircuitState, CommandExecutor, TelemetrySource};
use crate::controller::HeatingStatus;
use crate::error::BackendError;
use crate::sample::TelemetrySample;
use crate::schedule::{ScheduleVariable, VariableSchedule};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start { soft_start: bool },
    Stop,
    Scheduling(bool),
    FetchState,
    GetSchedule(ScheduleVariable),
    SetSchedule(ScheduleVariable),
    History(u32),
    Latest,
}

#[derive(Default)]
struct Inner {
    state: CircuitState,
    schedules: HashMap<ScheduleVariable, VariableSchedule>,
    history: Vec<TelemetrySample>,
    latest: Option<TelemetrySample>,
    calls: Vec<Call>,
    failures: usize,
    expired: bool,
}

/// In-memory backend that echoes writes and can fail on demand.
#[derive(Default)]
pub struct MockBackend {
    inner: Mutex<Inner>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: CircuitState) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn set_history(&self, history: Vec<TelemetrySample>) {
        self.inner.lock().unwrap().history = history;
    }

    pub fn set_latest(&self, sample: Option<TelemetrySample>) {
        self.inner.lock().unwrap().latest = sample;
    }

    /// The next `n` calls fail with a transport style rejection.
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().unwrap().failures = n;
    }

    pub fn expire_session(&self) {
        self.inner.lock().unwrap().expired = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn record(&self, call: Call) -> Result<std::sync::MutexGuard<'_, Inner>, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if inner.expired {
            return Err(BackendError::Unauthorized);
        }
        if inner.failures > 0 {
            inner.failures -= 1;
            return Err(BackendError::Rejected {
                status: 503,
                message: "heat pump busy".to_string(),
            });
        }
        Ok(inner)
    }
}

#[async_trait]
impl CommandExecutor for MockBackend {
    async fn start_circuit(&self, soft_start: bool) -> Result<HeatingStatus, BackendError> {
        let mut inner = self.record(Call::Start { soft_start })?;
        inner.state = if soft_start {
            CircuitState {
                status: HeatingStatus::SoftStart,
                scheduling_enabled: inner.state.scheduling_enabled,
            }
        } else {
            CircuitState {
                status: HeatingStatus::Running,
                scheduling_enabled: true,
            }
        };
        Ok(inner.state.status)
    }

    async fn stop_circuit(&self) -> Result<HeatingStatus, BackendError> {
        let mut inner = self.record(Call::Stop)?;
        inner.state = CircuitState::default();
        Ok(inner.state.status)
    }

    async fn set_scheduling_enabled(&self, enabled: bool) -> Result<HeatingStatus, BackendError> {
        let mut inner = self.record(Call::Scheduling(enabled))?;
        inner.state.scheduling_enabled = enabled;
        Ok(inner.state.status)
    }

    async fn fetch_state(&self) -> Result<CircuitState, BackendError> {
        Ok(self.record(Call::FetchState)?.state)
    }

    async fn get_schedule(&self, variable: ScheduleVariable) -> Result<VariableSchedule, BackendError> {
        let inner = self.record(Call::GetSchedule(variable))?;
        Ok(inner.schedules.get(&variable).cloned().unwrap_or_default())
    }

    async fn set_schedule(
        &self,
        variable: ScheduleVariable,
        schedule: &VariableSchedule,
    ) -> Result<(), BackendError> {
        let mut inner = self.record(Call::SetSchedule(variable))?;
        inner.schedules.insert(variable, schedule.clone());
        Ok(())
    }
}

#[async_trait]
impl TelemetrySource for MockBackend {
    async fn fetch_history(&self, days: u32) -> Result<Vec<TelemetrySample>, BackendError> {
        Ok(self.record(Call::History(days))?.history.clone())
    }

    async fn fetch_latest(&self) -> Result<Option<TelemetrySample>, BackendError> {
        Ok(self.record(Call::Latest)?.latest.clone())
    }
}
