use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::controller::HeatingStatus;
use crate::error::BackendError;
use crate::sample::TelemetrySample;
use crate::schedule::{ScheduleVariable, VariableSchedule};

/// Status and scheduling flag as confirmed by the backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitState {
    pub status: HeatingStatus,
    pub scheduling_enabled: bool,
}

/// Commands executed by the backend that owns the heat pump.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn start_circuit(&self, soft_start: bool) -> Result<HeatingStatus, BackendError>;
    async fn stop_circuit(&self) -> Result<HeatingStatus, BackendError>;
    async fn set_scheduling_enabled(&self, enabled: bool) -> Result<HeatingStatus, BackendError>;
    async fn fetch_state(&self) -> Result<CircuitState, BackendError>;
    async fn get_schedule(&self, variable: ScheduleVariable) -> Result<VariableSchedule, BackendError>;
    async fn set_schedule(
        &self,
        variable: ScheduleVariable,
        schedule: &VariableSchedule,
    ) -> Result<(), BackendError>;
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Samples covering the last `days`, oldest first.
    async fn fetch_history(&self, days: u32) -> Result<Vec<TelemetrySample>, BackendError>;
    /// Most recent sample, if the backend has one.
    async fn fetch_latest(&self) -> Result<Option<TelemetrySample>, BackendError>;
}
