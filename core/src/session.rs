use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as CoverageDuration;
use futures::future::join;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::backend::{CircuitState, CommandExecutor, TelemetrySource};
use crate::controller::{ConfirmationChoice, ControllerSnapshot, HeatingController, ToggleOutcome};
use crate::error::{ControlError, ScheduleError};
use crate::live::{self, LiveFeed};
use crate::sample::TelemetrySample;
use crate::schedule::{ScheduleStore, ScheduleVariable, VariableSchedule};
use crate::window::{SharedWindow, TelemetryWindow};

/// Everything one operator session works with, created at login and dropped at logout.
pub struct Session {
    commands: Arc<dyn CommandExecutor>,
    telemetry: Arc<dyn TelemetrySource>,
    window: SharedWindow,
    controller: RwLock<HeatingController>,
    schedules: RwLock<ScheduleStore>,
    live: Mutex<Option<LiveFeed>>,
}

impl Session {
    pub fn new(
        commands: Arc<dyn CommandExecutor>,
        telemetry: Arc<dyn TelemetrySource>,
        coverage_days: u32,
    ) -> Self {
        Self {
            commands,
            telemetry,
            window: TelemetryWindow::with_days(coverage_days).shared(),
            controller: RwLock::new(HeatingController::new()),
            schedules: RwLock::new(ScheduleStore::new()),
            live: Mutex::new(None),
        }
    }

    /// Session over a single backend serving both commands and telemetry.
    pub fn with_backend<B>(backend: Arc<B>, coverage_days: u32) -> Self
    where
        B: CommandExecutor + TelemetrySource + 'static,
    {
        Self::new(backend.clone(), backend, coverage_days)
    }

    pub fn window(&self) -> SharedWindow {
        self.window.clone()
    }

    /// Historical load followed by a circuit state refresh.
    pub async fn bootstrap(&self) -> Result<(), ControlError> {
        self.reload_history().await?;
        self.refresh().await?;
        Ok(())
    }

    async fn reload_history(&self) -> Result<(), ControlError> {
        let days = self.window.read().await.coverage_days();
        let history = self.telemetry.fetch_history(days).await?;
        info!("loaded {} historical samples covering {} days", history.len(), days);
        self.window.write().await.initialize(history);
        Ok(())
    }

    pub async fn start_live(&self, period: Duration) {
        let feed = live::start_polling(self.window.clone(), self.telemetry.clone(), period);
        if let Some(previous) = self.live.lock().await.replace(feed) {
            previous.stop();
        }
    }

    pub async fn stop_live(&self) {
        if let Some(feed) = self.live.lock().await.take() {
            feed.stop();
        }
    }

    pub async fn is_live(&self) -> bool {
        self.live.lock().await.as_ref().map_or(false, |f| f.is_running())
    }

    /// Logout or session expiry.
    pub async fn end(&self) {
        self.stop_live().await;
        self.window.write().await.clear();
        let mut controller = self.controller.write().await;
        controller.reset();
        self.sync_activation(&controller).await;
        info!("session ended");
    }

    pub async fn snapshot(&self) -> Vec<TelemetrySample> {
        self.window.read().await.snapshot()
    }

    pub async fn latest(&self) -> Option<TelemetrySample> {
        self.window.read().await.latest().cloned()
    }

    pub async fn coverage_days(&self) -> u32 {
        self.window.read().await.coverage_days()
    }

    /// Drops the window's validity and refetches history for the new span.
    pub async fn reconfigure_coverage(&self, days: u32) -> Result<(), ControlError> {
        self.window
            .write()
            .await
            .reconfigure_coverage(CoverageDuration::days(days as i64));
        self.reload_history().await
    }

    pub async fn heating(&self) -> ControllerSnapshot {
        self.controller.read().await.snapshot()
    }

    pub async fn toggle(&self) -> Result<ToggleOutcome, ControlError> {
        let outside = self.latest().await.map(|s| s.outside_temp);
        let mut controller = self.controller.write().await;
        let outcome = controller.toggle(&*self.commands, outside).await;
        self.sync_activation(&controller).await;
        outcome
    }

    pub async fn confirm(&self, choice: ConfirmationChoice) -> Result<ToggleOutcome, ControlError> {
        let mut controller = self.controller.write().await;
        let outcome = controller.confirm(&*self.commands, choice).await;
        self.sync_activation(&controller).await;
        outcome
    }

    pub async fn set_scheduling(&self, enabled: bool) -> Result<CircuitState, ControlError> {
        let mut controller = self.controller.write().await;
        let state = controller.set_scheduling(&*self.commands, enabled).await;
        self.sync_activation(&controller).await;
        state
    }

    pub async fn refresh(&self) -> Result<CircuitState, ControlError> {
        let mut controller = self.controller.write().await;
        let state = controller.refresh(&*self.commands).await;
        self.sync_activation(&controller).await;
        state
    }

    async fn sync_activation(&self, controller: &HeatingController) {
        self.schedules
            .write()
            .await
            .set_active(controller.scheduling_enabled());
    }

    pub async fn schedules_active(&self) -> bool {
        self.schedules.read().await.is_active()
    }

    pub async fn schedule(&self, variable: ScheduleVariable) -> Option<VariableSchedule> {
        self.schedules.read().await.get(variable).cloned()
    }

    pub async fn schedule_ready(&self, variable: ScheduleVariable) -> bool {
        self.schedules.read().await.is_ready(variable)
    }

    pub async fn load_schedule(&self, variable: ScheduleVariable) -> Result<VariableSchedule, ScheduleError> {
        let mut schedules = self.schedules.write().await;
        Ok(schedules.load(&*self.commands, variable).await?.clone())
    }

    /// Loads both variables concurrently; one failing does not block the other.
    pub async fn load_all_schedules(&self) -> Result<(), ScheduleError> {
        let (lower, circuit) = join(
            self.commands.get_schedule(ScheduleVariable::LowerTank),
            self.commands.get_schedule(ScheduleVariable::HeatDistCircuit3),
        )
        .await;

        let mut first_error = None;
        let mut schedules = self.schedules.write().await;
        for (variable, result) in [
            (ScheduleVariable::LowerTank, lower),
            (ScheduleVariable::HeatDistCircuit3, circuit),
        ] {
            match result {
                Ok(schedule) => schedules.insert(variable, schedule),
                Err(e) => {
                    warn!("loading {} schedule failed: {}", variable, e);
                    first_error.get_or_insert(ScheduleError::from(e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn update_schedule(
        &self,
        variable: ScheduleVariable,
        schedule: VariableSchedule,
    ) -> Result<(), ScheduleError> {
        self.schedules
            .write()
            .await
            .update(&*self.commands, variable, schedule)
            .await
    }

    pub async fn reset_schedule(&self, variable: ScheduleVariable) -> Result<VariableSchedule, ScheduleError> {
        let mut schedules = self.schedules.write().await;
        schedules.reset_to_default(&*self.commands, variable).await?;
        Ok(schedules.get(variable).cloned().unwrap_or_default())
    }
}
