use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::CommandExecutor;
use crate::error::ScheduleError;

pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Independently schedulable heating circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleVariable {
    LowerTank,
    HeatDistCircuit3,
}

impl ScheduleVariable {
    pub const ALL: [ScheduleVariable; 2] = [ScheduleVariable::LowerTank, ScheduleVariable::HeatDistCircuit3];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleVariable::LowerTank => "lowerTank",
            ScheduleVariable::HeatDistCircuit3 => "heatDistCircuit3",
        }
    }
}

impl fmt::Display for ScheduleVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleVariable {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScheduleVariable::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ScheduleError::UnknownVariable(s.to_string()))
    }
}

/// Boost window for one weekday. Hours run 0-24; `start <= end` is not checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeekDayEntry {
    pub start: u8,
    pub end: u8,
    pub delta: f64,
}

/// Weekly boost table for one variable.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSchedule(HashMap<Weekday, WeekDayEntry>);

impl VariableSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, day: Weekday, entry: WeekDayEntry) {
        self.0.insert(day, entry);
    }

    pub fn get(&self, day: Weekday) -> Option<&WeekDayEntry> {
        self.0.get(&day)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All seven weekdays have an entry.
    pub fn is_complete(&self) -> bool {
        WEEK.iter().all(|day| self.0.contains_key(day))
    }

    /// Entries Monday first, skipping missing days.
    pub fn days(&self) -> impl Iterator<Item = (Weekday, &WeekDayEntry)> {
        WEEK.into_iter().filter_map(move |day| self.0.get(&day).map(|e| (day, e)))
    }
}

impl FromIterator<(Weekday, WeekDayEntry)> for VariableSchedule {
    fn from_iter<I: IntoIterator<Item = (Weekday, WeekDayEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// --- Default boost tables ---
// (start hour, end hour, delta in degrees)

const LOWER_TANK_WORKDAY: (u8, u8, f64) = (13, 16, 5.0);
const LOWER_TANK_WEEKEND: (u8, u8, f64) = (11, 17, 5.0);

const LOWER_TANK_DEFAULTS: [(u8, u8, f64); 7] = [
    LOWER_TANK_WORKDAY, // Mon
    LOWER_TANK_WORKDAY,
    LOWER_TANK_WORKDAY,
    LOWER_TANK_WORKDAY,
    LOWER_TANK_WORKDAY, // Fri
    LOWER_TANK_WEEKEND, // Sat
    LOWER_TANK_WEEKEND, // Sun
];

const CIRCUIT3_MORNING: (u8, u8, f64) = (4, 7, 2.0);
const CIRCUIT3_LATE_MORNING: (u8, u8, f64) = (6, 9, 1.5);

const HEAT_DIST_CIRCUIT3_DEFAULTS: [(u8, u8, f64); 7] = [
    CIRCUIT3_MORNING, // Mon
    CIRCUIT3_MORNING,
    CIRCUIT3_MORNING,
    CIRCUIT3_MORNING,
    CIRCUIT3_MORNING,      // Fri
    CIRCUIT3_LATE_MORNING, // Sat
    CIRCUIT3_LATE_MORNING, // Sun
];

pub fn default_schedule(variable: ScheduleVariable) -> VariableSchedule {
    let table = match variable {
        ScheduleVariable::LowerTank => &LOWER_TANK_DEFAULTS,
        ScheduleVariable::HeatDistCircuit3 => &HEAT_DIST_CIRCUIT3_DEFAULTS,
    };
    WEEK.into_iter()
        .zip(table.iter())
        .map(|(day, &(start, end, delta))| (day, WeekDayEntry { start, end, delta }))
        .collect()
}

/// A submitted table must cover the whole week with hours in 0-24.
pub fn validate(variable: ScheduleVariable, schedule: &VariableSchedule) -> Result<(), ScheduleError> {
    if !schedule.is_complete() {
        return Err(ScheduleError::Incomplete {
            variable,
            days: schedule.days().count(),
        });
    }
    for (day, entry) in schedule.days() {
        for hour in [entry.start, entry.end] {
            if hour > 24 {
                return Err(ScheduleError::HourOutOfRange { variable, day, hour });
            }
        }
    }
    Ok(())
}

/// Weekly schedules per variable plus the activation flag mirrored from the
/// controller's scheduling state.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    schedules: HashMap<ScheduleVariable, VariableSchedule>,
    active: bool,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches and stores one variable's table. Safe to repeat.
    pub async fn load(
        &mut self,
        backend: &dyn CommandExecutor,
        variable: ScheduleVariable,
    ) -> Result<&VariableSchedule, ScheduleError> {
        let schedule = backend.get_schedule(variable).await?;
        self.insert(variable, schedule);
        Ok(&self.schedules[&variable])
    }

    /// Stores a table fetched elsewhere.
    pub fn insert(&mut self, variable: ScheduleVariable, schedule: VariableSchedule) {
        self.schedules.insert(variable, schedule);
    }

    /// Replaces one variable's whole table. Stored locally only once the backend accepted it.
    pub async fn update(
        &mut self,
        backend: &dyn CommandExecutor,
        variable: ScheduleVariable,
        schedule: VariableSchedule,
    ) -> Result<(), ScheduleError> {
        validate(variable, &schedule)?;
        backend.set_schedule(variable, &schedule).await?;
        info!("{} schedule updated", variable);
        self.insert(variable, schedule);
        Ok(())
    }

    pub async fn reset_to_default(
        &mut self,
        backend: &dyn CommandExecutor,
        variable: ScheduleVariable,
    ) -> Result<(), ScheduleError> {
        self.update(backend, variable, default_schedule(variable)).await
    }

    pub fn get(&self, variable: ScheduleVariable) -> Option<&VariableSchedule> {
        self.schedules.get(&variable)
    }

    pub fn is_ready(&self, variable: ScheduleVariable) -> bool {
        self.get(variable).map_or(false, |s| s.is_complete())
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
