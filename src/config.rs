use itertools::Itertools;
use std::collections::HashSet;
use std::time::Duration;

use crate::data::{ConstraintSettings, PeriodSpec, TimetableInput};
use crate::error::{TimetableError, TimetableResult};

/// The normalized grid and constraint toggles. Built once from the payload and
/// read by the assembler; nothing queries the raw settings afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableConfig {
    pub days: usize,
    pub periods: usize,
    pub lab_duration: usize,
    /// Sorted, de-duplicated, within `0..periods`.
    pub morning: Vec<usize>,
    /// Sorted, de-duplicated, within `0..periods`.
    pub evening: Vec<usize>,
    pub max_teacher_sessions_per_day: u32,
    pub enforce_lab_continuity: bool,
    pub no_lab_first_period: bool,
    pub enforce_single_occupancy: bool,
}

impl TimetableConfig {
    pub fn from_settings(settings: &ConstraintSettings) -> TimetableResult<Self> {
        if settings.days_per_week == 0 {
            return Err(TimetableError::Validation(
                "days_per_week must be at least 1".to_string(),
            ));
        }
        if settings.periods_per_day == 0 {
            return Err(TimetableError::Validation(
                "periods_per_day must be at least 1".to_string(),
            ));
        }
        if settings.lab_duration == 0 {
            return Err(TimetableError::Validation(
                "lab_duration must be at least 1".to_string(),
            ));
        }

        let periods = settings.periods_per_day as usize;
        let morning = normalize_periods(&settings.morning_periods, 0, periods);
        // a counted evening set starts right after the morning block
        let evening_start = match &settings.morning_periods {
            PeriodSpec::Count(n) => *n as usize,
            PeriodSpec::Indices(_) => morning.last().map_or(0, |last| last + 1),
        };
        let evening = normalize_periods(&settings.evening_periods, evening_start, periods);

        Ok(Self {
            days: settings.days_per_week as usize,
            periods,
            lab_duration: settings.lab_duration as usize,
            morning,
            evening,
            max_teacher_sessions_per_day: settings.max_teacher_sessions_per_day,
            enforce_lab_continuity: settings.enforce_lab_continuity,
            no_lab_first_period: settings.no_lab_first_period,
            enforce_single_occupancy: settings.enforce_single_occupancy,
        })
    }

    /// Periods with a neighbour on both sides.
    pub fn interior_periods(&self) -> std::ops::Range<usize> {
        1..self.periods.saturating_sub(1)
    }
}

fn normalize_periods(spec: &PeriodSpec, count_start: usize, periods: usize) -> Vec<usize> {
    match spec {
        PeriodSpec::Count(n) => (count_start..count_start + *n as usize)
            .filter(|p| *p < periods)
            .collect(),
        PeriodSpec::Indices(indices) => indices
            .iter()
            .filter(|p| **p >= 0 && (**p as usize) < periods)
            .map(|p| *p as usize)
            .sorted()
            .dedup()
            .collect(),
    }
}

/// Structural checks the model cannot express.
pub fn validate_input(input: &TimetableInput) -> TimetableResult<()> {
    if input.subjects.is_empty() {
        return Err(TimetableError::Validation(
            "subjects must not be empty".to_string(),
        ));
    }
    if input.rooms.is_empty() {
        return Err(TimetableError::Validation("rooms must not be empty".to_string()));
    }

    let mut subject_ids = HashSet::new();
    for subject in &input.subjects {
        if !subject_ids.insert(&subject.id) {
            return Err(TimetableError::Validation(format!(
                "duplicate subject id: {}",
                subject.id
            )));
        }
    }
    let mut room_ids = HashSet::new();
    for room in &input.rooms {
        if !room_ids.insert(&room.id) {
            return Err(TimetableError::Validation(format!(
                "duplicate room id: {}",
                room.id
            )));
        }
    }
    Ok(())
}

/// Parameters handed to the solver backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    pub time_limit: Duration,
    pub workers: u32,
    pub seed: u32,
    /// Lets the backend print its own progress. HiGHS prints to stdout.
    pub log_progress: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(60),
            workers: 8,
            seed: 42,
            log_progress: false,
        }
    }
}
