use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constraints::ConstraintSummary;

/// An identifier as it appears in the payload, either a JSON integer or a string.
/// It is echoed back unchanged in the output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{n}"),
            EntityId::Text(s) => write!(f, "{s}"),
        }
    }
}

// Type aliases for clarity
pub type SubjectId = EntityId;
pub type TeacherId = EntityId;
pub type RoomId = EntityId;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Department {
    pub name: String,
}

/// A subject to be placed on the weekly grid.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subject {
    pub id: SubjectId,
    pub teacher_id: TeacherId,
    pub is_lab: bool,
    /// Exact number of sessions required per week.
    pub max_periods_per_week: u32,
    pub max_periods_per_day: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Classroom,
    Laboratory,
}

impl RoomType {
    /// Lab subjects go to laboratories, everything else to classrooms.
    pub fn hosts(self, subject: &Subject) -> bool {
        match self {
            RoomType::Laboratory => subject.is_lab,
            RoomType::Classroom => !subject.is_lab,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Room {
    pub id: RoomId,
    #[serde(rename = "type")]
    pub room_type: RoomType,
}

/// A morning or evening period set, given either as a count or as explicit indices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PeriodSpec {
    Count(u32),
    Indices(Vec<i64>),
}

fn default_teacher_sessions() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

/// The `constraints` object of the payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConstraintSettings {
    pub days_per_week: u32,
    pub periods_per_day: u32,
    pub lab_duration: u32,
    pub morning_periods: PeriodSpec,
    pub evening_periods: PeriodSpec,
    #[serde(default = "default_teacher_sessions")]
    pub max_teacher_sessions_per_day: u32,
    #[serde(default = "default_true")]
    pub enforce_lab_continuity: bool,
    #[serde(default = "default_true")]
    pub no_lab_first_period: bool,
    /// At most one subject of the department in any slot.
    #[serde(default = "default_true")]
    pub enforce_single_occupancy: bool,
}

/// The complete input for one solve.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimetableInput {
    pub department: Department,
    pub subjects: Vec<Subject>,
    pub rooms: Vec<Room>,
    pub constraints: ConstraintSettings,
}

/// One scheduled period of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub day: u32,
    pub time_slot: u32,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub room_id: RoomId,
    pub is_lab_session: bool,
    /// Nominal length, 3 for labs and 1 otherwise. Descriptive only.
    pub lab_duration: u32,
}

/// Size of the built model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    pub total_variables: usize,
    pub schedule_variables: usize,
    pub room_variables: usize,
    pub auxiliary_variables: usize,
    pub total_constraints: usize,
    pub objective_constraints: usize,
    pub constraint_breakdown: ConstraintSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(flatten)]
    pub model: Option<ModelStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_scheduled_periods: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_load: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectDemand {
    pub id: SubjectId,
    pub required_periods: u32,
    pub is_lab: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSupply {
    pub id: RoomId,
    #[serde(rename = "type")]
    pub room_type: RoomType,
}

/// Demand against capacity, attached to an infeasible outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfeasibilityDiagnostics {
    pub subjects: Vec<SubjectDemand>,
    pub rooms: Vec<RoomSupply>,
    pub total_required_periods: u64,
    pub total_room_slots: u64,
    pub lab_subjects: usize,
    pub lab_rooms: usize,
    pub lab_required_periods: u64,
    pub lab_room_slots: u64,
    pub classroom_required_periods: u64,
    pub classroom_room_slots: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeoutDiagnostics {
    pub time_limit_seconds: f64,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FailureDetails {
    Infeasible(InfeasibilityDiagnostics),
    Timeout(TimeoutDiagnostics),
}

/// The document written to the primary output channel.
#[derive(Debug, Clone, Serialize)]
pub struct TimetableResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timetable: Option<Vec<Session>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FailureDetails>,
    pub stats: Stats,
}

impl TimetableResponse {
    pub fn solved(timetable: Vec<Session>, stats: Stats) -> Self {
        Self {
            success: true,
            timetable: Some(timetable),
            error: None,
            status: None,
            details: None,
            stats,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        status: Option<String>,
        details: Option<FailureDetails>,
        stats: Stats,
    ) -> Self {
        Self {
            success: false,
            timetable: None,
            error: Some(error.into()),
            status,
            details,
            stats,
        }
    }
}
