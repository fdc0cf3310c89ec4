use log::{info, warn};

use crate::builder::TimetableVars;
use crate::config::{SolverParams, TimetableConfig};
use crate::data::{
    InfeasibilityDiagnostics, Room, RoomSupply, RoomType, Session, Subject, SubjectDemand,
    TimeoutDiagnostics,
};
use crate::error::{TimetableError, TimetableResult};
use crate::model::{Assignment, Model};
use crate::objective::ObjectiveTerms;
use crate::solver::{SolveOutcome, SolveStatus};

/// Business-level reading of a solver outcome.
#[derive(Debug, Clone)]
pub enum SolveReport {
    Solved {
        status: SolveStatus,
        sessions: Vec<Session>,
        objective_value: i64,
        daily_load: Vec<i64>,
    },
    Infeasible(InfeasibilityDiagnostics),
    Unknown(TimeoutDiagnostics),
    Failed {
        status: String,
    },
}

impl SolveReport {
    pub fn status_name(&self) -> &str {
        match self {
            SolveReport::Solved { status, .. } => status.name(),
            SolveReport::Infeasible(_) => SolveStatus::Infeasible.name(),
            SolveReport::Unknown(_) => SolveStatus::Unknown.name(),
            SolveReport::Failed { status } => status,
        }
    }
}

/// Everything needed to read an assignment back into domain terms.
pub struct ResultExtractor<'a> {
    pub model: &'a Model,
    pub vars: &'a TimetableVars,
    pub objective: &'a ObjectiveTerms,
    pub subjects: &'a [Subject],
    pub rooms: &'a [Room],
    pub config: &'a TimetableConfig,
    pub params: &'a SolverParams,
}

impl ResultExtractor<'_> {
    /// Classifies the outcome; a returned assignment is only trusted once it
    /// satisfies every constraint of the model.
    pub fn interpret(&self, outcome: SolveOutcome) -> TimetableResult<SolveReport> {
        match outcome.status {
            SolveStatus::Optimal | SolveStatus::Feasible => {
                let claimed = outcome.status;
                let Some(assignment) = outcome.assignment else {
                    if claimed == SolveStatus::Optimal {
                        return Err(TimetableError::Internal(
                            "solver reported OPTIMAL without an assignment".to_string(),
                        ));
                    }
                    return Ok(SolveReport::Unknown(self.timeout_diagnostics()));
                };
                match self.model.check(&assignment) {
                    Ok(()) => self.extract(claimed, &assignment),
                    Err(violation) if claimed == SolveStatus::Optimal => {
                        Err(TimetableError::Internal(format!(
                            "solver reported OPTIMAL but {violation}"
                        )))
                    }
                    Err(violation) => {
                        warn!("Discarding incumbent at time limit: {}", violation);
                        Ok(SolveReport::Unknown(self.timeout_diagnostics()))
                    }
                }
            }
            SolveStatus::Infeasible => Ok(SolveReport::Infeasible(diagnose(
                self.subjects,
                self.rooms,
                self.config,
            ))),
            SolveStatus::Unknown => Ok(SolveReport::Unknown(self.timeout_diagnostics())),
            SolveStatus::Other(status) => Ok(SolveReport::Failed { status }),
        }
    }

    fn extract(
        &self,
        status: SolveStatus,
        assignment: &Assignment,
    ) -> TimetableResult<SolveReport> {
        info!("Extracting solution...");
        let mut sessions = Vec::new();
        for d in 0..self.config.days {
            for p in 0..self.config.periods {
                for (s, subject) in self.subjects.iter().enumerate() {
                    if !assignment.bool_value(self.vars.schedule(s, d, p)) {
                        continue;
                    }
                    let room = self
                        .vars
                        .compatible_rooms(s)
                        .iter()
                        .zip(self.vars.rooms(s, d, p))
                        .find(|(_, var)| assignment.bool_value(**var))
                        .map(|(room, _)| &self.rooms[*room])
                        .ok_or_else(|| {
                            TimetableError::Internal(format!(
                                "subject {} is scheduled on day {d} period {p} without a room",
                                subject.id
                            ))
                        })?;
                    sessions.push(Session {
                        day: d as u32,
                        time_slot: p as u32,
                        subject_id: subject.id.clone(),
                        teacher_id: subject.teacher_id.clone(),
                        room_id: room.id.clone(),
                        is_lab_session: subject.is_lab,
                        lab_duration: if subject.is_lab { 3 } else { 1 },
                    });
                }
            }
        }

        Ok(SolveReport::Solved {
            status,
            sessions,
            objective_value: assignment.objective_value(self.model),
            daily_load: self
                .objective
                .daily_load
                .iter()
                .map(|load| assignment.int_value(*load))
                .collect(),
        })
    }

    fn timeout_diagnostics(&self) -> TimeoutDiagnostics {
        let seconds = self.params.time_limit.as_secs_f64();
        TimeoutDiagnostics {
            time_limit_seconds: seconds,
            suggestion: format!(
                "No timetable was proven or disproven within {seconds:.0}s. Reduce the number of \
                 subjects or relax constraints, or raise the time limit."
            ),
        }
    }
}

/// Demand against room-slot capacity, by room type.
pub fn diagnose(
    subjects: &[Subject],
    rooms: &[Room],
    config: &TimetableConfig,
) -> InfeasibilityDiagnostics {
    let slots_per_room = (config.days * config.periods) as u64;
    let demand = |lab: bool| -> u64 {
        subjects
            .iter()
            .filter(|s| s.is_lab == lab)
            .map(|s| s.max_periods_per_week as u64)
            .sum()
    };
    let rooms_of = |room_type: RoomType| rooms.iter().filter(|r| r.room_type == room_type).count();

    let lab_rooms = rooms_of(RoomType::Laboratory);
    let classrooms = rooms_of(RoomType::Classroom);
    InfeasibilityDiagnostics {
        subjects: subjects
            .iter()
            .map(|s| SubjectDemand {
                id: s.id.clone(),
                required_periods: s.max_periods_per_week,
                is_lab: s.is_lab,
            })
            .collect(),
        rooms: rooms
            .iter()
            .map(|r| RoomSupply {
                id: r.id.clone(),
                room_type: r.room_type,
            })
            .collect(),
        total_required_periods: demand(true) + demand(false),
        total_room_slots: rooms.len() as u64 * slots_per_room,
        lab_subjects: subjects.iter().filter(|s| s.is_lab).count(),
        lab_rooms,
        lab_required_periods: demand(true),
        lab_room_slots: lab_rooms as u64 * slots_per_room,
        classroom_required_periods: demand(false),
        classroom_room_slots: classrooms as u64 * slots_per_room,
    }
}
