use log::{error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::builder::TimetableVars;
use crate::config::{SolverParams, TimetableConfig, validate_input};
use crate::constraints::{ConstraintAssembler, ConstraintSummary};
use crate::data::{FailureDetails, ModelStats, Stats, TimetableInput, TimetableResponse};
use crate::error::{TimetableError, TimetableResult};
use crate::extract::{ResultExtractor, SolveReport};
use crate::model::Model;
use crate::objective::{self, ObjectiveTerms};
use crate::solver::SolverBackend;

/// A fully assembled model for one payload, ready to hand to a backend.
pub struct TimetableModel<'a> {
    pub input: &'a TimetableInput,
    pub config: TimetableConfig,
    pub model: Model,
    pub vars: TimetableVars,
    pub summary: ConstraintSummary,
    pub objective: ObjectiveTerms,
}

impl<'a> TimetableModel<'a> {
    /// Variables, hard constraints, then the objective.
    pub fn build(input: &'a TimetableInput) -> TimetableResult<Self> {
        validate_input(input)?;
        let config = TimetableConfig::from_settings(&input.constraints)?;

        let mut model = Model::new();
        let vars = TimetableVars::build(&mut model, &input.subjects, &input.rooms, &config);
        info!("Created {} variables", vars.num_vars());
        let summary = ConstraintAssembler::new(&vars, &input.subjects, &input.rooms, &config)
            .assemble(&mut model);
        let objective = objective::compose(&mut model, &vars, &input.subjects, &config);

        Ok(Self {
            input,
            config,
            model,
            vars,
            summary,
            objective,
        })
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            total_variables: self.vars.num_vars(),
            schedule_variables: self.vars.num_schedule_vars(),
            room_variables: self.vars.num_room_vars(),
            auxiliary_variables: self.objective.num_vars(),
            total_constraints: self.summary.total(),
            objective_constraints: self.objective.constraints,
            constraint_breakdown: self.summary,
        }
    }

    pub fn solve<B: SolverBackend + ?Sized>(
        &self,
        params: &SolverParams,
        backend: &B,
    ) -> TimetableResult<SolveReport> {
        let outcome = backend.solve(&self.model, params)?;
        ResultExtractor {
            model: &self.model,
            vars: &self.vars,
            objective: &self.objective,
            subjects: &self.input.subjects,
            rooms: &self.input.rooms,
            config: &self.config,
            params,
        }
        .interpret(outcome)
    }
}

/// A boundary error together with the document that reports it.
#[derive(Debug)]
pub struct Failure {
    pub error: TimetableError,
    pub response: TimetableResponse,
}

impl Failure {
    fn new(error: TimetableError, mut stats: Stats) -> Self {
        error!("{}", error);
        stats.error_type = Some(error.error_type().to_string());
        let response = TimetableResponse::failed(error.to_string(), None, None, stats);
        Self { error, response }
    }

    /// A failure that happened before any model statistics existed.
    pub fn from_error(error: TimetableError) -> Self {
        Self::new(error, Stats::default())
    }
}

/// Runs the whole pipeline for one input.
///
/// Solver outcomes, including INFEASIBLE and UNKNOWN, come back as `Ok`; only
/// validation, backend and internal faults are `Err`.
pub fn optimize<B: SolverBackend + ?Sized>(
    input: &TimetableInput,
    params: &SolverParams,
    backend: &B,
) -> Result<TimetableResponse, Failure> {
    let mut stats = Stats {
        department: Some(input.department.name.clone()),
        ..Stats::default()
    };
    let built = TimetableModel::build(input).map_err(|e| Failure::new(e, stats.clone()))?;
    stats.model = Some(built.stats());

    info!("Starting optimization with the {} backend...", backend.name());
    let start_time = Instant::now();
    let report = built.solve(params, backend);
    let elapsed = start_time.elapsed().as_secs_f64();
    stats.optimization_time = Some(elapsed);
    let report = report.map_err(|e| Failure::new(e, stats.clone()))?;

    info!("Optimization completed in {:.2} seconds", elapsed);
    info!("Solver status: {}", report.status_name());
    stats.solver_status = Some(report.status_name().to_string());

    Ok(match report {
        SolveReport::Solved {
            sessions,
            objective_value,
            daily_load,
            ..
        } => {
            stats.total_scheduled_periods = Some(sessions.len());
            stats.objective_value = Some(objective_value);
            stats.daily_load = Some(daily_load);
            TimetableResponse::solved(sessions, stats)
        }
        SolveReport::Infeasible(details) => TimetableResponse::failed(
            "No timetable satisfies all hard constraints",
            stats.solver_status.clone(),
            Some(FailureDetails::Infeasible(details)),
            stats,
        ),
        SolveReport::Unknown(details) => TimetableResponse::failed(
            format!(
                "No solution found within the {:.0}s time limit",
                details.time_limit_seconds
            ),
            stats.solver_status.clone(),
            Some(FailureDetails::Timeout(details)),
            stats,
        ),
        SolveReport::Failed { status } => TimetableResponse::failed(
            format!("Optimization failed: {status}"),
            Some(status),
            None,
            stats,
        ),
    })
}

/// Parses `payload` and optimizes it. Never panics: every fault, including a
/// panic inside the backend, becomes a failure document.
pub fn solve_payload<B: SolverBackend + ?Sized>(
    payload: &str,
    params: &SolverParams,
    backend: &B,
) -> Result<TimetableResponse, Failure> {
    let run = || {
        let input: TimetableInput = serde_json::from_str(payload)
            .map_err(|e| Failure::new(e.into(), Stats::default()))?;
        optimize(&input, params, backend)
    };
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(result) => result,
        Err(panic) => Err(Failure::new(
            TimetableError::Internal(panic_message(panic.as_ref())),
            Stats::default(),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EntityId, RoomType, Session};
    use crate::model::Assignment;
    use crate::solver::{HighsBackend, SolveOutcome, SolveStatus};
    use itertools::Itertools;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn reference_payload() -> serde_json::Value {
        json!({
            "department": { "name": "CS" },
            "subjects": [
                { "id": "A", "teacher_id": "T1", "is_lab": false,
                  "max_periods_per_week": 5, "max_periods_per_day": 2 },
                { "id": "B", "teacher_id": "T2", "is_lab": true,
                  "max_periods_per_week": 3, "max_periods_per_day": 3 }
            ],
            "rooms": [
                { "id": "R1", "type": "classroom" },
                { "id": "L1", "type": "laboratory" }
            ],
            "constraints": {
                "days_per_week": 5,
                "periods_per_day": 8,
                "lab_duration": 3,
                "morning_periods": [0, 1, 2, 3],
                "evening_periods": [4, 5, 6, 7]
            }
        })
    }

    fn input(payload: serde_json::Value) -> TimetableInput {
        serde_json::from_value(payload).unwrap()
    }

    fn params() -> SolverParams {
        SolverParams {
            time_limit: Duration::from_secs(30),
            ..SolverParams::default()
        }
    }

    fn timetable(response: &TimetableResponse) -> &[Session] {
        assert!(response.success, "expected success, got {:?}", response.error);
        response.timetable.as_deref().unwrap()
    }

    /// Checks every property a returned timetable must have for `input`.
    fn assert_timetable_properties(input: &TimetableInput, sessions: &[Session]) {
        let config = TimetableConfig::from_settings(&input.constraints).unwrap();
        let room_types: HashMap<&EntityId, RoomType> =
            input.rooms.iter().map(|r| (&r.id, r.room_type)).collect();

        for slot in sessions.iter().map(|s| (s.day, s.time_slot)).counts().values() {
            assert!(*slot <= 1, "two sessions share a slot");
        }

        for subject in &input.subjects {
            let own: Vec<&Session> = sessions
                .iter()
                .filter(|s| s.subject_id == subject.id)
                .collect();
            assert_eq!(own.len(), subject.max_periods_per_week as usize);
            for session in &own {
                assert!(room_types[&session.room_id].hosts(subject));
                assert_eq!(session.is_lab_session, subject.is_lab);
            }
            for (_, per_day) in &own.iter().chunk_by(|s| s.day) {
                let periods: Vec<u32> = per_day.map(|s| s.time_slot).collect();
                assert!(periods.len() <= subject.max_periods_per_day as usize);
                if subject.max_periods_per_week >= 4 {
                    for half in [&config.morning, &config.evening] {
                        let in_half = periods.iter().filter(|p| half.contains(&(**p as usize)));
                        assert!(in_half.count() <= 2, "more than two sessions in a half-day");
                    }
                }
                if subject.is_lab {
                    for p in &periods {
                        let slot = *p as usize;
                        assert!(slot != config.morning[0] && slot != config.evening[0]);
                        let interior = *p > 0 && (*p as usize) < config.periods - 1;
                        if interior {
                            assert!(
                                periods.contains(&(p - 1)) || periods.contains(&(p + 1)),
                                "isolated lab period {p}"
                            );
                        }
                    }
                }
            }
        }

        let mut teacher_day: HashMap<(&EntityId, u32), u32> = HashMap::new();
        for session in sessions {
            *teacher_day.entry((&session.teacher_id, session.day)).or_default() += 1;
        }
        assert!(
            teacher_day
                .values()
                .all(|n| *n <= input.constraints.max_teacher_sessions_per_day)
        );
    }

    #[test]
    fn reference_department_is_solved_optimally() {
        let input = input(reference_payload());
        let response = optimize(&input, &params(), &HighsBackend).unwrap();
        let sessions = timetable(&response);
        assert_timetable_properties(&input, sessions);
        assert_eq!(response.stats.solver_status.as_deref(), Some("OPTIMAL"));
        assert_eq!(response.stats.total_scheduled_periods, Some(8));
        assert_eq!(response.stats.objective_value, Some(0));
        assert_eq!(
            response.stats.daily_load.as_ref().map(|l| l.iter().sum::<i64>()),
            Some(8)
        );
        assert_eq!(response.stats.department.as_deref(), Some("CS"));
    }

    #[test]
    fn lab_block_runs_to_the_end_of_the_day() {
        let mut payload = reference_payload();
        payload["constraints"]["days_per_week"] = json!(1);
        payload["constraints"]["max_teacher_sessions_per_day"] = json!(3);
        payload["subjects"][0]["max_periods_per_week"] = json!(2);
        let input = input(payload);
        let response = optimize(&input, &params(), &HighsBackend).unwrap();
        let sessions = timetable(&response);
        assert_timetable_properties(&input, sessions);

        let lab: Vec<&Session> = sessions
            .iter()
            .filter(|s| s.subject_id == EntityId::Text("B".to_string()))
            .collect();
        assert!(lab.iter().all(|s| s.room_id == EntityId::Text("L1".to_string())));
        // a lab window started at or before period 5 drags every later period along
        let periods: Vec<u32> = lab.iter().map(|s| s.time_slot).collect();
        assert_eq!(periods, vec![5, 6, 7]);
        assert!(
            sessions
                .iter()
                .filter(|s| !s.is_lab_session)
                .all(|s| s.room_id == EntityId::Text("R1".to_string()) && s.time_slot < 5)
        );
    }

    #[test]
    fn missing_laboratory_is_infeasible() {
        let mut payload = reference_payload();
        payload["rooms"] = json!([{ "id": "R1", "type": "classroom" }]);
        let response = optimize(&input(payload), &params(), &HighsBackend).unwrap();

        assert!(!response.success);
        assert_eq!(response.status.as_deref(), Some("INFEASIBLE"));
        assert!(response.timetable.is_none());
        let Some(FailureDetails::Infeasible(details)) = response.details else {
            panic!("expected infeasibility details");
        };
        assert_eq!(details.lab_subjects, 1);
        assert_eq!(details.lab_rooms, 0);
        assert_eq!(details.total_required_periods, 8);
    }

    #[test]
    fn demand_beyond_capacity_is_infeasible() {
        let mut payload = reference_payload();
        // 41 sessions cannot fit 40 slots
        payload["subjects"] = json!([
            { "id": 1, "teacher_id": 1, "is_lab": false,
              "max_periods_per_week": 41, "max_periods_per_day": 8 }
        ]);
        let response = optimize(&input(payload), &params(), &HighsBackend).unwrap();
        assert_eq!(response.status.as_deref(), Some("INFEASIBLE"));
    }

    #[test]
    fn repeated_solves_agree() {
        let input = input(reference_payload());
        let first = optimize(&input, &params(), &HighsBackend).unwrap();
        let second = optimize(&input, &params(), &HighsBackend).unwrap();
        assert_eq!(first.stats.objective_value, second.stats.objective_value);
        assert_eq!(timetable(&first).len(), timetable(&second).len());
        assert_eq!(first.stats.model, second.stats.model);
    }

    fn overlapping_payload(single_occupancy: bool) -> serde_json::Value {
        json!({
            "department": { "name": "Physics" },
            "subjects": [
                { "id": 1, "teacher_id": 1, "is_lab": false,
                  "max_periods_per_week": 3, "max_periods_per_day": 3 },
                { "id": 2, "teacher_id": 2, "is_lab": false,
                  "max_periods_per_week": 3, "max_periods_per_day": 3 }
            ],
            "rooms": [
                { "id": 1, "type": "classroom" },
                { "id": 2, "type": "classroom" }
            ],
            "constraints": {
                "days_per_week": 1,
                "periods_per_day": 4,
                "lab_duration": 3,
                "morning_periods": 2,
                "evening_periods": 2,
                "max_teacher_sessions_per_day": 3,
                "enforce_single_occupancy": single_occupancy
            }
        })
    }

    #[test]
    fn single_occupancy_forbids_parallel_classes() {
        // six sessions, four slots
        let response =
            optimize(&input(overlapping_payload(true)), &params(), &HighsBackend).unwrap();
        assert_eq!(response.status.as_deref(), Some("INFEASIBLE"));
    }

    #[test]
    fn parallel_classes_use_distinct_rooms_without_single_occupancy() {
        let response =
            optimize(&input(overlapping_payload(false)), &params(), &HighsBackend).unwrap();
        let sessions = timetable(&response);
        assert_eq!(sessions.len(), 6);
        let shared: Vec<Vec<&Session>> = sessions
            .iter()
            .into_group_map_by(|s| s.time_slot)
            .into_values()
            .filter(|group| group.len() > 1)
            .collect();
        assert!(!shared.is_empty());
        for group in shared {
            assert_eq!(group.len(), 2);
            assert_ne!(group[0].room_id, group[1].room_id);
        }
    }

    struct ScriptedBackend(SolveStatus);

    impl SolverBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn solve(&self, model: &Model, _params: &SolverParams) -> TimetableResult<SolveOutcome> {
            Ok(SolveOutcome {
                status: self.0.clone(),
                assignment: Some(Assignment::new(vec![0; model.num_variables()])),
            })
        }
    }

    struct BrokenBackend;

    impl SolverBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn solve(&self, _model: &Model, _params: &SolverParams) -> TimetableResult<SolveOutcome> {
            panic!("solver library missing");
        }
    }

    #[test]
    fn unknown_outcome_reports_the_time_budget() {
        let response =
            optimize(&input(reference_payload()), &params(), &ScriptedBackend(SolveStatus::Unknown))
                .unwrap();
        assert!(!response.success);
        assert_eq!(response.status.as_deref(), Some("UNKNOWN"));
        assert!(response.error.unwrap().contains("30s"));
        assert!(matches!(
            response.details,
            Some(FailureDetails::Timeout(ref d)) if d.time_limit_seconds == 30.0
        ));
        assert!(response.stats.model.is_some());
    }

    #[test]
    fn unrecognised_status_is_reported_verbatim() {
        let backend = ScriptedBackend(SolveStatus::Other("MODEL_INVALID: ModelEmpty".to_string()));
        let response = optimize(&input(reference_payload()), &params(), &backend).unwrap();
        assert_eq!(response.status.as_deref(), Some("MODEL_INVALID: ModelEmpty"));
        assert_eq!(
            response.error.as_deref(),
            Some("Optimization failed: MODEL_INVALID: ModelEmpty")
        );
    }

    #[test]
    fn malformed_payload_becomes_a_failure_document() {
        let failure = solve_payload("{\"department\":", &params(), &HighsBackend).unwrap_err();
        assert_eq!(failure.error.error_type(), "JSONDecodeError");
        assert!(!failure.response.success);
        assert_eq!(
            failure.response.stats.error_type.as_deref(),
            Some("JSONDecodeError")
        );
    }

    #[test]
    fn empty_subjects_are_a_validation_error() {
        let mut payload = reference_payload();
        payload["subjects"] = json!([]);
        let failure =
            solve_payload(&payload.to_string(), &params(), &HighsBackend).unwrap_err();
        assert_eq!(failure.error.error_type(), "ValidationError");
        assert_eq!(failure.response.stats.department.as_deref(), Some("CS"));
    }

    #[test]
    fn backend_panic_is_contained() {
        let failure =
            solve_payload(&reference_payload().to_string(), &params(), &BrokenBackend).unwrap_err();
        assert_eq!(failure.error.error_type(), "InternalError");
        assert!(
            failure
                .response
                .error
                .as_deref()
                .unwrap()
                .contains("solver library missing")
        );
    }

    #[test]
    fn model_statistics_add_up() {
        let input = input(reference_payload());
        let built = TimetableModel::build(&input).unwrap();
        let stats = built.stats();
        assert_eq!(stats.schedule_variables, 80);
        assert_eq!(stats.room_variables, 80);
        assert_eq!(stats.total_variables, 160);
        // 2 subjects x 5 days x 6 interior gaps, plus 5 daily loads
        assert_eq!(stats.auxiliary_variables, 65);
        assert_eq!(stats.objective_constraints, 65);
        assert_eq!(
            built.model.num_constraints(),
            stats.total_constraints + stats.objective_constraints
        );
    }
}
