use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolutionStatus, SolverModel,
    Variable, constraint, default_solver, variable,
};
use log::{debug, info};
use std::fmt;
use std::time::Instant;

use crate::config::SolverParams;
use crate::error::{TimetableError, TimetableResult};
use crate::model::{Assignment, Comparison, Domain, LinearExpr, Model, VarId};

/// Terminal outcome of a bounded solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven objective-minimal.
    Optimal,
    /// Satisfies every hard constraint, optimality not proven.
    Feasible,
    /// Proven to have no satisfying assignment.
    Infeasible,
    /// Neither proved nor disproved within the budget.
    Unknown,
    /// Anything the backend reports that fits none of the above.
    Other(String),
}

impl SolveStatus {
    pub fn name(&self) -> &str {
        match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unknown => "UNKNOWN",
            SolveStatus::Other(name) => name,
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Present whenever the backend produced values, even unverified ones.
    pub assignment: Option<Assignment>,
}

impl SolveOutcome {
    pub fn without_assignment(status: SolveStatus) -> Self {
        Self {
            status,
            assignment: None,
        }
    }
}

/// A solver that can take a [`Model`] and return an outcome.
///
/// One call per model; implementations must not keep state between calls.
pub trait SolverBackend {
    fn name(&self) -> &'static str;

    fn solve(&self, model: &Model, params: &SolverParams) -> TimetableResult<SolveOutcome>;
}

/// solves models with the HiGHS MILP solver through `good_lp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighsBackend;

impl SolverBackend for HighsBackend {
    fn name(&self) -> &'static str {
        "highs"
    }

    fn solve(&self, model: &Model, params: &SolverParams) -> TimetableResult<SolveOutcome> {
        let start_time = Instant::now();
        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = model
            .domains()
            .iter()
            .map(|domain| match domain {
                Domain::Bool => problem.add(variable().binary()),
                Domain::Int { min, max } => {
                    problem.add(variable().integer().min(*min as f64).max(*max as f64))
                }
            })
            .collect();

        let objective = to_expression(model.objective(), &vars);
        let mut highs = problem
            .minimise(objective)
            .using(default_solver)
            .set_option("threads", params.workers as i32)
            .set_option("random_seed", params.seed as i32) // fixed seed for reproducibility
            .set_option("time_limit", params.time_limit.as_secs_f64())
            // OPTIMAL only for a closed gap
            .set_option("mip_rel_gap", 0.0)
            .set_option("output_flag", params.log_progress)
            .set_option("log_to_console", params.log_progress);

        for linear in model.linear_constraints() {
            let lhs = to_expression(&linear.expr, &vars);
            let rhs = linear.rhs as f64;
            highs.add_constraint(match linear.cmp {
                Comparison::Le => constraint!(lhs <= rhs),
                Comparison::Eq => constraint!(lhs == rhs),
                Comparison::Ge => constraint!(lhs >= rhs),
            });
        }

        // premise => any_of  becomes  sum(any_of) - premise >= 0
        for implication in model.implications() {
            let any_of: Expression = implication
                .any_of
                .iter()
                .map(|v| vars[VarId::from(*v).index()])
                .sum();
            let premise = vars[VarId::from(implication.premise).index()];
            highs.add_constraint(constraint!(any_of - premise >= 0));
        }

        info!(
            "Starting HiGHS: {} columns, {} rows, limit {:.0?}, {} threads, seed {}...",
            vars.len(),
            model.num_constraints(),
            params.time_limit,
            params.workers,
            params.seed
        );
        let outcome = match highs.solve() {
            Ok(solution) => {
                let status = match solution.status() {
                    SolutionStatus::Optimal => SolveStatus::Optimal,
                    SolutionStatus::TimeLimit | SolutionStatus::GapLimit => SolveStatus::Feasible,
                };
                let values = vars
                    .iter()
                    .map(|var| solution.value(*var).round() as i64)
                    .collect();
                SolveOutcome {
                    status,
                    assignment: Some(Assignment::new(values)),
                }
            }
            Err(e) => failed_outcome(e)?,
        };
        debug!(
            "HiGHS returned {} in {:.2?}",
            outcome.status,
            start_time.elapsed()
        );
        Ok(outcome)
    }
}

fn to_expression(expr: &LinearExpr, vars: &[Variable]) -> Expression {
    let mut expression = Expression::from(expr.constant() as f64);
    for (coeff, var) in expr.terms() {
        expression += (*coeff as f64) * vars[var.index()];
    }
    expression
}

/// Reads a good_lp error as a solve status. Only faults outside the search
/// itself, such as a rejected option, stay errors.
fn failed_outcome(error: ResolutionError) -> TimetableResult<SolveOutcome> {
    let status = match error {
        ResolutionError::Infeasible => SolveStatus::Infeasible,
        ResolutionError::Unbounded => SolveStatus::Other("UNBOUNDED".to_string()),
        // a limit was hit before any feasible point was known
        ResolutionError::Other("NoSolutionFound") => SolveStatus::Unknown,
        ResolutionError::Other(name) => SolveStatus::Other(name.to_string()),
        ResolutionError::Str(message) => return Err(TimetableError::Solver(message)),
    };
    Ok(SolveOutcome::without_assignment(status))
}
