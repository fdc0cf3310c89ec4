use log::{debug, info};

use crate::builder::TimetableVars;
use crate::config::TimetableConfig;
use crate::data::Subject;
use crate::model::{BoolVar, IntVar, LinearExpr, Model};

/// Auxiliary variables introduced by the objective.
#[derive(Debug, Clone)]
pub struct ObjectiveTerms {
    pub gaps: Vec<BoolVar>,
    /// One per day; carries no weight.
    pub daily_load: Vec<IntVar>,
    pub constraints: usize,
}

impl ObjectiveTerms {
    pub fn num_vars(&self) -> usize {
        self.gaps.len() + self.daily_load.len()
    }
}

/// Minimises isolated single periods.
///
/// `gap[s][d][p] >= x[p] - x[p-1] - x[p+1]` on interior periods, so a gap is forced
/// to 1 exactly when `p` is scheduled with both neighbours free. Minimisation
/// keeps every unforced gap at 0.
pub fn compose(
    model: &mut Model,
    vars: &TimetableVars,
    subjects: &[Subject],
    config: &TimetableConfig,
) -> ObjectiveTerms {
    info!("Adding optimization objective...");
    let mut gaps = Vec::new();
    let mut constraints = 0;
    for s in 0..subjects.len() {
        for d in 0..config.days {
            for p in config.interior_periods() {
                let gap = model.new_bool();
                let link = LinearExpr::sum([gap])
                    .with_term(-1, vars.schedule(s, d, p))
                    .with_term(1, vars.schedule(s, d, p - 1))
                    .with_term(1, vars.schedule(s, d, p + 1));
                model.add_ge(link, 0);
                gaps.push(gap);
                constraints += 1;
            }
        }
    }

    let load_max = subjects.len() as i64
        * subjects
            .iter()
            .map(|s| s.max_periods_per_day as i64)
            .max()
            .unwrap_or(0);
    let mut daily_load = Vec::with_capacity(config.days);
    for d in 0..config.days {
        let load = model.new_int(0, load_max);
        let scheduled = LinearExpr::sum(
            (0..subjects.len())
                .flat_map(|s| (0..config.periods).map(move |p| (s, p)))
                .map(|(s, p)| vars.schedule(s, d, p)),
        );
        model.add_eq(scheduled.with_term(-1, load), 0);
        daily_load.push(load);
        constraints += 1;
    }

    model.minimize(LinearExpr::sum(gaps.iter().copied()));
    debug!(
        "Objective uses {} gap and {} daily load variables",
        gaps.len(),
        daily_load.len()
    );
    ObjectiveTerms {
        gaps,
        daily_load,
        constraints,
    }
}
