use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use crate::builder::TimetableVars;
use crate::config::TimetableConfig;
use crate::data::{Room, RoomType, Subject, TeacherId};
use crate::model::{LinearExpr, Model};

/// Number of constraints each family contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintSummary {
    pub weekly_counts: usize,
    pub daily_caps: usize,
    pub room_coupling: usize,
    pub room_conflicts: usize,
    pub session_balance: usize,
    pub teacher_daily_limit: usize,
    pub lab_continuity: usize,
    pub teacher_conflicts: usize,
    pub lab_first_period: usize,
    pub lab_clashes: usize,
    pub slot_occupancy: usize,
}

impl ConstraintSummary {
    pub fn total(&self) -> usize {
        self.weekly_counts
            + self.daily_caps
            + self.room_coupling
            + self.room_conflicts
            + self.session_balance
            + self.teacher_daily_limit
            + self.lab_continuity
            + self.teacher_conflicts
            + self.lab_first_period
            + self.lab_clashes
            + self.slot_occupancy
    }
}

/// Adds every hard constraint family to `model`, in dependency order.
pub struct ConstraintAssembler<'a> {
    vars: &'a TimetableVars,
    subjects: &'a [Subject],
    rooms: &'a [Room],
    config: &'a TimetableConfig,
    /// Subject indices per teacher, ordered by teacher id.
    teachers: Vec<(&'a TeacherId, Vec<usize>)>,
}

impl<'a> ConstraintAssembler<'a> {
    pub fn new(
        vars: &'a TimetableVars,
        subjects: &'a [Subject],
        rooms: &'a [Room],
        config: &'a TimetableConfig,
    ) -> Self {
        let teachers = subjects
            .iter()
            .enumerate()
            .map(|(i, s)| (&s.teacher_id, i))
            .into_group_map()
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .collect();
        Self {
            vars,
            subjects,
            rooms,
            config,
            teachers,
        }
    }

    pub fn assemble(&self, model: &mut Model) -> ConstraintSummary {
        info!("Adding all timetable constraints...");
        let (weekly_counts, daily_caps) = self.add_basic_counts(model);
        let summary = ConstraintSummary {
            weekly_counts,
            daily_caps,
            room_coupling: self.add_room_coupling(model),
            room_conflicts: self.add_room_conflicts(model),
            session_balance: self.add_session_balance(model),
            teacher_daily_limit: self.add_teacher_daily_limit(model),
            lab_continuity: self.add_lab_continuity(model),
            teacher_conflicts: self.add_teacher_conflicts(model),
            lab_first_period: self.add_no_lab_first_period(model),
            lab_clashes: self.add_lab_clashes(model),
            slot_occupancy: self.add_slot_occupancy(model),
        };
        info!("Total constraints added: {}", summary.total());
        summary
    }

    fn labs(&self) -> impl Iterator<Item = usize> + Clone + '_ {
        self.subjects
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_lab)
            .map(|(i, _)| i)
    }

    fn day_sum(&self, subject: usize, day: usize, periods: &[usize]) -> LinearExpr {
        LinearExpr::sum(periods.iter().map(|p| self.vars.schedule(subject, day, *p)))
    }

    fn add_basic_counts(&self, model: &mut Model) -> (usize, usize) {
        let (mut weekly, mut daily) = (0, 0);
        for (s, subject) in self.subjects.iter().enumerate() {
            let week = LinearExpr::sum(
                (0..self.config.days)
                    .cartesian_product(0..self.config.periods)
                    .map(|(d, p)| self.vars.schedule(s, d, p)),
            );
            model.add_eq(week, subject.max_periods_per_week as i64);
            weekly += 1;

            for d in 0..self.config.days {
                let day =
                    LinearExpr::sum((0..self.config.periods).map(|p| self.vars.schedule(s, d, p)));
                model.add_le(day, subject.max_periods_per_day as i64);
                daily += 1;
            }
        }
        debug!("Added {} weekly and {} daily count constraints", weekly, daily);
        (weekly, daily)
    }

    /// sum of room choices == scheduled, per slot. With no compatible room the
    /// sum is empty and the slot is pinned to 0.
    fn add_room_coupling(&self, model: &mut Model) -> usize {
        let mut count = 0;
        for s in 0..self.subjects.len() {
            for d in 0..self.config.days {
                for p in 0..self.config.periods {
                    let x = self.vars.schedule(s, d, p);
                    let rooms = self.vars.rooms(s, d, p);
                    model.add_eq(LinearExpr::sum(rooms.iter().copied()).with_term(-1, x), 0);
                    count += 1;
                }
            }
        }
        debug!("Added {} room coupling constraints", count);
        count
    }

    /// C1: a room hosts at most one subject per slot.
    fn add_room_conflicts(&self, model: &mut Model) -> usize {
        info!("Adding C1: room conflict constraints...");
        let mut count = 0;
        for room in 0..self.rooms.len() {
            let users: Vec<usize> = (0..self.subjects.len())
                .filter(|s| self.vars.compatible_rooms(*s).contains(&room))
                .collect();
            if users.len() < 2 {
                continue;
            }
            for d in 0..self.config.days {
                for p in 0..self.config.periods {
                    let occupied = LinearExpr::sum(
                        users.iter().filter_map(|s| self.vars.room(*s, d, p, room)),
                    );
                    model.add_le(occupied, 1);
                    count += 1;
                }
            }
        }
        debug!("Added {} room conflict constraints", count);
        count
    }

    /// C2: subjects with 4+ weekly periods get at most 2 per half-day.
    fn add_session_balance(&self, model: &mut Model) -> usize {
        info!("Adding C2: morning/evening session balance...");
        let mut count = 0;
        for (s, subject) in self.subjects.iter().enumerate() {
            if subject.max_periods_per_week < 4 {
                continue;
            }
            for d in 0..self.config.days {
                for half in [&self.config.morning, &self.config.evening] {
                    if half.is_empty() {
                        continue;
                    }
                    model.add_le(self.day_sum(s, d, half), 2);
                    count += 1;
                }
            }
        }
        debug!("Added {} session balance constraints", count);
        count
    }

    /// C3: per teacher and day, sessions across all their subjects are capped.
    fn add_teacher_daily_limit(&self, model: &mut Model) -> usize {
        info!("Adding C3: teacher session limits...");
        let cap = self.config.max_teacher_sessions_per_day as i64;
        let mut count = 0;
        for (_, subjects) in &self.teachers {
            for d in 0..self.config.days {
                let sessions = LinearExpr::sum(
                    subjects
                        .iter()
                        .cartesian_product(0..self.config.periods)
                        .map(|(s, p)| self.vars.schedule(*s, d, p)),
                );
                model.add_le(sessions, cap);
                count += 1;
            }
        }
        debug!("Added {} teacher session constraints", count);
        count
    }

    /// C4: a scheduled window start drags the rest of the window along, and no
    /// interior lab period may stand alone.
    fn add_lab_continuity(&self, model: &mut Model) -> usize {
        if !self.config.enforce_lab_continuity {
            info!("Skipping C4: lab continuity disabled");
            return 0;
        }
        info!("Adding C4: lab continuity constraints...");
        let periods = self.config.periods;
        let duration = self.config.lab_duration;
        let labs: Vec<usize> = self.labs().collect();
        let mut count = 0;
        for s in labs {
            for d in 0..self.config.days {
                if duration <= periods {
                    for start in 0..=periods - duration {
                        let first = self.vars.schedule(s, d, start);
                        for offset in 1..duration {
                            model.add_implication(first, vec![
                                self.vars.schedule(s, d, start + offset),
                            ]);
                            count += 1;
                        }
                    }
                }

                for p in self.config.interior_periods() {
                    model.add_implication(self.vars.schedule(s, d, p), vec![
                        self.vars.schedule(s, d, p - 1),
                        self.vars.schedule(s, d, p + 1),
                    ]);
                    count += 1;
                }
            }
        }
        debug!("Added {} lab continuity constraints", count);
        count
    }

    /// C5: a teacher teaches at most one of their subjects per slot.
    fn add_teacher_conflicts(&self, model: &mut Model) -> usize {
        info!("Adding C5: teacher conflict constraints...");
        let mut count = 0;
        for (_, subjects) in &self.teachers {
            if subjects.len() < 2 {
                continue;
            }
            for d in 0..self.config.days {
                for p in 0..self.config.periods {
                    let teaching =
                        LinearExpr::sum(subjects.iter().map(|s| self.vars.schedule(*s, d, p)));
                    model.add_le(teaching, 1);
                    count += 1;
                }
            }
        }
        debug!("Added {} teacher conflict constraints", count);
        count
    }

    /// C6: labs never occupy the first morning or first evening period.
    fn add_no_lab_first_period(&self, model: &mut Model) -> usize {
        if !self.config.no_lab_first_period {
            info!("Skipping C6: lab first-period rule disabled");
            return 0;
        }
        info!("Adding C6: no lab in first period constraints...");
        let openers: Vec<usize> = [self.config.morning.first(), self.config.evening.first()]
            .into_iter()
            .flatten()
            .copied()
            .dedup()
            .collect();
        let labs: Vec<usize> = self.labs().collect();
        let mut count = 0;
        for s in labs {
            for d in 0..self.config.days {
                for p in &openers {
                    model.add_eq(LinearExpr::sum([self.vars.schedule(s, d, *p)]), 0);
                    count += 1;
                }
            }
        }
        debug!("Added {} no-lab-first-period constraints", count);
        count
    }

    /// C7: two lab subjects never hold the same laboratory in the same slot.
    fn add_lab_clashes(&self, model: &mut Model) -> usize {
        info!("Adding C7: lab clash constraints...");
        let lab_rooms: Vec<usize> = self
            .rooms
            .iter()
            .enumerate()
            .filter(|(_, r)| r.room_type == RoomType::Laboratory)
            .map(|(i, _)| i)
            .collect();
        let mut count = 0;
        for (a, b) in self.labs().tuple_combinations() {
            for room in &lab_rooms {
                for d in 0..self.config.days {
                    for p in 0..self.config.periods {
                        let (Some(ra), Some(rb)) = (
                            self.vars.room(a, d, p, *room),
                            self.vars.room(b, d, p, *room),
                        ) else {
                            continue;
                        };
                        model.add_le(LinearExpr::sum([ra, rb]), 1);
                        count += 1;
                    }
                }
            }
        }
        debug!("Added {} lab clash constraints", count);
        count
    }

    /// C8: at most one subject of the whole department per slot.
    fn add_slot_occupancy(&self, model: &mut Model) -> usize {
        if !self.config.enforce_single_occupancy || self.subjects.len() < 2 {
            info!("Skipping C8: single occupancy not applicable");
            return 0;
        }
        info!("Adding C8: single occupancy constraints...");
        let mut count = 0;
        for d in 0..self.config.days {
            for p in 0..self.config.periods {
                let occupied = LinearExpr::sum(
                    (0..self.subjects.len()).map(|s| self.vars.schedule(s, d, p)),
                );
                model.add_le(occupied, 1);
                count += 1;
            }
        }
        debug!("Added {} single occupancy constraints", count);
        count
    }
}
