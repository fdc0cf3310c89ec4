use log::{info, trace};

use crate::config::TimetableConfig;
use crate::data::{Room, Subject};
use crate::model::{BoolVar, Model};

/// Decision variables of the timetable, laid out flat.
///
/// `x[s][d][p]` lives at `(s * days + d) * periods + p`. Room variables are
/// stored per subject in blocks of `compatible[s].len()` per slot, starting at
/// `room_offset[s]`, so a slot's alternatives are one contiguous slice.
#[derive(Debug, Clone)]
pub struct TimetableVars {
    days: usize,
    periods: usize,
    schedule: Vec<BoolVar>,
    /// Room indices compatible with each subject, in input order.
    compatible: Vec<Vec<usize>>,
    room_offset: Vec<usize>,
    room: Vec<BoolVar>,
}

impl TimetableVars {
    /// Declares one `x` per (subject, day, period) and one `r` per compatible room.
    pub fn build(
        model: &mut Model,
        subjects: &[Subject],
        rooms: &[Room],
        config: &TimetableConfig,
    ) -> Self {
        info!(
            "Creating decision variables for {} subjects, {} rooms, {}x{} grid...",
            subjects.len(),
            rooms.len(),
            config.days,
            config.periods
        );
        let slots = config.days * config.periods;

        let schedule = (0..subjects.len() * slots)
            .map(|_| model.new_bool())
            .collect::<Vec<_>>();

        let compatible: Vec<Vec<usize>> = subjects
            .iter()
            .map(|subject| {
                rooms
                    .iter()
                    .enumerate()
                    .filter(|(_, room)| room.room_type.hosts(subject))
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();

        let mut room_offset = Vec::with_capacity(subjects.len());
        let mut room = Vec::new();
        for candidates in &compatible {
            room_offset.push(room.len());
            for _ in 0..slots * candidates.len() {
                room.push(model.new_bool());
            }
        }

        trace!(
            "Declared {} schedule and {} room variables, theoretical maximum {}",
            schedule.len(),
            room.len(),
            subjects.len() * slots * (1 + rooms.len())
        );

        Self {
            days: config.days,
            periods: config.periods,
            schedule,
            compatible,
            room_offset,
            room,
        }
    }

    pub fn num_subjects(&self) -> usize {
        self.compatible.len()
    }

    fn slot(&self, day: usize, period: usize) -> usize {
        debug_assert!(day < self.days && period < self.periods);
        day * self.periods + period
    }

    /// `x[subject][day][period]`
    pub fn schedule(&self, subject: usize, day: usize, period: usize) -> BoolVar {
        self.schedule[subject * self.days * self.periods + self.slot(day, period)]
    }

    /// Indices of the rooms `subject` may use.
    pub fn compatible_rooms(&self, subject: usize) -> &[usize] {
        &self.compatible[subject]
    }

    /// Room variables for one slot, aligned with [`Self::compatible_rooms`].
    pub fn rooms(&self, subject: usize, day: usize, period: usize) -> &[BoolVar] {
        let width = self.compatible[subject].len();
        let start = self.room_offset[subject] + self.slot(day, period) * width;
        &self.room[start..start + width]
    }

    /// `r[subject][day][period][room]`, absent when the room type does not fit.
    pub fn room(&self, subject: usize, day: usize, period: usize, room: usize) -> Option<BoolVar> {
        self.compatible[subject]
            .iter()
            .position(|r| *r == room)
            .map(|j| self.rooms(subject, day, period)[j])
    }

    pub fn num_schedule_vars(&self) -> usize {
        self.schedule.len()
    }

    pub fn num_room_vars(&self) -> usize {
        self.room.len()
    }

    pub fn num_vars(&self) -> usize {
        self.schedule.len() + self.room.len()
    }
}
