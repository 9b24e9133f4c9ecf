//! Occupancy bookkeeping for one allocation run.
//!
//! Counts rather than sets: grids coming back from the exact model may hold
//! a subject twice in the same period across the week, and releasing one of
//! those must not forget the other.

use crate::data::{Requirement, TeacherId, Year};
use crate::geometry::{Day, Period, next_rest, previous_teaching};
use crate::grid::{Cell, Grid};
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Tally<K: Eq + Hash>(HashMap<K, u32>);

impl<K: Eq + Hash> Default for Tally<K> {
    fn default() -> Self {
        Self(HashMap::new())
    }
}

impl<K: Eq + Hash> Tally<K> {
    fn add(&mut self, key: K) {
        *self.0.entry(key).or_insert(0) += 1;
    }

    fn remove(&mut self, key: &K) {
        if let Some(n) = self.0.get_mut(key) {
            *n -= 1;
            if *n == 0 {
                self.0.remove(key);
            }
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.0.contains_key(key)
    }
}

type SubjectKey = (Year, String);

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    teacher_slots: HashMap<TeacherId, Tally<(Day, Period)>>,
    subject_days: HashMap<SubjectKey, Tally<Day>>,
    subject_periods: HashMap<SubjectKey, Tally<Period>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the ledger from whatever is already placed in `grid`.
    pub fn from_grid(grid: &Grid, requirements: &[Requirement]) -> Self {
        let mut ledger = Self::new();
        for (year, day, period, cell) in grid.cells() {
            // A lab block is one session: only its first period marks the day.
            let (id, opens_session) = match cell {
                Cell::Theory(id) => (id, true),
                Cell::Lab(id) => (
                    id,
                    previous_teaching(period)
                        .is_none_or(|prev| grid.get(year, day, prev) != Some(Cell::Lab(id))),
                ),
                Cell::Tutorial => continue,
            };
            if let Some(req) = requirements.get(id) {
                ledger.commit_period(req, day, period, opens_session);
            }
        }
        ledger
    }

    pub fn teacher_busy(&self, teacher: &str, day: Day, period: Period) -> bool {
        self.teacher_slots
            .get(teacher)
            .is_some_and(|t| t.contains(&(day, period)))
    }

    /// The teacher is free for the contiguous run `periods` and keeps their
    /// rest slot on both sides of it.
    pub fn teacher_can_take(&self, teacher: &str, day: Day, periods: &[Period]) -> bool {
        let (Some(&first), Some(&last)) = (periods.first(), periods.last()) else {
            return false;
        };
        if periods.iter().any(|&p| self.teacher_busy(teacher, day, p)) {
            return false;
        }
        let before = previous_teaching(first).is_some_and(|p| self.teacher_busy(teacher, day, p));
        let after = next_rest(last).is_some_and(|p| self.teacher_busy(teacher, day, p));
        !before && !after
    }

    pub fn subject_day_used(&self, year: Year, subject: &str, day: Day) -> bool {
        self.subject_days
            .get(&(year, subject.to_string()))
            .is_some_and(|t| t.contains(&day))
    }

    pub fn subject_period_used(&self, year: Year, subject: &str, period: Period) -> bool {
        self.subject_periods
            .get(&(year, subject.to_string()))
            .is_some_and(|t| t.contains(&period))
    }

    /// Records one session (a theory period or a whole lab block) on `day`.
    pub fn commit(&mut self, req: &Requirement, day: Day, periods: &[Period]) {
        let key = (req.year, req.subject.clone());
        self.subject_days.entry(key.clone()).or_default().add(day);
        let slots = self.teacher_slots.entry(req.teacher.clone()).or_default();
        let used = self.subject_periods.entry(key).or_default();
        for &p in periods {
            slots.add((day, p));
            used.add(p);
        }
    }

    pub fn release(&mut self, req: &Requirement, day: Day, periods: &[Period]) {
        let key = (req.year, req.subject.clone());
        if let Some(days) = self.subject_days.get_mut(&key) {
            days.remove(&day);
        }
        for &p in periods {
            if let Some(slots) = self.teacher_slots.get_mut(&req.teacher) {
                slots.remove(&(day, p));
            }
            if let Some(used) = self.subject_periods.get_mut(&key) {
                used.remove(&p);
            }
        }
    }

    fn commit_period(&mut self, req: &Requirement, day: Day, period: Period, opens_session: bool) {
        let key = (req.year, req.subject.clone());
        if opens_session {
            self.subject_days.entry(key.clone()).or_default().add(day);
        }
        self.teacher_slots
            .entry(req.teacher.clone())
            .or_default()
            .add((day, period));
        self.subject_periods.entry(key).or_default().add(period);
    }
}
