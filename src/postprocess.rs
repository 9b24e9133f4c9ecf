//! Grid clean-up shared by both strategies: pull sessions toward the start of
//! each half-day, then even out the daily load of every year.
//!
//! Only theory cells ever move, and only when the move keeps every hard rule.

use crate::data::{Requirement, Year};
use crate::geometry::{AFTERNOON_PERIODS, DAY_COUNT, Day, MORNING_PERIODS, PERIOD_COUNT, Period};
use crate::grid::{Cell, Grid};
use crate::ledger::Ledger;
use log::{debug, info};
use std::cmp::Reverse;

/// Morning sources, latest first so a pull never opens a fresh morning hole.
const MORNING_SOURCES: [Period; 3] = [4, 3, 1];
/// Periods a heavy day gives up first when balancing.
const DONOR_PERIODS: [Period; 4] = [8, 7, 6, 4];
const MAX_BALANCE_ROUNDS: usize = DAY_COUNT * PERIOD_COUNT;

/// Compacts then balances `grid` in place. `Tutorial` cells count as empty.
pub fn post_process(grid: &mut Grid, requirements: &[Requirement]) {
    let years: Vec<Year> = grid.years().collect();
    let ledger = Ledger::from_grid(grid, requirements);
    let mut mover = Mover {
        grid,
        ledger,
        requirements,
        moves: 0,
    };
    for &year in &years {
        for day in Day::ALL {
            mover.compact_day(year, day);
        }
    }
    for &year in &years {
        mover.balance_year(year);
    }
    info!("Post-processing moved {} session(s)", mover.moves);
}

struct Mover<'g, 'r> {
    grid: &'g mut Grid,
    ledger: Ledger,
    requirements: &'r [Requirement],
    moves: usize,
}

impl Mover<'_, '_> {
    /// Moves one theory cell if the target is vacant and every hard rule
    /// still holds afterwards. Cells sitting on a preferred slot stay put,
    /// and no move may open a gap in an afternoon that had none.
    fn try_move(&mut self, year: Year, from: (Day, Period), to: (Day, Period)) -> bool {
        let Some(Cell::Theory(id)) = self.grid.get(year, from.0, from.1) else {
            return false;
        };
        let Some(req) = self.requirements.get(id) else {
            return false;
        };
        if req.prefers(from.0, from.1) || !self.grid.is_vacant(year, to.0, to.1) {
            return false;
        }

        self.ledger.release(req, from.0, &[from.1]);
        let fits = self.ledger.teacher_can_take(&req.teacher, to.0, &[to.1])
            && !self.ledger.subject_day_used(year, &req.subject, to.0)
            && !self.ledger.subject_period_used(year, &req.subject, to.1);
        if !fits {
            self.ledger.commit(req, from.0, &[from.1]);
            return false;
        }

        let gapless_before = self.afternoons_gapless(year, from.0, to.0);
        let displaced = self.grid.get(year, to.0, to.1);
        self.grid.set(year, from.0, from.1, None);
        self.grid.set(year, to.0, to.1, Some(Cell::Theory(id)));
        let gapless_after = self.afternoons_gapless(year, from.0, to.0);
        if (gapless_before.0 && !gapless_after.0) || (gapless_before.1 && !gapless_after.1) {
            self.grid.set(year, to.0, to.1, displaced);
            self.grid.set(year, from.0, from.1, Some(Cell::Theory(id)));
            self.ledger.commit(req, from.0, &[from.1]);
            return false;
        }
        self.ledger.commit(req, to.0, &[to.1]);
        self.moves += 1;
        debug!(
            "Y{year}: {} moved {} p{} -> {} p{}",
            req.subject, from.0, from.1, to.0, to.1
        );
        true
    }

    fn afternoons_gapless(&self, year: Year, a: Day, b: Day) -> (bool, bool) {
        (
            self.grid.afternoon_gapless(year, a),
            self.grid.afternoon_gapless(year, b),
        )
    }

    fn compact_day(&mut self, year: Year, day: Day) {
        for target in MORNING_PERIODS {
            if !self.grid.is_vacant(year, day, target) {
                continue;
            }
            for source in MORNING_SOURCES.into_iter().filter(|&s| s > target) {
                if self.try_move(year, (day, source), (day, target)) {
                    break;
                }
            }
        }

        // Afternoon: the last taught period goes first; an earlier one is
        // tried only when the last cannot move.
        for target in AFTERNOON_PERIODS {
            if !self.grid.is_vacant(year, day, target) {
                continue;
            }
            for source in AFTERNOON_PERIODS.into_iter().rev().filter(|&s| s > target) {
                if self.grid.is_taught(year, day, source)
                    && self.try_move(year, (day, source), (day, target))
                {
                    break;
                }
            }
        }
    }

    fn balance_year(&mut self, year: Year) {
        for _ in 0..MAX_BALANCE_ROUNDS {
            let load = |d: Day| self.grid.day_load(year, d);
            let Some(heavy) = Day::ALL
                .into_iter()
                .max_by_key(|&d| (load(d), Reverse(d.index())))
            else {
                return;
            };
            let Some(light) = Day::ALL.into_iter().min_by_key(|&d| load(d)) else {
                return;
            };
            if load(heavy) <= load(light) + 1 {
                return;
            }
            if !self.shift_one(year, heavy, light) {
                return;
            }
        }
    }

    /// Moves one session from the tail of `from` into a morning slot of `to`.
    fn shift_one(&mut self, year: Year, from: Day, to: Day) -> bool {
        for source in DONOR_PERIODS {
            if !matches!(self.grid.get(year, from, source), Some(Cell::Theory(_))) {
                continue;
            }
            let afternoon_tail = AFTERNOON_PERIODS
                .iter()
                .any(|&p| p > source && self.grid.is_taught(year, from, p));
            if AFTERNOON_PERIODS.contains(&source) && afternoon_tail {
                continue;
            }
            for target in MORNING_PERIODS {
                if self.try_move(year, (from, source), (to, target)) {
                    return true;
                }
            }
        }
        false
    }
}
