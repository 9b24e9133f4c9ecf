//! Solver-free allocation by ordered direct placement.
//!
//! Passes, in order:
//! 0. stated preferences
//! 1. labs, allowed to push out theory that has a spare session elsewhere and
//!    is not held by a hard preference
//! 2. single theory periods, one cell at a time
//! 3. labs again, clean blocks only
//! 4. theory again with the afternoon held back while a lab is still waiting,
//!    then `Tutorial` in every empty teaching slot
//! 5. labs over `Tutorial` cells only
//! 6. theory pushed out in pass 1 goes back into the first slot that takes it
//!
//! No pass puts a theory session in the afternoon behind a period without a
//! real session.
//!
//! All bookkeeping lives on the [`GreedyRun`]; nothing survives the run.

use crate::data::{Requirement, RequirementId, Year};
use crate::geometry::{AFTERNOON_PERIODS, Day, LabWindow, Period, TEACHING_PERIODS};
use crate::grid::{Cell, Grid};
use crate::ledger::Ledger;
use crate::model::PreferenceMode;
use itertools::Itertools;
use log::{debug, info, warn};
use std::cmp::Reverse;
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedyOptions {
    pub preference_mode: PreferenceMode,
    /// Keep a teacher out of the first period when they taught the first
    /// period the day before.
    pub first_period_rest: bool,
}

impl Default for GreedyOptions {
    fn default() -> Self {
        Self {
            preference_mode: PreferenceMode::Soft,
            first_period_rest: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabMode {
    /// Empty block, or vacate theory cells whose subject has another session.
    CleanOrOverride,
    CleanOnly,
    /// Empty or `Tutorial` cells only.
    OverTutorial,
}

/// Which optional placement rules apply to a theory session.
#[derive(Debug, Clone, Copy)]
struct TheoryRules {
    no_period_repeat: bool,
    first_period_rest: bool,
}

const PREFERRED: TheoryRules = TheoryRules {
    no_period_repeat: false,
    first_period_rest: false,
};

const REGULAR: TheoryRules = TheoryRules {
    no_period_repeat: true,
    first_period_rest: true,
};

pub struct GreedyRun<'a> {
    requirements: &'a [Requirement],
    options: GreedyOptions,
    years: Vec<Year>,
    grid: Grid,
    ledger: Ledger,
    theory_left: Vec<u32>,
    lab_placed: Vec<bool>,
    /// Hard preferences that could not be honoured; those hours are never
    /// placed anywhere else.
    pinned_misses: Vec<u32>,
    /// Theory sessions vacated by a lab override, waiting for reinsertion.
    displaced: VecDeque<RequirementId>,
}

impl<'a> GreedyRun<'a> {
    pub fn new(requirements: &'a [Requirement], options: GreedyOptions) -> Self {
        let years: BTreeSet<Year> = requirements.iter().map(|r| r.year).collect();
        Self {
            requirements,
            options,
            years: years.into_iter().collect(),
            grid: Grid::for_requirements(requirements),
            ledger: Ledger::new(),
            theory_left: requirements.iter().map(Requirement::theory_hours).collect(),
            lab_placed: vec![false; requirements.len()],
            pinned_misses: vec![0; requirements.len()],
            displaced: VecDeque::new(),
        }
    }

    /// Runs every pass and hands back the filled grid.
    pub fn run(mut self) -> Grid {
        info!("Greedy allocation over {} requirement(s)", self.requirements.len());
        self.place_preferences();
        self.lab_pass(LabMode::CleanOrOverride);
        self.theory_pass(false);
        self.lab_pass(LabMode::CleanOnly);
        self.theory_pass(true);
        self.grid.fill_tutorials();
        self.lab_pass(LabMode::OverTutorial);
        self.reinsert_displaced();

        let theory_short: u32 = self.theory_left.iter().sum();
        let labs_short = self
            .requirements
            .iter()
            .filter(|r| r.lab.is_some() && !self.lab_placed[r.id])
            .count();
        info!("Greedy passes done: {theory_short} theory hour(s) and {labs_short} lab(s) unplaced");
        self.grid
    }

    fn floating(&self, id: RequirementId) -> u32 {
        self.theory_left[id].saturating_sub(self.pinned_misses[id])
    }

    fn lab_left(&self, req: &Requirement) -> u32 {
        match req.lab {
            Some(lab) if !self.lab_placed[req.id] => lab.duration as u32,
            _ => 0,
        }
    }

    fn load(&self, req: &Requirement) -> u32 {
        self.theory_left[req.id] + self.lab_left(req)
    }

    fn year_has_unplaced_lab(&self, year: Year) -> bool {
        self.requirements
            .iter()
            .any(|r| r.year == year && r.lab.is_some() && !self.lab_placed[r.id])
    }

    fn breaks_first_period_rest(&self, req: &Requirement, day: Day, period: Period) -> bool {
        self.options.first_period_rest
            && period == TEACHING_PERIODS[0]
            && day
                .previous()
                .is_some_and(|prev| self.ledger.teacher_busy(&req.teacher, prev, period))
    }

    /// Hard and optional rules for one theory session; cell vacancy is the
    /// caller's business.
    fn theory_fits(&self, req: &Requirement, day: Day, period: Period, rules: TheoryRules) -> bool {
        self.ledger.teacher_can_take(&req.teacher, day, &[period])
            && !self.ledger.subject_day_used(req.year, &req.subject, day)
            && !(rules.no_period_repeat
                && self.ledger.subject_period_used(req.year, &req.subject, period))
            && !(rules.first_period_rest && self.breaks_first_period_rest(req, day, period))
    }

    fn place_theory(&mut self, req: &Requirement, day: Day, period: Period) {
        self.grid.set(req.year, day, period, Some(Cell::Theory(req.id)));
        self.ledger.commit(req, day, &[period]);
        self.theory_left[req.id] -= 1;
        debug!("Y{} {day} p{period}: {} ({})", req.year, req.subject, req.teacher);
    }

    fn place_preferences(&mut self) {
        let requirements = self.requirements;
        for req in requirements.iter().filter(|r| r.theory.is_some()) {
            if req.surplus_preferences() > 0 {
                warn!(
                    "{} ({}) states {} preference(s) beyond its {} theory hour(s); ignoring them",
                    req.subject,
                    req.teacher,
                    req.surplus_preferences(),
                    req.theory_hours()
                );
            }
            for (day, period) in req.honoured_preferences() {
                let open = self.grid.get(req.year, day, period).is_none()
                    && self.grid.afternoon_open(req.year, day, period);
                if open && self.theory_fits(req, day, period, PREFERRED) {
                    self.place_theory(req, day, period);
                } else if self.options.preference_mode == PreferenceMode::Hard {
                    warn!(
                        "Hard preference {day} p{period} for {} ({}) cannot be honoured",
                        req.subject, req.teacher
                    );
                    self.pinned_misses[req.id] += 1;
                }
            }
        }
    }

    fn lab_candidates(&self, year: Year, day: Day, window: LabWindow) -> Vec<&'a Requirement> {
        let requirements = self.requirements;
        requirements
            .iter()
            .filter(|r| r.year == year && !self.lab_placed[r.id])
            .filter(|r| r.lab.is_some_and(|lab| lab.allows(window)))
            .filter(|r| !self.ledger.subject_day_used(year, &r.subject, day))
            .filter(|r| {
                window
                    .periods()
                    .iter()
                    .all(|&p| !self.ledger.subject_period_used(year, &r.subject, p))
            })
            .filter(|r| self.ledger.teacher_can_take(&r.teacher, day, window.periods()))
            .sorted_by_key(|r| {
                (
                    !(r.is_integrated && r.is_external_lab),
                    Reverse(self.load(r)),
                    r.id,
                )
            })
            .collect()
    }

    fn lab_pass(&mut self, mode: LabMode) {
        debug!("Lab pass ({mode:?})");
        for year in self.years.clone() {
            for day in Day::ALL {
                for window in LabWindow::ALL {
                    for req in self.lab_candidates(year, day, window) {
                        if self.try_place_lab(req, day, window, mode) {
                            break;
                        }
                    }
                }
            }
        }
    }

    fn try_place_lab(&mut self, req: &Requirement, day: Day, window: LabWindow, mode: LabMode) -> bool {
        let periods = window.periods();
        let cells: Vec<Option<Cell>> = periods
            .iter()
            .map(|&p| self.grid.get(req.year, day, p))
            .collect();
        let clean = cells.iter().all(Option::is_none);
        let fits = match mode {
            LabMode::CleanOnly => clean,
            LabMode::OverTutorial => cells.iter().all(|c| matches!(c, None | Some(Cell::Tutorial))),
            LabMode::CleanOrOverride => clean || self.override_block(req.year, day, periods),
        };
        if !fits {
            return false;
        }

        for &p in periods {
            self.grid.set(req.year, day, p, Some(Cell::Lab(req.id)));
        }
        self.ledger.commit(req, day, periods);
        self.lab_placed[req.id] = true;
        debug!("Y{} {day} {window:?}: {} ({})", req.year, req.lab_label(), req.teacher);
        true
    }

    /// Vacates the theory cells in a block so a lab can take it. Only theory
    /// whose subject keeps at least one other session that week may go, and
    /// never a slot pinned by a hard preference.
    fn override_block(&mut self, year: Year, day: Day, periods: &[Period]) -> bool {
        let pinned = |id: RequirementId, p: Period| {
            self.options.preference_mode == PreferenceMode::Hard
                && self.requirements[id].prefers(day, p)
        };
        let mut vacate: Vec<(Period, RequirementId)> = Vec::new();
        for &p in periods {
            match self.grid.get(year, day, p) {
                None => {}
                Some(Cell::Theory(id)) if !pinned(id, p) => vacate.push((p, id)),
                _ => return false,
            }
        }
        let spare = vacate
            .iter()
            .map(|(_, id)| *id)
            .counts()
            .into_iter()
            .all(|(id, n)| self.grid.theory_count(year, id) > n);
        if !spare {
            return false;
        }

        let requirements = self.requirements;
        for (p, id) in vacate {
            let displaced = &requirements[id];
            self.grid.set(year, day, p, None);
            self.ledger.release(displaced, day, &[p]);
            self.theory_left[id] += 1;
            self.displaced.push_back(id);
            debug!("Y{year} {day} p{p}: {} displaced for a lab", displaced.subject);
        }
        true
    }

    fn theory_pass(&mut self, reserve_afternoon: bool) {
        debug!("Theory pass (afternoon reserved: {reserve_afternoon})");
        let requirements = self.requirements;
        for year in self.years.clone() {
            let reserve = reserve_afternoon && self.year_has_unplaced_lab(year);
            for day in Day::ALL {
                for period in TEACHING_PERIODS {
                    if self.grid.get(year, day, period).is_some() {
                        continue;
                    }
                    if reserve && AFTERNOON_PERIODS.contains(&period) {
                        continue;
                    }
                    if !self.grid.afternoon_open(year, day, period) {
                        continue;
                    }
                    let best = requirements
                        .iter()
                        .filter(|r| r.year == year && self.floating(r.id) > 0)
                        .filter(|r| self.theory_fits(r, day, period, REGULAR))
                        .max_by_key(|r| (self.load(r), Reverse(r.id)));
                    if let Some(req) = best {
                        self.place_theory(req, day, period);
                    }
                }
            }
        }
    }

    fn reinsert_displaced(&mut self) {
        let requirements = self.requirements;
        while let Some(id) = self.displaced.pop_front() {
            let req = &requirements[id];
            if self.floating(id) == 0 {
                continue;
            }
            let slot = Day::ALL
                .into_iter()
                .flat_map(|d| TEACHING_PERIODS.map(|p| (d, p)))
                .find(|&(d, p)| {
                    self.grid.is_vacant(req.year, d, p)
                        && self.grid.afternoon_open(req.year, d, p)
                        && self.theory_fits(req, d, p, REGULAR)
                });
            match slot {
                Some((day, period)) => self.place_theory(req, day, period),
                None => warn!("No slot left to reinsert displaced {} ({})", req.subject, req.teacher),
            }
        }
    }
}
