//! Solver-agnostic 0/1 linear model of the weekly allocation.
//!
//! One decision per (theory component, day, teaching period) and per
//! (lab component, day, allowed window). Constraints are plain linear rows so
//! the same model can be handed to the ILP backend and used to check a
//! candidate selection.

use crate::data::{Requirement, RequirementId, Year};
use crate::geometry::{
    AFTERNOON_PERIODS, Day, LabWindow, MORNING_PERIODS, PERIOD_COUNT, Period, TEACHING_PERIODS,
    next_rest,
};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type VarId = usize;

static SINGLE_PERIODS: [[Period; 1]; PERIOD_COUNT] =
    [[0], [1], [2], [3], [4], [5], [6], [7], [8]];

/// Reward for a session landing on its exact preferred (day, period).
pub const EXACT_PREFERENCE_WEIGHT: f64 = 100.0;
/// Reward for a session landing on a preferred day at another period.
pub const DAY_PREFERENCE_WEIGHT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceMode {
    /// Preferences are rewarded in the objective.
    #[default]
    Soft,
    /// Preferred slots are forced.
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Theory {
        req: RequirementId,
        day: Day,
        period: Period,
    },
    Lab {
        req: RequirementId,
        day: Day,
        window: LabWindow,
    },
}

impl Decision {
    pub fn req(&self) -> RequirementId {
        match *self {
            Decision::Theory { req, .. } | Decision::Lab { req, .. } => req,
        }
    }

    pub fn day(&self) -> Day {
        match *self {
            Decision::Theory { day, .. } | Decision::Lab { day, .. } => day,
        }
    }

    pub fn periods(&self) -> &'static [Period] {
        match *self {
            Decision::Theory { period, .. } => &SINGLE_PERIODS[period],
            Decision::Lab { window, .. } => window.periods(),
        }
    }

    pub fn covers(&self, period: Period) -> bool {
        match *self {
            Decision::Theory { period: own, .. } => own == period,
            Decision::Lab { window, .. } => window.covers(period),
        }
    }

    pub fn last_period(&self) -> Period {
        match *self {
            Decision::Theory { period, .. } => period,
            Decision::Lab { window, .. } => window.last(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    ExactCount,
    SingleOccupancy,
    TeacherAvailability,
    RestPeriod,
    SubjectPerDay,
    MorningCoverage,
    AfternoonFill,
    PinnedPreference,
}

/// `sum(coef * x) <cmp> rhs` over decision variables.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub kind: ConstraintKind,
    pub terms: Vec<(VarId, i32)>,
    pub cmp: Comparison,
    pub rhs: i32,
}

impl LinearConstraint {
    /// Merges repeated variables and drops zero coefficients.
    fn new(
        kind: ConstraintKind,
        terms: impl IntoIterator<Item = (VarId, i32)>,
        cmp: Comparison,
        rhs: i32,
    ) -> Self {
        let mut merged: BTreeMap<VarId, i32> = BTreeMap::new();
        for (var, coef) in terms {
            *merged.entry(var).or_insert(0) += coef;
        }
        Self {
            kind,
            terms: merged.into_iter().filter(|(_, c)| *c != 0).collect(),
            cmp,
            rhs,
        }
    }

    pub fn is_satisfied(&self, selected: &[bool]) -> bool {
        let lhs: i32 = self
            .terms
            .iter()
            .filter(|(var, _)| selected.get(*var).copied().unwrap_or(false))
            .map(|(_, coef)| coef)
            .sum();
        match self.cmp {
            Comparison::Eq => lhs == self.rhs,
            Comparison::Le => lhs <= self.rhs,
            Comparison::Ge => lhs >= self.rhs,
        }
    }

    /// True when no 0/1 assignment can satisfy the row.
    fn is_trivially_infeasible(&self) -> bool {
        let max: i32 = self.terms.iter().map(|(_, c)| (*c).max(0)).sum();
        let min: i32 = self.terms.iter().map(|(_, c)| (*c).min(0)).sum();
        match self.cmp {
            Comparison::Eq => self.rhs < min || self.rhs > max,
            Comparison::Le => min > self.rhs,
            Comparison::Ge => max < self.rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOptions {
    pub preference_mode: PreferenceMode,
    pub morning_coverage: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            preference_mode: PreferenceMode::Soft,
            morning_coverage: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub years: Vec<Year>,
    pub decisions: Vec<Decision>,
    pub constraints: Vec<LinearConstraint>,
    /// Linear reward to maximise.
    pub objective: Vec<(VarId, f64)>,
}

impl Model {
    /// Constraints that the selection violates.
    pub fn violations(&self, selected: &[bool]) -> Vec<&LinearConstraint> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(selected))
            .collect()
    }

    pub fn score(&self, selected: &[bool]) -> f64 {
        self.objective
            .iter()
            .filter(|(var, _)| selected.get(*var).copied().unwrap_or(false))
            .map(|(_, w)| w)
            .sum()
    }

    /// The first constraint that cannot hold for any assignment, if any.
    pub fn trivially_infeasible(&self) -> Option<&LinearConstraint> {
        self.constraints.iter().find(|c| c.is_trivially_infeasible())
    }

    /// Selected decisions, in variable order.
    pub fn chosen<'a>(&'a self, selected: &'a [bool]) -> impl Iterator<Item = &'a Decision> + 'a {
        self.decisions
            .iter()
            .zip(selected.iter())
            .filter(|(_, on)| **on)
            .map(|(d, _)| d)
    }
}

pub fn build(requirements: &[Requirement], options: ModelOptions) -> Model {
    let mut builder = Builder::new(requirements);
    builder.add_variables();
    builder.add_exact_counts();
    builder.add_single_occupancy();
    builder.add_teacher_availability_and_rest();
    builder.add_subject_per_day();
    if options.morning_coverage {
        builder.add_morning_coverage();
    }
    builder.add_afternoon_fill();
    builder.add_preferences(options.preference_mode);

    let model = builder.model;
    info!(
        "Built model with {} decisions and {} constraints over {} year(s).",
        model.decisions.len(),
        model.constraints.len(),
        model.years.len()
    );
    model
}

struct Builder<'a> {
    requirements: &'a [Requirement],
    model: Model,
    theory_vars: BTreeMap<(RequirementId, Day, Period), VarId>,
    lab_vars: BTreeMap<(RequirementId, Day, LabWindow), VarId>,
}

impl<'a> Builder<'a> {
    fn new(requirements: &'a [Requirement]) -> Self {
        let years: BTreeSet<Year> = requirements.iter().map(|r| r.year).collect();
        Self {
            requirements,
            model: Model {
                years: years.into_iter().collect(),
                ..Model::default()
            },
            theory_vars: BTreeMap::new(),
            lab_vars: BTreeMap::new(),
        }
    }

    fn push_var(&mut self, decision: Decision) -> VarId {
        self.model.decisions.push(decision);
        self.model.decisions.len() - 1
    }

    fn push(
        &mut self,
        kind: ConstraintKind,
        terms: impl IntoIterator<Item = (VarId, i32)>,
        cmp: Comparison,
        rhs: i32,
    ) {
        let row = LinearConstraint::new(kind, terms, cmp, rhs);
        // An empty `<= k` row with k >= 0 carries no information.
        if row.terms.is_empty() && row.cmp == Comparison::Le && row.rhs >= 0 {
            return;
        }
        self.model.constraints.push(row);
    }

    // Lab windows outside a component's policy never get a variable, which
    // is how the placement-window rule is enforced.
    fn add_variables(&mut self) {
        for req in self.requirements {
            if req.theory.is_some() {
                for day in Day::ALL {
                    for period in TEACHING_PERIODS {
                        let var = self.push_var(Decision::Theory { req: req.id, day, period });
                        self.theory_vars.insert((req.id, day, period), var);
                    }
                }
            }
            if let Some(lab) = req.lab {
                for day in Day::ALL {
                    for window in lab.windows() {
                        let var = self.push_var(Decision::Lab { req: req.id, day, window });
                        self.lab_vars.insert((req.id, day, window), var);
                    }
                }
            }
        }
        debug!(
            "{} theory and {} lab variables",
            self.theory_vars.len(),
            self.lab_vars.len()
        );
    }

    fn vars_where<F>(&self, mut keep: F) -> Vec<VarId>
    where
        F: FnMut(&Requirement, &Decision) -> bool,
    {
        self.model
            .decisions
            .iter()
            .enumerate()
            .filter(|(_, d)| keep(&self.requirements[d.req()], d))
            .map(|(var, _)| var)
            .collect()
    }

    fn ones(vars: Vec<VarId>) -> impl Iterator<Item = (VarId, i32)> {
        vars.into_iter().map(|v| (v, 1))
    }

    fn add_exact_counts(&mut self) {
        for req in self.requirements {
            if let Some(theory) = req.theory {
                let vars = self.vars_where(|r, d| {
                    r.id == req.id && matches!(d, Decision::Theory { .. })
                });
                let hours = i32::try_from(theory.hours).unwrap_or(i32::MAX);
                self.push(ConstraintKind::ExactCount, Self::ones(vars), Comparison::Eq, hours);
            }
            if req.lab.is_some() {
                let vars =
                    self.vars_where(|r, d| r.id == req.id && matches!(d, Decision::Lab { .. }));
                self.push(ConstraintKind::ExactCount, Self::ones(vars), Comparison::Eq, 1);
            }
        }
    }

    fn occupancy(&self, year: Year, day: Day, period: Period) -> Vec<VarId> {
        self.vars_where(|r, d| r.year == year && d.day() == day && d.covers(period))
    }

    fn add_single_occupancy(&mut self) {
        for year in self.model.years.clone() {
            for day in Day::ALL {
                for period in TEACHING_PERIODS {
                    let vars = self.occupancy(year, day, period);
                    self.push(ConstraintKind::SingleOccupancy, Self::ones(vars), Comparison::Le, 1);
                }
            }
        }
    }

    fn add_teacher_availability_and_rest(&mut self) {
        let teachers: Vec<String> = self
            .requirements
            .iter()
            .map(|r| r.teacher.clone())
            .unique()
            .collect();
        for teacher in &teachers {
            for day in Day::ALL {
                for period in TEACHING_PERIODS {
                    let busy = self.vars_where(|r, d| {
                        &r.teacher == teacher && d.day() == day && d.covers(period)
                    });
                    self.push(
                        ConstraintKind::TeacherAvailability,
                        Self::ones(busy.clone()),
                        Comparison::Le,
                        1,
                    );

                    // Anything ending at `period` keeps the teacher out of its rest slot.
                    let Some(rest) = next_rest(period) else {
                        continue;
                    };
                    let ending = self.vars_where(|r, d| {
                        &r.teacher == teacher && d.day() == day && d.last_period() == period
                    });
                    if ending.is_empty() {
                        continue;
                    }
                    let busy_at_rest = self.vars_where(|r, d| {
                        &r.teacher == teacher && d.day() == day && d.covers(rest)
                    });
                    if busy_at_rest.is_empty() {
                        continue;
                    }
                    self.push(
                        ConstraintKind::RestPeriod,
                        Self::ones(ending).chain(Self::ones(busy_at_rest)),
                        Comparison::Le,
                        1,
                    );
                }
            }
        }
    }

    // A subject's lab day also counts as its one session for that day.
    fn add_subject_per_day(&mut self) {
        let subjects: Vec<(Year, String)> = self
            .requirements
            .iter()
            .map(|r| (r.year, r.subject.clone()))
            .unique()
            .collect();
        for (year, subject) in &subjects {
            for day in Day::ALL {
                let vars = self.vars_where(|r, d| {
                    r.year == *year && &r.subject == subject && d.day() == day
                });
                if vars.len() > 1 {
                    self.push(ConstraintKind::SubjectPerDay, Self::ones(vars), Comparison::Le, 1);
                }
            }
        }
    }

    fn add_morning_coverage(&mut self) {
        for year in self.model.years.clone() {
            for day in Day::ALL {
                for period in MORNING_PERIODS {
                    let vars = self.occupancy(year, day, period);
                    self.push(ConstraintKind::MorningCoverage, Self::ones(vars), Comparison::Ge, 1);
                }
            }
        }
    }

    // Single occupancy keeps every per-period sum at 0 or 1, so
    // "later occupied implies earlier occupied" is just `later - earlier <= 0`.
    fn add_afternoon_fill(&mut self) {
        for year in self.model.years.clone() {
            for day in Day::ALL {
                for pair in AFTERNOON_PERIODS.windows(2) {
                    let earlier = self.occupancy(year, day, pair[0]);
                    let later = self.occupancy(year, day, pair[1]);
                    let terms = Self::ones(later).chain(earlier.into_iter().map(|v| (v, -1)));
                    self.push(ConstraintKind::AfternoonFill, terms, Comparison::Le, 0);
                }
            }
        }
    }

    // Preferences attach to the theory component; lab-only requirements
    // have nothing to pin.
    fn add_preferences(&mut self, mode: PreferenceMode) {
        for req in self.requirements {
            if req.theory.is_none() || req.preferences.is_empty() {
                continue;
            }
            if req.surplus_preferences() > 0 {
                warn!(
                    "{} ({}) states {} preference(s) beyond its {} theory hour(s); ignoring them",
                    req.subject,
                    req.teacher,
                    req.surplus_preferences(),
                    req.theory_hours()
                );
            }
            for (day, preferred) in req.honoured_preferences() {
                match mode {
                    PreferenceMode::Hard => {
                        if let Some(&var) = self.theory_vars.get(&(req.id, day, preferred)) {
                            self.push(
                                ConstraintKind::PinnedPreference,
                                [(var, 1)],
                                Comparison::Eq,
                                1,
                            );
                        }
                    }
                    PreferenceMode::Soft => {
                        for period in TEACHING_PERIODS {
                            if let Some(&var) = self.theory_vars.get(&(req.id, day, period)) {
                                let weight = if period == preferred {
                                    EXACT_PREFERENCE_WEIGHT
                                } else {
                                    DAY_PREFERENCE_WEIGHT
                                };
                                self.model.objective.push((var, weight));
                            }
                        }
                    }
                }
            }
        }
    }
}
