use crate::data::{Requirement, SolveStatus};
use crate::error::AllocError;
use crate::grid::{Cell, Grid};
use crate::model::{Comparison, Decision, Model};
use good_lp::variable;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    default_solver,
};
use log::{info, trace, warn};
use std::time::{Duration, Instant};

/// A selection that satisfies every row of the model.
#[derive(Debug, Clone)]
pub struct ExactSolution {
    pub selected: Vec<bool>,
    pub status: SolveStatus,
    pub objective: f64,
    pub elapsed: Duration,
}

/// Solves the model with the HiGHS ILP solver inside `time_limit`.
///
/// When the budget runs out the best incumbent is returned if it satisfies
/// the model; otherwise the run is reported as timed out.
pub fn solve(model: &Model, time_limit: Duration) -> Result<ExactSolution, AllocError> {
    let start_time = Instant::now();

    if let Some(row) = model.trivially_infeasible() {
        return Err(AllocError::Infeasible {
            reason: format!("a {:?} constraint can never hold", row.kind),
        });
    }
    if model.decisions.is_empty() {
        return Ok(ExactSolution {
            selected: Vec::new(),
            status: SolveStatus::Optimal,
            objective: 0.0,
            elapsed: start_time.elapsed(),
        });
    }

    info!(
        "Setting up ILP model with {} variables and {} constraints...",
        model.decisions.len(),
        model.constraints.len()
    );
    let mut problem = ProblemVariables::new();
    let vars: Vec<Variable> = problem.add_vector(variable().binary(), model.decisions.len());

    let objective: Expression = model
        .objective
        .iter()
        .map(|&(var, weight)| weight * vars[var])
        .sum();
    trace!("Objective has {} weighted terms.", model.objective.len());

    let mut ilp = problem
        .maximise(objective)
        .using(default_solver)
        .set_option("threads", 1) // deterministic runs
        .set_option("random_seed", 1234)
        .set_option("time_limit", time_limit.as_secs_f64())
        .set_option("log_to_console", "false");

    for row in &model.constraints {
        let lhs: Expression = row
            .terms
            .iter()
            .map(|&(var, coef)| f64::from(coef) * vars[var])
            .sum();
        let rhs = f64::from(row.rhs);
        let c = match row.cmp {
            Comparison::Eq => constraint!(lhs == rhs),
            Comparison::Le => constraint!(lhs <= rhs),
            Comparison::Ge => constraint!(lhs >= rhs),
        };
        ilp.add_constraint(c);
    }

    info!("Starting ILP solver with a {:.1?} budget...", time_limit);
    let solution = match ilp.solve() {
        Ok(s) => s,
        Err(ResolutionError::Infeasible) => {
            return Err(AllocError::Infeasible {
                reason: "the solver proved the constraint set infeasible".to_string(),
            });
        }
        Err(e) if start_time.elapsed() >= time_limit => {
            warn!("Solver stopped at the time limit: {e}");
            return Err(AllocError::TimedOut {
                seconds: time_limit.as_secs_f64(),
            });
        }
        Err(e) => return Err(AllocError::Solver(e.to_string())),
    };
    let elapsed = start_time.elapsed();

    let selected: Vec<bool> = vars.iter().map(|v| solution.value(*v) > 0.9).collect();
    let violated = model.violations(&selected);
    if !violated.is_empty() {
        warn!(
            "Solver returned a selection violating {} constraint(s), first: {:?}",
            violated.len(),
            violated[0].kind
        );
        return Err(if elapsed >= time_limit {
            AllocError::TimedOut {
                seconds: time_limit.as_secs_f64(),
            }
        } else {
            AllocError::Solver(format!(
                "returned selection violates {} constraint(s)",
                violated.len()
            ))
        });
    }

    let status = if elapsed >= time_limit {
        SolveStatus::Feasible
    } else {
        SolveStatus::Optimal
    };
    let objective = model.score(&selected);
    info!("Solution ({status:?}, score {objective}) found in {elapsed:.2?}");

    Ok(ExactSolution {
        selected,
        status,
        objective,
        elapsed,
    })
}

/// Writes every selected decision into a fresh grid; lab blocks get their
/// label on each period they cover.
pub fn grid_from_selection(model: &Model, selected: &[bool], requirements: &[Requirement]) -> Grid {
    let mut grid = Grid::for_requirements(requirements);
    for decision in model.chosen(selected) {
        let year = requirements[decision.req()].year;
        let cell = match decision {
            Decision::Theory { req, .. } => Cell::Theory(*req),
            Decision::Lab { req, .. } => Cell::Lab(*req),
        };
        for &period in decision.periods() {
            grid.set(year, decision.day(), period, Some(cell));
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LabComponent, LabPolicy, TheoryComponent};
    use crate::geometry::{Day, LabWindow};
    use crate::model::{ModelOptions, PreferenceMode, build};
    use std::collections::BTreeMap;

    fn theory(id: usize, teacher: &str, year: u8, subject: &str, hours: u32) -> Requirement {
        Requirement {
            id,
            teacher: teacher.into(),
            year,
            subject: subject.into(),
            hours,
            is_integrated: false,
            is_lab: false,
            is_external_lab: false,
            preferences: BTreeMap::new(),
            theory: Some(TheoryComponent { hours }),
            lab: None,
        }
    }

    fn relaxed() -> ModelOptions {
        ModelOptions {
            morning_coverage: false,
            ..ModelOptions::default()
        }
    }

    #[test]
    fn places_every_required_session() {
        let mut chem = theory(1, "T2", 1, "Chem", 2);
        chem.is_integrated = true;
        chem.is_external_lab = true;
        chem.lab = Some(LabComponent { duration: 3, policy: LabPolicy::AfternoonOnly });
        let reqs = vec![theory(0, "T1", 1, "Math", 4), chem];

        let model = build(&reqs, relaxed());
        let solution = solve(&model, Duration::from_secs(10)).unwrap();
        assert!(model.violations(&solution.selected).is_empty());

        let grid = grid_from_selection(&model, &solution.selected, &reqs);
        assert_eq!(grid.theory_count(1, 0), 4);
        assert_eq!(grid.theory_count(1, 1), 2);
        let lab_days: Vec<Day> = Day::ALL
            .into_iter()
            .filter(|&d| grid.get(1, d, LabWindow::Afternoon.start()) == Some(Cell::Lab(1)))
            .collect();
        assert_eq!(lab_days.len(), 1);
        for p in LabWindow::Afternoon.periods() {
            assert_eq!(grid.get(1, lab_days[0], *p), Some(Cell::Lab(1)));
        }
    }

    #[test]
    fn soft_preference_is_met_when_free() {
        let mut math = theory(0, "T1", 1, "Math", 3);
        math.preferences.insert(Day::Wed, 3);
        let reqs = vec![math];
        let model = build(&reqs, relaxed());
        let solution = solve(&model, Duration::from_secs(10)).unwrap();
        let grid = grid_from_selection(&model, &solution.selected, &reqs);
        assert_eq!(grid.get(1, Day::Wed, 3), Some(Cell::Theory(0)));
        assert_eq!(solution.objective, crate::model::EXACT_PREFERENCE_WEIGHT);
    }

    #[test]
    fn conflicting_hard_preferences_are_infeasible() {
        let mut math = theory(0, "T1", 1, "Math", 1);
        math.preferences.insert(Day::Mon, 0);
        let mut physics = theory(1, "T1", 2, "Physics", 1);
        physics.preferences.insert(Day::Mon, 0);
        let model = build(
            &[math, physics],
            ModelOptions {
                preference_mode: PreferenceMode::Hard,
                morning_coverage: false,
            },
        );
        let err = solve(&model, Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, AllocError::Infeasible { .. }));
    }

    #[test]
    fn empty_model_solves_trivially() {
        let model = build(&[], ModelOptions::default());
        let solution = solve(&model, Duration::from_secs(1)).unwrap();
        assert!(solution.selected.is_empty());
        assert_eq!(solution.status, SolveStatus::Optimal);
    }
}
