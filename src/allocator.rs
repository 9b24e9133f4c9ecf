//! Strategy selection and the top-level `allocate` entry point.

use crate::audit::audit;
use crate::data::{AllocationOutput, RawEntry, Requirement, SemesterType, SolveStatus, Unallocated};
use crate::error::AllocError;
use crate::grid::Grid;
use crate::heuristic::{GreedyOptions, GreedyRun};
use crate::model::{self, ModelOptions, PreferenceMode};
use crate::normalize::normalize;
use crate::postprocess::post_process;
use crate::{report, solver};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A finished grid together with what it could not hold.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub grid: Grid,
    pub unallocated: Vec<Unallocated>,
    pub status: SolveStatus,
    pub strategy: &'static str,
}

/// One way of turning requirements into a grid.
///
/// `requirements[i].id` must equal `i`; [`normalize`] guarantees that.
pub trait Allocator {
    fn name(&self) -> &'static str;
    fn allocate(&self, requirements: &[Requirement]) -> Result<Allocation, AllocError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Exact,
    Heuristic,
    /// Exact first; the heuristic takes over when the exact model fails.
    #[default]
    ExactThenHeuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub strategy: Strategy,
    pub preference_mode: PreferenceMode,
    pub time_limit_secs: f64,
    pub morning_coverage: bool,
    pub first_period_rest: bool,
    pub post_process: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            preference_mode: PreferenceMode::default(),
            time_limit_secs: 10.0,
            morning_coverage: true,
            first_period_rest: true,
            post_process: true,
        }
    }
}

impl AllocatorConfig {
    pub fn time_limit(&self) -> Result<Duration, AllocError> {
        if !(self.time_limit_secs > 0.0) {
            return Err(AllocError::InvalidConfig(format!(
                "time_limit_secs must be positive, got {}",
                self.time_limit_secs
            )));
        }
        Duration::try_from_secs_f64(self.time_limit_secs)
            .map_err(|e| AllocError::InvalidConfig(format!("time_limit_secs: {e}")))
    }

    fn exact(&self) -> Result<ExactAllocator, AllocError> {
        Ok(ExactAllocator {
            options: ModelOptions {
                preference_mode: self.preference_mode,
                morning_coverage: self.morning_coverage,
            },
            time_limit: self.time_limit()?,
            post_process: self.post_process,
        })
    }

    fn greedy(&self) -> GreedyAllocator {
        GreedyAllocator {
            options: GreedyOptions {
                preference_mode: self.preference_mode,
                first_period_rest: self.first_period_rest,
            },
            post_process: self.post_process,
        }
    }

    /// The allocator this configuration asks for.
    pub fn build(&self) -> Result<Box<dyn Allocator + Send + Sync>, AllocError> {
        Ok(match self.strategy {
            Strategy::Exact => Box::new(self.exact()?),
            Strategy::Heuristic => Box::new(self.greedy()),
            Strategy::ExactThenHeuristic => Box::new(Fallback {
                primary: self.exact()?,
                secondary: self.greedy(),
            }),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExactAllocator {
    pub options: ModelOptions,
    pub time_limit: Duration,
    pub post_process: bool,
}

impl Allocator for ExactAllocator {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn allocate(&self, requirements: &[Requirement]) -> Result<Allocation, AllocError> {
        check_ids(requirements)?;
        let model = model::build(requirements, self.options);
        let solution = solver::solve(&model, self.time_limit)?;
        let grid = solver::grid_from_selection(&model, &solution.selected, requirements);
        Ok(finish(grid, requirements, self.post_process, solution.status, self.name()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GreedyAllocator {
    pub options: GreedyOptions,
    pub post_process: bool,
}

impl Allocator for GreedyAllocator {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn allocate(&self, requirements: &[Requirement]) -> Result<Allocation, AllocError> {
        check_ids(requirements)?;
        let grid = GreedyRun::new(requirements, self.options).run();
        Ok(finish(grid, requirements, self.post_process, SolveStatus::BestEffort, self.name()))
    }
}

/// Runs `primary`, and `secondary` whenever `primary` produces no grid.
/// Bad input or configuration is returned as is.
#[derive(Debug, Clone)]
pub struct Fallback<P, S> {
    pub primary: P,
    pub secondary: S,
}

impl<P: Allocator, S: Allocator> Allocator for Fallback<P, S> {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    fn allocate(&self, requirements: &[Requirement]) -> Result<Allocation, AllocError> {
        match self.primary.allocate(requirements) {
            Err(e @ (AllocError::InvalidInput(_) | AllocError::InvalidConfig(_))) => Err(e),
            Err(e) => {
                warn!("{} allocation failed ({e}), falling back to {}", self.primary.name(), self.secondary.name());
                self.secondary.allocate(requirements)
            }
            ok => ok,
        }
    }
}

fn check_ids(requirements: &[Requirement]) -> Result<(), AllocError> {
    match requirements.iter().enumerate().find(|(i, r)| r.id != *i) {
        Some((i, r)) => Err(AllocError::InvalidInput(format!(
            "requirement at index {i} carries id {}",
            r.id
        ))),
        None => Ok(()),
    }
}

fn finish(
    mut grid: Grid,
    requirements: &[Requirement],
    post_process_grid: bool,
    status: SolveStatus,
    strategy: &'static str,
) -> Allocation {
    if post_process_grid {
        post_process(&mut grid, requirements);
    }
    grid.fill_tutorials();
    for violation in audit(&grid, requirements) {
        warn!("Audit: {violation}");
    }
    let unallocated = report::unallocated(&grid, requirements);
    for entry in &unallocated {
        warn!("Unallocated: {entry}");
    }
    info!(
        "{strategy} allocation finished ({status:?}) with {} unallocated requirement(s)",
        unallocated.len()
    );
    Allocation {
        grid,
        unallocated,
        status,
        strategy,
    }
}

/// One allocation job as it arrives over HTTP or from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub requirements: Vec<RawEntry>,
    #[serde(default)]
    pub config: Option<AllocatorConfig>,
    #[serde(default)]
    pub semester: SemesterType,
    /// Restricts the returned timetable to this teacher's sessions.
    #[serde(default)]
    pub teacher: Option<String>,
}

/// Normalizes the entries, runs the configured strategy and renders the result.
/// `defaults` applies when the request carries no config of its own.
pub fn allocate(request: &AllocationRequest, defaults: &AllocatorConfig) -> Result<AllocationOutput, AllocError> {
    let config = request.config.as_ref().unwrap_or(defaults);
    let requirements = normalize(&request.requirements);
    let allocator = config.build()?;
    info!(
        "Allocating {} requirement(s) with the {:?} strategy",
        requirements.len(),
        config.strategy
    );
    let allocation = allocator.allocate(&requirements)?;
    Ok(output(&allocation, &requirements, request.semester, request.teacher.as_deref()))
}

pub fn output(
    allocation: &Allocation,
    requirements: &[Requirement],
    semester: SemesterType,
    teacher: Option<&str>,
) -> AllocationOutput {
    let timetable = match teacher {
        Some(name) => report::teacher_timetable(&allocation.grid, requirements, name),
        None => report::render(&allocation.grid, requirements),
    };
    AllocationOutput {
        timetable,
        unallocated: allocation.unallocated.clone(),
        strategy: allocation.strategy,
        status: allocation.status,
        teacher_subjects: report::teacher_subjects(requirements),
        year_labels: report::year_labels(allocation.grid.years(), semester),
    }
}
