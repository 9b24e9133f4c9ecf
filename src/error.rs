use thiserror::Error;

/// Why an allocation produced no grid at all.
///
/// Capacity shortfall is not in here: the greedy strategy reports it through
/// the unallocated list of a successful result.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AllocError {
    /// The exact model's hard constraints cannot all hold together.
    #[error("no timetable satisfies every hard constraint: {reason}")]
    Infeasible { reason: String },

    /// The solver used its whole budget without finding any feasible grid.
    #[error("solver found no feasible timetable within {seconds:.1}s")]
    TimedOut { seconds: f64 },

    #[error("solver backend failed: {0}")]
    Solver(String),

    #[error("invalid allocator configuration: {0}")]
    InvalidConfig(String),

    /// Requirements handed straight to an allocator must be indexed by id.
    #[error("invalid requirement list: {0}")]
    InvalidInput(String),
}
