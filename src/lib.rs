//! Weekly class timetable allocation: an exact ILP strategy with a greedy
//! fallback, shared clean-up, and an HTTP surface.

pub mod allocator;
pub mod audit;
pub mod data;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod heuristic;
pub mod ledger;
pub mod model;
pub mod normalize;
pub mod postprocess;
pub mod report;
pub mod server;
pub mod solver;

pub use allocator::{AllocationRequest, Allocator, AllocatorConfig, Strategy, allocate};
pub use data::{AllocationOutput, RawEntry, Requirement, Timetable, Unallocated};
pub use error::AllocError;
