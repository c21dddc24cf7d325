//! Data association
//!
//! Ranked assignment of detections to track hypotheses: a generalized
//! assignment problem representation, a min-cost base solver, a lazy k-best
//! enumerator, and a queue that merges several enumerators in global
//! decreasing-likelihood order.

pub mod hungarian;
pub mod murty;
pub mod problem;
pub mod queue;

pub use hungarian::{hungarian as solve_assignment, HungarianResult};
pub use murty::KBestEnumerator;
pub use problem::{AssignmentProblem, Cell, Solution};
pub use queue::{RankedSolution, SolutionQueue};
