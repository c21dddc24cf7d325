//! Generalized assignment problems over explicit cells
//!
//! A problem is a bag of cells rather than a dense matrix: several cells may
//! share the same (row, column) pair (parallel interpretations of the same
//! pairing, such as "false alarm" vs. "track start"), and a cell may have no
//! row at all (the column's "no detection" option). A solution picks cells
//! so that every real row and every column is covered exactly once.

/// One admissible pick: assigning row `row` (or nothing) to column `col`
/// yields `gain` and produces `payload`.
#[derive(Debug, Clone)]
pub struct Cell<P> {
    /// Real row covered by this cell, or `None` for a no-detection option
    pub row: Option<usize>,
    /// Column covered by this cell
    pub col: usize,
    /// Log-likelihood gained by picking this cell
    pub gain: f64,
    /// Caller data identifying what this pick produces
    pub payload: P,
}

/// A rectangular assignment problem described by its cells.
#[derive(Debug, Clone)]
pub struct AssignmentProblem<P> {
    num_rows: usize,
    num_cols: usize,
    cells: Vec<Cell<P>>,
}

impl<P> AssignmentProblem<P> {
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        AssignmentProblem {
            num_rows,
            num_cols,
            cells: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn cells(&self) -> &[Cell<P>] {
        &self.cells
    }

    /// Add a cell. Insertion order is significant: it is the deterministic
    /// tie-breaker everywhere downstream.
    pub fn push_cell(&mut self, row: Option<usize>, col: usize, gain: f64, payload: P) {
        debug_assert!(row.map_or(true, |r| r < self.num_rows));
        debug_assert!(col < self.num_cols);
        self.cells.push(Cell {
            row,
            col,
            gain,
            payload,
        });
    }
}

/// One solution: a set of cell indices covering every real row and every
/// column exactly once.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Sum of the gains of the picked cells
    pub total: f64,
    /// Indices into [`AssignmentProblem::cells`], ascending
    pub cells: Vec<usize>,
}
