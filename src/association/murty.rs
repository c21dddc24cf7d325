//! K-best enumeration of assignment solutions
//!
//! Murty-style partitioning over problem cells, driven lazily from a
//! priority queue: the caller pulls solutions one at a time, in
//! non-increasing total-gain order, and may stop early. Partitioning on
//! cells (rather than on matrix coordinates) keeps parallel cells that
//! share a (row, column) pair distinct, so alternative interpretations of
//! the same pairing are enumerated as separate solutions.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::Array2;

use super::hungarian::hungarian;
use super::problem::{AssignmentProblem, Solution};

/// Priority-queue entry: a solved subproblem awaiting expansion.
#[derive(Debug, Clone)]
struct QueueEntry {
    total: f64,
    /// Insertion sequence number; deterministic tie-breaker
    seq: u64,
    solution: Vec<usize>,
    /// Cells this subproblem must include
    forced: Vec<usize>,
    /// Cells this subproblem must exclude
    banned: Vec<usize>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on total gain; earlier subproblems win ties
        self.total
            .partial_cmp(&other.total)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Lazy k-best solver for one [`AssignmentProblem`].
#[derive(Debug)]
pub struct KBestEnumerator<P> {
    problem: AssignmentProblem<P>,
    heap: BinaryHeap<QueueEntry>,
    seq: u64,
}

impl<P> KBestEnumerator<P> {
    pub fn new(problem: AssignmentProblem<P>) -> Self {
        let mut enumerator = KBestEnumerator {
            problem,
            heap: BinaryHeap::new(),
            seq: 0,
        };
        if let Some((total, solution)) = solve(&enumerator.problem, &[], &[]) {
            enumerator.push_entry(total, solution, Vec::new(), Vec::new());
        }
        enumerator
    }

    pub fn problem(&self) -> &AssignmentProblem<P> {
        &self.problem
    }

    fn push_entry(&mut self, total: f64, solution: Vec<usize>, forced: Vec<usize>, banned: Vec<usize>) {
        self.heap.push(QueueEntry {
            total,
            seq: self.seq,
            solution,
            forced,
            banned,
        });
        self.seq += 1;
    }

    /// Pull the next-best solution, or `None` when exhausted.
    ///
    /// The sequence of returned totals is non-increasing.
    pub fn next_solution(&mut self) -> Option<Solution> {
        let entry = self.heap.pop()?;

        // Partition the remaining solution space around the winner: the
        // t-th child bans the t-th free pick and forces every earlier one,
        // which makes the children pairwise disjoint and jointly complete.
        let free_picks: Vec<usize> = entry
            .solution
            .iter()
            .copied()
            .filter(|cell| !entry.forced.contains(cell))
            .collect();

        for t in 0..free_picks.len() {
            let mut forced = entry.forced.clone();
            forced.extend_from_slice(&free_picks[..t]);
            let mut banned = entry.banned.clone();
            banned.push(free_picks[t]);

            if let Some((total, solution)) = solve(&self.problem, &forced, &banned) {
                self.push_entry(total, solution, forced, banned);
            }
        }

        Some(Solution {
            total: entry.total,
            cells: entry.solution,
        })
    }
}

/// Solve one subproblem to optimality.
///
/// `forced` cells are part of every solution; `banned` cells are removed.
/// Returns the best total and the chosen cell indices (ascending), or
/// `None` when infeasible.
fn solve<P>(
    problem: &AssignmentProblem<P>,
    forced: &[usize],
    banned: &[usize],
) -> Option<(f64, Vec<usize>)> {
    let cells = problem.cells();

    let mut row_taken = vec![false; problem.num_rows()];
    let mut col_taken = vec![false; problem.num_cols()];
    let mut total = 0.0;
    for &cell_idx in forced {
        let cell = &cells[cell_idx];
        if let Some(row) = cell.row {
            debug_assert!(!row_taken[row], "forced cells overlap on a row");
            row_taken[row] = true;
        }
        debug_assert!(!col_taken[cell.col], "forced cells overlap on a column");
        col_taken[cell.col] = true;
        total += cell.gain;
    }

    let free_rows: Vec<usize> = (0..problem.num_rows()).filter(|&r| !row_taken[r]).collect();
    let free_cols: Vec<usize> = (0..problem.num_cols()).filter(|&c| !col_taken[c]).collect();

    if free_rows.len() > free_cols.len() {
        return None;
    }
    if free_cols.is_empty() {
        let mut picked = forced.to_vec();
        picked.sort_unstable();
        return Some((total, picked));
    }

    // Square matrix: one Hungarian row per free column. Its first
    // `free_rows.len()` columns are the real detections, the rest are
    // interchangeable "no detection" slots.
    let n = free_cols.len();
    let nr = free_rows.len();
    let mut cost = Array2::from_elem((n, n), f64::INFINITY);
    let mut choice = Array2::from_elem((n, n), usize::MAX);

    let mut row_pos = vec![usize::MAX; problem.num_rows()];
    for (i, &r) in free_rows.iter().enumerate() {
        row_pos[r] = i;
    }
    let mut col_pos = vec![usize::MAX; problem.num_cols()];
    for (j, &c) in free_cols.iter().enumerate() {
        col_pos[c] = j;
    }

    for (cell_idx, cell) in cells.iter().enumerate() {
        if banned.contains(&cell_idx) || forced.contains(&cell_idx) {
            continue;
        }
        let j = col_pos[cell.col];
        if j == usize::MAX {
            continue;
        }
        match cell.row {
            Some(row) => {
                let i = row_pos[row];
                if i == usize::MAX {
                    continue;
                }
                if -cell.gain < cost[(j, i)] {
                    cost[(j, i)] = -cell.gain;
                    choice[(j, i)] = cell_idx;
                }
            }
            None => {
                // Best no-detection option, replicated across the dummy
                // slots; with as many detections as columns there are none
                if nr < n && -cell.gain < cost[(j, nr)] {
                    for k in nr..n {
                        cost[(j, k)] = -cell.gain;
                        choice[(j, k)] = cell_idx;
                    }
                }
            }
        }
    }

    let result = hungarian(&cost)?;

    let mut picked = forced.to_vec();
    for (j, &k) in result.row_to_col.iter().enumerate() {
        let cell_idx = choice[(j, k)];
        debug_assert_ne!(cell_idx, usize::MAX);
        picked.push(cell_idx);
        total += cells[cell_idx].gain;
    }
    picked.sort_unstable();
    Some((total, picked))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two detections, two leaves, each leaf with a continue option per
    /// detection and one skip option.
    fn two_by_two() -> AssignmentProblem<&'static str> {
        let mut p = AssignmentProblem::new(2, 2);
        p.push_cell(Some(0), 0, -1.0, "a0");
        p.push_cell(Some(1), 0, -4.0, "a1");
        p.push_cell(None, 0, -6.0, "askip");
        p.push_cell(Some(0), 1, -3.0, "b0");
        p.push_cell(Some(1), 1, -2.0, "b1");
        p.push_cell(None, 1, -7.0, "bskip");
        p
    }

    #[test]
    fn test_totals_non_increasing() {
        let mut e = KBestEnumerator::new(two_by_two());
        let mut last = f64::INFINITY;
        let mut count = 0;
        while let Some(sol) = e.next_solution() {
            assert!(sol.total <= last + 1e-12);
            last = sol.total;
            count += 1;
        }
        // Both rows must be covered: either straight or crossed
        assert_eq!(count, 2);
    }

    #[test]
    fn test_best_solution_first() {
        let mut e = KBestEnumerator::new(two_by_two());
        let best = e.next_solution().unwrap();
        // a0 + b1 = -3 beats a1 + b0 = -7
        assert!((best.total + 3.0).abs() < 1e-12);
        assert_eq!(best.cells, vec![0, 4]);
    }

    #[test]
    fn test_parallel_cells_enumerate_separately() {
        // One detection, one leaf, two parallel interpretations plus a
        // skip that leaves the detection uncovered (infeasible alone)
        let mut p = AssignmentProblem::new(1, 1);
        p.push_cell(Some(0), 0, -2.0, "start");
        p.push_cell(Some(0), 0, -5.0, "falarm");
        p.push_cell(None, 0, 0.0, "dummy");
        let mut e = KBestEnumerator::new(p);

        let s1 = e.next_solution().unwrap();
        assert_eq!(s1.cells, vec![0]);
        let s2 = e.next_solution().unwrap();
        assert_eq!(s2.cells, vec![1]);
        assert!(e.next_solution().is_none());
    }

    #[test]
    fn test_matches_brute_force_enumeration() {
        let problem = two_by_two();
        let mut expected = brute_force(&problem);
        expected.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

        let mut e = KBestEnumerator::new(problem);
        let mut got = Vec::new();
        while let Some(sol) = e.next_solution() {
            got.push((sol.total, sol.cells));
        }
        assert_eq!(got.len(), expected.len());
        for ((gt, gc), (et, ec)) in got.iter().zip(expected.iter()) {
            assert!((gt - et).abs() < 1e-12);
            assert_eq!(gc, ec);
        }
    }

    #[test]
    fn test_early_stop_is_cheap() {
        // The caller may abandon the enumeration at any point
        let mut e = KBestEnumerator::new(two_by_two());
        assert!(e.next_solution().is_some());
        drop(e);
    }

    #[test]
    fn test_infeasible_problem_yields_nothing() {
        // A detection with no cell covering it
        let mut p: AssignmentProblem<&str> = AssignmentProblem::new(1, 1);
        p.push_cell(None, 0, 0.0, "dummy");
        let mut e = KBestEnumerator::new(p);
        assert!(e.next_solution().is_none());
    }

    /// Exhaustive reference enumeration over cell subsets.
    fn brute_force(problem: &AssignmentProblem<&'static str>) -> Vec<(f64, Vec<usize>)> {
        let cells = problem.cells();
        let mut out = Vec::new();
        let count = cells.len();
        for mask in 0u32..(1 << count) {
            let picked: Vec<usize> = (0..count).filter(|&i| mask & (1 << i) != 0).collect();
            let mut rows = vec![0usize; problem.num_rows()];
            let mut cols = vec![0usize; problem.num_cols()];
            for &i in &picked {
                if let Some(r) = cells[i].row {
                    rows[r] += 1;
                }
                cols[cells[i].col] += 1;
            }
            if rows.iter().all(|&c| c == 1) && cols.iter().all(|&c| c == 1) {
                let total = picked.iter().map(|&i| cells[i].gain).sum();
                out.push((total, picked));
            }
        }
        out
    }
}
