//! Hungarian algorithm for optimal assignment
//!
//! Minimum-cost square assignment in the shortest-augmenting-path
//! formulation with row/column potentials. `f64::INFINITY` marks forbidden
//! pairings; a problem with no finite perfect matching is reported as
//! infeasible rather than solved through a forbidden edge.

use ndarray::Array2;

const UNASSIGNED: usize = usize::MAX;

/// Result of a feasible assignment.
#[derive(Debug, Clone)]
pub struct HungarianResult {
    /// Column assigned to each row
    pub row_to_col: Vec<usize>,
    /// Total cost of the assignment
    pub cost: f64,
}

/// Solve the square min-cost assignment problem.
///
/// Returns `None` when no perfect matching over finite-cost cells exists.
/// Ties are broken toward lower column indices, so the result is a
/// deterministic function of the input.
pub fn hungarian(cost: &Array2<f64>) -> Option<HungarianResult> {
    let n = cost.nrows();
    debug_assert_eq!(n, cost.ncols(), "assignment matrix must be square");
    if n == 0 {
        return Some(HungarianResult {
            row_to_col: Vec::new(),
            cost: 0.0,
        });
    }

    let mut u = vec![0.0f64; n];
    // Column potentials, with a virtual column n that hosts the row
    // currently being augmented
    let mut v = vec![0.0f64; n + 1];
    // p[j]: row matched to column j
    let mut p = vec![UNASSIGNED; n + 1];

    for row in 0..n {
        p[n] = row;
        let mut j0 = n;
        let mut minv = vec![f64::INFINITY; n];
        let mut way = vec![n; n];
        let mut used = vec![false; n + 1];

        // Grow alternating paths until a free column is reached
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = UNASSIGNED;

            for j in 0..n {
                if used[j] {
                    continue;
                }
                let reduced = cost[(i0, j)] - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            if !delta.is_finite() {
                // Every remaining edge is forbidden
                return None;
            }

            for j in 0..n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            u[p[n]] += delta;
            v[n] -= delta;

            j0 = j1;
            if p[j0] == UNASSIGNED {
                break;
            }
        }

        // Flip the matching along the path back to the virtual column
        while j0 != n {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
        }
    }

    let mut row_to_col = vec![UNASSIGNED; n];
    let mut total = 0.0;
    for j in 0..n {
        let i = p[j];
        row_to_col[i] = j;
        total += cost[(i, j)];
    }
    if !total.is_finite() {
        return None;
    }

    Some(HungarianResult {
        row_to_col,
        cost: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hungarian_simple() {
        let cost = Array2::from_shape_vec(
            (3, 3),
            vec![
                1.0, 2.0, 3.0, //
                2.0, 4.0, 6.0, //
                3.0, 6.0, 9.0,
            ],
        )
        .unwrap();

        let result = hungarian(&cost).unwrap();
        // Optimal: (0,2), (1,1), (2,0) with cost 3 + 4 + 3 = 10
        assert_eq!(result.row_to_col, vec![2, 1, 0]);
        assert!((result.cost - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_hungarian_with_forbidden_cells() {
        let cost = Array2::from_shape_vec(
            (2, 2),
            vec![
                1.0,
                f64::INFINITY,
                f64::INFINITY,
                2.0,
            ],
        )
        .unwrap();

        let result = hungarian(&cost).unwrap();
        assert_eq!(result.row_to_col, vec![0, 1]);
        assert!((result.cost - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_hungarian_reports_infeasible() {
        let cost = Array2::from_shape_vec(
            (2, 2),
            vec![
                f64::INFINITY,
                f64::INFINITY,
                1.0,
                2.0,
            ],
        )
        .unwrap();
        assert!(hungarian(&cost).is_none());
    }

    #[test]
    fn test_hungarian_prefers_low_column_on_ties() {
        let cost = Array2::from_elem((2, 2), 1.0);
        let result = hungarian(&cost).unwrap();
        assert_eq!(result.row_to_col, vec![0, 1]);
    }

    #[test]
    fn test_hungarian_empty() {
        let cost = Array2::from_elem((0, 0), 0.0);
        let result = hungarian(&cost).unwrap();
        assert!(result.row_to_col.is_empty());
        assert_eq!(result.cost, 0.0);
    }

    #[test]
    fn test_hungarian_matches_brute_force() {
        // 4x4 against explicit permutation enumeration
        let data = vec![
            7.0, 5.0, 9.0, 8.0, //
            3.0, 4.0, 6.0, 2.0, //
            5.0, 8.0, 1.0, 4.0, //
            9.0, 2.0, 3.0, 7.0,
        ];
        let cost = Array2::from_shape_vec((4, 4), data).unwrap();
        let result = hungarian(&cost).unwrap();

        let mut best = f64::INFINITY;
        let perms = permutations(4);
        for perm in perms {
            let total: f64 = perm.iter().enumerate().map(|(i, &j)| cost[(i, j)]).sum();
            if total < best {
                best = total;
            }
        }
        assert!((result.cost - best).abs() < 1e-12);
    }

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 1 {
            return vec![vec![0]];
        }
        let mut out = Vec::new();
        for sub in permutations(n - 1) {
            for pos in 0..n {
                let mut perm: Vec<usize> = sub.iter().map(|&x| x + usize::from(x >= pos)).collect();
                perm.insert(0, pos);
                out.push(perm);
            }
        }
        out
    }
}
