//! Global merge of several k-best enumerators
//!
//! Each group hypothesis contributes its own assignment problem; new
//! hypotheses must come out in decreasing likelihood order across all of
//! them. The queue peeks one solution per stream and repeatedly hands out
//! the globally best one. Streams can be dropped mid-enumeration when
//! pruning invalidates the hypothesis they were built from.

use super::murty::KBestEnumerator;
use super::problem::Solution;

/// One solution with its cell payloads resolved.
#[derive(Debug, Clone)]
pub struct RankedSolution<P> {
    pub total: f64,
    /// Payloads of the picked cells, in canonical cell order
    pub picks: Vec<P>,
}

struct Stream<K, P> {
    key: K,
    enumerator: KBestEnumerator<P>,
    peeked: Option<Solution>,
}

/// Merges the output of several [`KBestEnumerator`]s in global
/// decreasing-total order.
pub struct SolutionQueue<K, P> {
    streams: Vec<Stream<K, P>>,
}

impl<K: Copy + Eq, P: Copy> SolutionQueue<K, P> {
    pub fn new() -> Self {
        SolutionQueue {
            streams: Vec::new(),
        }
    }

    /// Add a stream. Streams added earlier win total ties.
    pub fn push(&mut self, key: K, mut enumerator: KBestEnumerator<P>) {
        let peeked = enumerator.next_solution();
        self.streams.push(Stream {
            key,
            enumerator,
            peeked,
        });
    }

    /// Drop every stream whose key fails the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(K) -> bool) {
        self.streams.retain(|stream| keep(stream.key));
    }

    /// Take the globally best pending solution, with the key of the stream
    /// that produced it.
    pub fn pop(&mut self) -> Option<(K, RankedSolution<P>)> {
        let mut best: Option<usize> = None;
        for (idx, stream) in self.streams.iter().enumerate() {
            let Some(peeked) = &stream.peeked else {
                continue;
            };
            match best {
                None => best = Some(idx),
                Some(b) => {
                    let best_total = self.streams[b].peeked.as_ref().map(|s| s.total);
                    if Some(peeked.total) > best_total {
                        best = Some(idx);
                    }
                }
            }
        }

        let idx = best?;
        let stream = &mut self.streams[idx];
        let solution = stream.peeked.take()?;
        let cells = stream.enumerator.problem().cells();
        let ranked = RankedSolution {
            total: solution.total,
            picks: solution.cells.iter().map(|&i| cells[i].payload).collect(),
        };
        stream.peeked = stream.enumerator.next_solution();
        Some((stream.key, ranked))
    }
}

impl<K: Copy + Eq, P: Copy> Default for SolutionQueue<K, P> {
    fn default() -> Self {
        SolutionQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::AssignmentProblem;

    fn single_cell_problem(gains: &[f64]) -> AssignmentProblem<usize> {
        // One column, no rows: each gain is a parallel no-detection option
        let mut p = AssignmentProblem::new(0, 1);
        for (i, &g) in gains.iter().enumerate() {
            p.push_cell(None, 0, g, i);
        }
        p
    }

    #[test]
    fn test_global_order_across_streams() {
        let mut q: SolutionQueue<u32, usize> = SolutionQueue::new();
        q.push(0, KBestEnumerator::new(single_cell_problem(&[-1.0, -5.0])));
        q.push(1, KBestEnumerator::new(single_cell_problem(&[-2.0, -3.0])));

        let order: Vec<(u32, f64)> = std::iter::from_fn(|| q.pop())
            .map(|(k, s)| (k, s.total))
            .collect();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], (0, -1.0));
        assert_eq!(order[1], (1, -2.0));
        assert_eq!(order[2], (1, -3.0));
        assert_eq!(order[3], (0, -5.0));
    }

    #[test]
    fn test_payloads_resolved() {
        let mut q: SolutionQueue<u32, usize> = SolutionQueue::new();
        q.push(0, KBestEnumerator::new(single_cell_problem(&[-1.0, -5.0])));
        let (_, first) = q.pop().unwrap();
        assert_eq!(first.picks, vec![0]);
        let (_, second) = q.pop().unwrap();
        assert_eq!(second.picks, vec![1]);
    }

    #[test]
    fn test_earlier_stream_wins_ties() {
        let mut q: SolutionQueue<u32, usize> = SolutionQueue::new();
        q.push(7, KBestEnumerator::new(single_cell_problem(&[-1.0])));
        q.push(8, KBestEnumerator::new(single_cell_problem(&[-1.0])));
        assert_eq!(q.pop().unwrap().0, 7);
        assert_eq!(q.pop().unwrap().0, 8);
    }

    #[test]
    fn test_retain_drops_streams() {
        let mut q: SolutionQueue<u32, usize> = SolutionQueue::new();
        q.push(0, KBestEnumerator::new(single_cell_problem(&[-1.0])));
        q.push(1, KBestEnumerator::new(single_cell_problem(&[-2.0])));
        q.retain(|k| k != 0);
        let (k, _) = q.pop().unwrap();
        assert_eq!(k, 1);
        assert!(q.pop().is_none());
    }
}
