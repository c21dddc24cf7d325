//! Groups and group hypotheses
//!
//! A group is a maximal set of track trees coupled by shared reports; trees
//! in different groups are completely independent, so each group solves its
//! own assignment problems. A group hypothesis (G-hypo) postulates one leaf
//! per tree in the group; its likelihood is the sum of the postulated
//! leaves' cumulative log-likelihoods.

use smallvec::SmallVec;

use super::arena::Id;
use super::node::{NodeId, TreeId};

pub type HypoId = Id<GroupHypo>;

/// One mutually consistent selection of one leaf per tree in a group.
#[derive(Debug)]
pub struct GroupHypo {
    pub log_likelihood: f64,
    /// Postulated leaves, one per tree, in problem column order
    pub(crate) leaves: SmallVec<[NodeId; 4]>,
    /// Length of `leaves` when this hypothesis' assignment problem was
    /// built. N-scanback pruning removes pruned leaves from `leaves`
    /// automatically, so a shortfall against this count marks the
    /// hypothesis (and its pending problem) as invalidated.
    pub(crate) num_t_hypos_used: usize,
}

impl GroupHypo {
    pub(crate) fn new() -> Self {
        GroupHypo {
            log_likelihood: 0.0,
            leaves: SmallVec::new(),
            num_t_hypos_used: 0,
        }
    }

    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    pub(crate) fn was_reduced(&self) -> bool {
        self.num_t_hypos_used > self.leaves.len()
    }

    pub(crate) fn is_in_use(&self) -> bool {
        !self.leaves.is_empty()
    }
}

/// A set of trees whose leaves share reports, with the ranked hypotheses
/// explaining them.
#[derive(Debug)]
pub struct Group {
    /// Member trees, in installation order
    pub(crate) trees: Vec<TreeId>,
    /// Hypotheses, kept sorted by decreasing log-likelihood
    pub(crate) hypos: Vec<HypoId>,
}

impl Group {
    pub(crate) fn singleton(tree: TreeId, hypo: HypoId) -> Self {
        Group {
            trees: vec![tree],
            hypos: vec![hypo],
        }
    }

    pub fn num_hypos(&self) -> usize {
        self.hypos.len()
    }

    pub fn trees(&self) -> &[TreeId] {
        &self.trees
    }
}
