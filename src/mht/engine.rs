//! The multiple hypothesis tracking engine
//!
//! One `scan` consumes one queued detection batch and runs the full
//! iteration: grow track trees, regroup them, generate ranked group
//! hypotheses per group under three pruning strategies, reclaim everything
//! no hypothesis needs anymore, and verify track-tree roots that pruning
//! has made unambiguous.

use std::collections::VecDeque;

use crate::association::queue::RankedSolution;
use crate::association::{AssignmentProblem, KBestEnumerator, SolutionQueue};
use crate::models::{MotionModel, MotionState, ScanContext};
use crate::output::{CornerTrack, ElementCode, FalseAlarm, TrackElement, TrackStore};

use super::arena::{Arena, Id};
use super::group::{Group, GroupHypo, HypoId};
use super::node::{Node, NodeId, NodeKind, NodeState, TrackTree, TreeId};
use super::report::{DetectionBatch, Report};

/// What one call to [`MhtTracker::scan`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// One batch was dequeued and processed
    Progressed,
    /// The batch queue was empty; no state was changed
    Idle,
}

/// Size counters for host-side logging.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub trees: usize,
    pub active_leaves: usize,
    pub groups: usize,
    pub group_hypos: usize,
    pub max_group_hypos: usize,
}

/// Multiple hypothesis tracker over a list of motion models.
pub struct MhtTracker<M: MotionModel> {
    max_depth: usize,
    log_min_g_hypo_ratio: f64,
    max_g_hypos: usize,
    falarm_log_likelihood: f64,
    scan_end_time: i64,

    models: Vec<M>,
    current_time: i64,
    last_track_id: u32,

    nodes: Arena<Node>,
    states: Arena<NodeState<M::State>>,
    trees: Arena<TrackTree>,
    /// Live trees in installation order
    tree_order: Vec<TreeId>,
    groups: Vec<Group>,
    hypos: Arena<GroupHypo>,
    reports: Arena<Report>,
    /// Admitted reports in admission order
    old_reports: Vec<Id<Report>>,
    new_reports: Vec<Id<Report>>,
    batches: VecDeque<DetectionBatch>,
    first_scan: bool,
    active_leaves: Vec<NodeId>,
    store: TrackStore,
}

impl<M: MotionModel> MhtTracker<M> {
    pub fn new(
        max_depth: usize,
        min_g_hypo_ratio: f64,
        max_g_hypos: usize,
        models: Vec<M>,
        false_alarm_log_likelihood: f64,
        scan_end_time: i64,
    ) -> Self {
        MhtTracker {
            max_depth,
            log_min_g_hypo_ratio: min_g_hypo_ratio.ln(),
            max_g_hypos,
            falarm_log_likelihood: false_alarm_log_likelihood,
            scan_end_time,
            models,
            current_time: 0,
            last_track_id: 0,
            nodes: Arena::new(),
            states: Arena::new(),
            trees: Arena::new(),
            tree_order: Vec::new(),
            groups: Vec::new(),
            hypos: Arena::new(),
            reports: Arena::new(),
            old_reports: Vec::new(),
            new_reports: Vec::new(),
            batches: VecDeque::new(),
            first_scan: true,
            active_leaves: Vec::new(),
            store: TrackStore::new(),
        }
    }

    /// Enqueue one frame's detections for a future scan.
    pub fn add_reports(&mut self, batch: DetectionBatch) {
        self.batches.push_back(batch);
    }

    pub fn current_time(&self) -> i64 {
        self.current_time
    }

    pub fn scan_end_time(&self) -> i64 {
        self.scan_end_time
    }

    /// True while any track tree is alive.
    pub fn is_in_use(&self) -> bool {
        !self.tree_order.is_empty()
    }

    pub fn tracks(&self) -> &[CornerTrack] {
        self.store.tracks()
    }

    pub fn false_alarms(&self) -> &[FalseAlarm] {
        self.store.false_alarms()
    }

    pub fn stats(&self) -> EngineStats {
        let group_hypos: usize = self.groups.iter().map(|g| g.num_hypos()).sum();
        let max_group_hypos = self.groups.iter().map(|g| g.num_hypos()).max().unwrap_or(0);
        EngineStats {
            trees: self.tree_order.len(),
            active_leaves: self.active_leaves.len(),
            groups: self.groups.len(),
            group_hypos,
            max_group_hypos,
        }
    }

    /// Run one iteration of the MHT algorithm.
    pub fn scan(&mut self) -> ScanOutcome {
        let Some(batch) = self.batches.pop_front() else {
            return ScanOutcome::Idle;
        };
        let ctx = ScanContext {
            time_delta: batch.time_delta,
            first_scan: self.first_scan,
        };

        self.measure_and_validate(batch, &ctx);
        self.current_time += 1;

        self.active_leaves.clear();
        self.import_new_reports();

        if self.tree_order.is_empty() {
            self.first_scan = false;
            return ScanOutcome::Progressed;
        }

        self.make_new_groups();
        self.find_group_labels();
        self.split_groups();
        self.merge_groups();

        self.prune_and_hypothesize_all();
        self.remove_unused_nodes();
        self.verify_tree_roots();

        self.remove_unused_trees();
        self.remove_unused_reports();
        self.remove_unused_groups();

        self.rebuild_active_leaves();

        #[cfg(debug_assertions)]
        self.check_consistency();

        let stats = self.stats();
        log::debug!(
            "scan {}: {} trees, {} active leaves, {} groups, {} group hypos",
            self.current_time,
            stats.trees,
            stats.active_leaves,
            stats.groups,
            stats.group_hypos
        );

        self.first_scan = false;
        ScanOutcome::Progressed
    }

    /// Drain the remaining trees, verifying what pruning would eventually
    /// have verified, with the depth limit descending to zero.
    pub fn clear(&mut self) {
        for depth in (0..=self.max_depth as i64).rev() {
            for gi in 0..self.groups.len() {
                self.clear_group(gi, depth);
            }
            self.verify_tree_roots();
            self.remove_unused_trees();
            self.remove_unused_reports();
            self.remove_unused_groups();
        }

        // Whatever is left is one root per tree; verify and drop it
        for tree_id in self.tree_order.clone() {
            if let Some(root) = self.trees[tree_id].root {
                if self.nodes[root].must_verify {
                    self.emit_verification(tree_id, root);
                }
                self.remove_subtree(root);
            }
            self.trees.remove(tree_id);
        }
        self.tree_order.clear();

        let groups = std::mem::take(&mut self.groups);
        for group in groups {
            for h in group.hypos {
                if self.hypos.contains(h) {
                    self.remove_hypo(h);
                }
            }
        }
        for r in std::mem::take(&mut self.old_reports) {
            self.reports.remove(r);
        }
        self.active_leaves.clear();
    }

    // ------------------------------------------------------------------
    // Scan step 1: report intake and track-tree growth
    // ------------------------------------------------------------------

    fn measure_and_validate(&mut self, batch: DetectionBatch, ctx: &ScanContext) {
        for detection in batch.detections {
            let report = Report::new(detection, self.falarm_log_likelihood);
            self.new_reports.push(self.reports.insert(report));
        }

        // Every active leaf grows its default children plus one set of
        // report-linked children per new report
        let leaves = self.active_leaves.clone();
        let new_reports = self.new_reports.clone();
        for leaf in leaves {
            self.make_default_children(leaf, ctx);
            for &report in &new_reports {
                self.make_report_children(leaf, report, ctx);
            }
        }

        // A fresh tree for every report, rooted one step in the past so its
        // leaves line up with the leaves of the existing trees
        for report in new_reports {
            let root_time = self.current_time - 1;
            let root = self.nodes.insert(Node::new(NodeKind::Root, 0.0, None));
            let tree = self
                .trees
                .insert(TrackTree::new(root, self.last_track_id, root_time));
            self.last_track_id += 1;
            self.nodes[root].tree = tree;
            self.nodes[root].time_stamp = root_time;
            self.tree_order.push(tree);

            self.make_default_children(root, ctx);
            self.make_report_children(root, report, ctx);
        }
    }

    fn import_new_reports(&mut self) {
        for (row, &report) in self.new_reports.iter().enumerate() {
            self.reports[report].row = row;
        }
        let mut incoming = std::mem::take(&mut self.new_reports);
        self.old_reports.append(&mut incoming);
    }

    fn install_child(
        &mut self,
        parent: NodeId,
        mut node: Node,
        state: Option<NodeState<M::State>>,
    ) -> NodeId {
        node.tree = self.nodes[parent].tree;
        node.time_stamp = self.nodes[parent].time_stamp + 1;
        node.parent = Some(parent);
        if let Some(state) = state {
            node.state_slot = Some(self.states.insert(state).raw());
        }
        let report = node.report;
        let id = self.nodes.insert(node);
        self.nodes[parent].children.push(id);
        if let Some(report) = report {
            self.reports[report].node_links.push(id);
        }
        id
    }

    /// Children that do not depend on any report.
    fn make_default_children(&mut self, parent: NodeId, ctx: &ScanContext) {
        let kind = self.nodes[parent].kind;
        let parent_ll = self.nodes[parent].log_likelihood;

        match kind {
            NodeKind::Root | NodeKind::Dummy | NodeKind::FalseAlarm | NodeKind::End => {
                // A dummy keeps a finished or undecided branch growing with
                // the likelihood of its parent
                self.install_child(parent, Node::new(NodeKind::Dummy, parent_ll, None), None);
            }
            NodeKind::Start | NodeKind::Continue | NodeKind::Skip => {
                let Some(slot) = self.nodes[parent].state_slot else {
                    debug_assert!(false, "state node without a state");
                    return;
                };
                let (model_idx, end_ll, continue_ll, skip_ll, skip_states) = {
                    let ns = &self.states[Id::from_raw(slot)];
                    let model = &self.models[ns.model];
                    let end_ll = model.end_log_likelihood(&ns.state);
                    let continue_ll = model.continue_log_likelihood(&ns.state);
                    let skip_ll = model.skip_log_likelihood(&ns.state);

                    let mut skip_states = Vec::new();
                    if continue_ll.is_finite() {
                        let count = model.begin_new_states(Some(&ns.state), None, ctx);
                        for i in 0..count {
                            if let Some(state) = model.new_state(i, Some(&ns.state), None, ctx) {
                                skip_states.push(state);
                            }
                        }
                        model.end_new_states();
                    }
                    (ns.model, end_ll, continue_ll, skip_ll, skip_states)
                };

                if end_ll.is_finite() {
                    self.install_child(
                        parent,
                        Node::new(NodeKind::End, parent_ll + skip_ll + end_ll, None),
                        None,
                    );
                }
                for state in skip_states {
                    let ll = parent_ll + continue_ll + skip_ll + state.log_likelihood();
                    self.install_child(
                        parent,
                        Node::new(NodeKind::Skip, ll, None),
                        Some(NodeState {
                            model: model_idx,
                            state,
                        }),
                    );
                }
            }
        }
    }

    /// Children linked to one report.
    fn make_report_children(&mut self, parent: NodeId, report: Id<Report>, ctx: &ScanContext) {
        let kind = self.nodes[parent].kind;

        match kind {
            NodeKind::Root => {
                let falarm_ll = self.reports[report].falarm_log_likelihood;
                self.install_child(
                    parent,
                    Node::new(NodeKind::FalseAlarm, falarm_ll, Some(report)),
                    None,
                );

                for model_idx in 0..self.models.len() {
                    let start_states = {
                        let model = &self.models[model_idx];
                        let rep = &self.reports[report];
                        let count = model.begin_new_states(None, Some(rep), ctx);
                        let mut out = Vec::new();
                        for i in 0..count {
                            if let Some(state) = model.new_state(i, None, Some(rep), ctx) {
                                out.push(state);
                            }
                        }
                        model.end_new_states();
                        out
                    };
                    for state in start_states {
                        let ll = state.log_likelihood();
                        self.install_child(
                            parent,
                            Node::new(NodeKind::Start, ll, Some(report)),
                            Some(NodeState {
                                model: model_idx,
                                state,
                            }),
                        );
                    }
                }
            }
            NodeKind::Start | NodeKind::Continue | NodeKind::Skip => {
                let Some(slot) = self.nodes[parent].state_slot else {
                    debug_assert!(false, "state node without a state");
                    return;
                };
                let parent_ll = self.nodes[parent].log_likelihood;
                let (model_idx, continue_ll, detect_ll, new_states) = {
                    let ns = &self.states[Id::from_raw(slot)];
                    let model = &self.models[ns.model];
                    let rep = &self.reports[report];
                    let continue_ll = model.continue_log_likelihood(&ns.state);
                    let detect_ll = model.detect_log_likelihood(&ns.state);

                    let count = model.begin_new_states(Some(&ns.state), Some(rep), ctx);
                    let mut out = Vec::new();
                    for i in 0..count {
                        if let Some(state) = model.new_state(i, Some(&ns.state), Some(rep), ctx) {
                            out.push(state);
                        }
                    }
                    model.end_new_states();
                    (ns.model, continue_ll, detect_ll, out)
                };

                for state in new_states {
                    let ll = parent_ll + continue_ll + detect_ll + state.log_likelihood();
                    self.install_child(
                        parent,
                        Node::new(NodeKind::Continue, ll, Some(report)),
                        Some(NodeState {
                            model: model_idx,
                            state,
                        }),
                    );
                }
            }
            NodeKind::Dummy | NodeKind::FalseAlarm | NodeKind::End => {}
        }
    }

    // ------------------------------------------------------------------
    // Scan steps 4-7: grouping
    // ------------------------------------------------------------------

    /// Wrap every not-yet-grouped tree in a singleton group whose only
    /// hypothesis postulates the tree root.
    fn make_new_groups(&mut self) {
        for tree_id in self.tree_order.clone() {
            if self.trees[tree_id].grouped {
                continue;
            }
            self.trees[tree_id].grouped = true;
            let root = self.trees[tree_id]
                .root
                .expect("a new tree always has a root");

            let mut hypo = GroupHypo::new();
            hypo.log_likelihood = self.nodes[root].log_likelihood;
            hypo.leaves.push(root);
            let hypo_id = self.hypos.insert(hypo);
            self.nodes[root].hypo_links.push(hypo_id);
            self.groups.push(Group::singleton(tree_id, hypo_id));
        }
    }

    /// Connected-component labeling over the bipartite report/tree graph.
    ///
    /// Iterating old reports in admission order, each unlabeled report
    /// floods its component: its trees, their reports, transitively.
    /// Report-free trees get fresh singleton labels afterwards.
    fn find_group_labels(&mut self) {
        for &tree in &self.tree_order {
            self.trees[tree].group_label = -1;
        }
        for &report in &self.old_reports {
            self.reports[report].group_label = 0;
        }

        let mut next_label = 1i64;
        for idx in 0..self.old_reports.len() {
            let seed = self.old_reports[idx];
            if self.reports[seed].group_label != 0 {
                continue;
            }
            let label = next_label;
            next_label += 1;

            self.reports[seed].group_label = label;
            let mut pending = vec![seed];
            while let Some(report) = pending.pop() {
                let links = self.reports[report].node_links.clone();
                for node in links {
                    let tree = self.nodes[node].tree;
                    if self.trees[tree].group_label == label {
                        continue;
                    }
                    debug_assert_eq!(self.trees[tree].group_label, -1);
                    self.trees[tree].group_label = label;

                    for tree_report in self.tree_reports(tree) {
                        if self.reports[tree_report].group_label != label {
                            self.reports[tree_report].group_label = label;
                            pending.push(tree_report);
                        }
                    }
                }
            }
        }

        for tree in self.tree_order.clone() {
            if self.trees[tree].group_label == -1 {
                self.trees[tree].group_label = next_label;
                next_label += 1;
            }
        }
    }

    /// Reports referenced anywhere in a tree.
    fn tree_reports(&self, tree: TreeId) -> Vec<Id<Report>> {
        let mut out = Vec::new();
        let Some(root) = self.trees[tree].root else {
            return out;
        };
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            if let Some(report) = self.nodes[node].report {
                if !out.contains(&report) {
                    out.push(report);
                }
            }
            pending.extend(self.nodes[node].children.iter().copied());
        }
        out
    }

    /// Split every group whose trees no longer share reports, per the fresh
    /// labels. Hypotheses split with their groups; duplicates collapse.
    fn split_groups(&mut self) {
        let count = self.groups.len();
        for gi in 0..count {
            let trees = self.groups[gi].trees.clone();
            let mut labels: Vec<i64> = Vec::new();
            for &tree in &trees {
                let label = self.trees[tree].group_label;
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
            if labels.len() <= 1 {
                continue;
            }

            let old_hypos = self.groups[gi].hypos.clone();
            let mut parts: Vec<Group> = labels
                .iter()
                .map(|&label| Group {
                    trees: trees
                        .iter()
                        .copied()
                        .filter(|&t| self.trees[t].group_label == label)
                        .collect(),
                    hypos: Vec::new(),
                })
                .collect();
            let mut part_keys: Vec<Vec<Vec<NodeId>>> = vec![Vec::new(); parts.len()];

            for &hypo in &old_hypos {
                let leaves = self.hypos[hypo].leaves.clone();
                for (pi, &label) in labels.iter().enumerate() {
                    let part_leaves: Vec<NodeId> = leaves
                        .iter()
                        .copied()
                        .filter(|&leaf| {
                            self.trees[self.nodes[leaf].tree].group_label == label
                        })
                        .collect();
                    if part_leaves.is_empty() {
                        continue;
                    }
                    let mut key = part_leaves.clone();
                    key.sort_unstable();
                    if part_keys[pi].contains(&key) {
                        continue;
                    }
                    part_keys[pi].push(key);

                    let total = part_leaves
                        .iter()
                        .map(|&leaf| self.nodes[leaf].log_likelihood)
                        .sum();
                    let id = self.install_hypo(part_leaves, total);
                    parts[pi].hypos.push(id);
                }
            }

            for hypo in old_hypos {
                self.remove_hypo(hypo);
            }
            for part in &mut parts {
                self.sort_hypos(&mut part.hypos);
            }

            let mut iter = parts.into_iter();
            self.groups[gi] = iter.next().expect("split produced at least one part");
            self.groups.extend(iter);
        }
    }

    /// Merge groups that received the same label. The combined hypothesis
    /// list is the likelihood-sorted cross product, capped by ratio and
    /// k-best pruning.
    fn merge_groups(&mut self) {
        let mut gi = 0;
        while gi < self.groups.len() {
            let label = self.group_label(gi);
            let mut gj = gi + 1;
            while gj < self.groups.len() {
                if self.group_label(gj) == label {
                    self.merge_group_pair(gi, gj);
                    self.groups.remove(gj);
                } else {
                    gj += 1;
                }
            }
            gi += 1;
        }
    }

    fn group_label(&self, gi: usize) -> i64 {
        let tree = *self.groups[gi]
            .trees
            .first()
            .expect("live groups have trees");
        self.trees[tree].group_label
    }

    fn merge_group_pair(&mut self, gi: usize, gj: usize) {
        let hypos_a = self.groups[gi].hypos.clone();
        let hypos_b = self.groups[gj].hypos.clone();

        let mut candidates: Vec<(f64, HypoId, HypoId)> = Vec::new();
        for &a in &hypos_a {
            for &b in &hypos_b {
                candidates.push((
                    self.hypos[a].log_likelihood + self.hypos[b].log_likelihood,
                    a,
                    b,
                ));
            }
        }
        candidates.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap_or(std::cmp::Ordering::Equal));

        let best = candidates.first().map(|c| c.0).unwrap_or(f64::NEG_INFINITY);
        let mut merged: Vec<HypoId> = Vec::new();
        for (total, a, b) in candidates {
            if merged.len() >= self.max_g_hypos {
                break;
            }
            if total < best + self.log_min_g_hypo_ratio {
                break;
            }
            let mut leaves: Vec<NodeId> = self.hypos[a].leaves.to_vec();
            leaves.extend(self.hypos[b].leaves.iter().copied());
            merged.push(self.install_hypo(leaves, total));
        }

        for hypo in hypos_a.into_iter().chain(hypos_b) {
            self.remove_hypo(hypo);
        }

        let moved_trees = std::mem::take(&mut self.groups[gj].trees);
        self.groups[gi].trees.extend(moved_trees);
        self.groups[gi].hypos = merged;
    }

    // ------------------------------------------------------------------
    // Scan step 8: per-group pruning and hypothesis generation
    // ------------------------------------------------------------------

    fn prune_and_hypothesize_all(&mut self) {
        for gi in 0..self.groups.len() {
            self.prune_and_hypothesize(gi);
        }
    }

    fn prune_and_hypothesize(&mut self, gi: usize) {
        let old_hypos = self.groups[gi].hypos.clone();
        if old_hypos.is_empty() {
            return;
        }

        // Build every surviving hypothesis' assignment problem up front and
        // feed them all into one globally-merged solution queue
        let mut queue: SolutionQueue<HypoId, NodeId> = SolutionQueue::new();
        for &hypo in &old_hypos {
            self.hypos[hypo].num_t_hypos_used = self.hypos[hypo].leaves.len();
        }
        for &hypo in &old_hypos {
            let problem = self.build_problem(hypo);
            queue.push(hypo, KBestEnumerator::new(problem));
        }

        let mut new_hypos: Vec<HypoId> = Vec::new();
        let mut new_keys: Vec<Vec<NodeId>> = Vec::new();

        // The globally best solution anchors N-scanback pruning
        let best_total = match queue.pop() {
            Some((_, RankedSolution { total, picks })) => {
                let anchor = self.install_hypo(picks.clone(), total);
                let mut key = picks;
                key.sort_unstable();
                new_keys.push(key);
                new_hypos.push(anchor);

                self.n_scanback_prune(gi, anchor, self.max_depth as i64);
                // Old hypotheses that lost a postulated node to the pruning
                // are invalid, together with their pending problems
                queue.retain(|hypo| !self.hypos[hypo].was_reduced());
                total
            }
            None => f64::NEG_INFINITY,
        };

        while new_hypos.len() < self.max_g_hypos {
            let Some((hypo, RankedSolution { total, picks })) = queue.pop() else {
                break;
            };
            if self.hypos[hypo].was_reduced() {
                continue;
            }
            if total < best_total + self.log_min_g_hypo_ratio {
                break;
            }
            let mut key = picks.clone();
            key.sort_unstable();
            if new_keys.contains(&key) {
                continue;
            }
            new_keys.push(key);
            new_hypos.push(self.install_hypo(picks, total));
        }

        for hypo in old_hypos {
            self.remove_hypo(hypo);
        }
        self.groups[gi].hypos = new_hypos;
        self.recompute_hypo_likelihoods(gi);
    }

    /// Build the assignment problem for one old group hypothesis: one
    /// column per postulated leaf, one row per new report referenced by
    /// those leaves' children, one cell per child.
    fn build_problem(&self, hypo: HypoId) -> AssignmentProblem<NodeId> {
        let leaves = &self.hypos[hypo].leaves;

        let mut row_reports: Vec<Id<Report>> = Vec::new();
        for &leaf in leaves {
            for &child in &self.nodes[leaf].children {
                if let Some(report) = self.nodes[child].report {
                    if !row_reports.contains(&report) {
                        row_reports.push(report);
                    }
                }
            }
        }
        // Row numbers were assigned in batch order at import
        row_reports.sort_by_key(|&report| self.reports[report].row);

        let mut problem = AssignmentProblem::new(row_reports.len(), leaves.len());
        for (col, &leaf) in leaves.iter().enumerate() {
            for &child in &self.nodes[leaf].children {
                let row = self.nodes[child].report.map(|report| {
                    row_reports
                        .iter()
                        .position(|&r| r == report)
                        .expect("child report was collected above")
                });
                problem.push_cell(row, col, self.nodes[child].log_likelihood, child);
            }
        }
        problem
    }

    /// Collapse every over-depth tree of the group onto the root child that
    /// leads to the anchor hypothesis' leaf.
    fn n_scanback_prune(&mut self, gi: usize, anchor: HypoId, depth_limit: i64) {
        let trees = self.groups[gi].trees.clone();
        let anchor_leaves = self.hypos[anchor].leaves.clone();

        for tree_id in trees {
            let Some(root) = self.trees[tree_id].root else {
                continue;
            };
            if self.tree_depth(tree_id) <= depth_limit {
                continue;
            }
            let Some(&leaf) = anchor_leaves
                .iter()
                .find(|&&leaf| self.nodes[leaf].tree == tree_id)
            else {
                debug_assert!(false, "anchor hypothesis misses a tree of its group");
                continue;
            };

            // Walk up from the leaf to the child of the root
            let mut keep = leaf;
            while let Some(parent) = self.nodes[keep].parent {
                if parent == root {
                    break;
                }
                keep = parent;
            }

            let children = self.nodes[root].children.clone();
            for child in children {
                if child != keep {
                    self.remove_subtree(child);
                }
            }
        }
    }

    fn tree_depth(&self, tree: TreeId) -> i64 {
        // Leaves carry timestamp current_time - 1 after a scan
        (self.current_time - 1) - self.trees[tree].root_time
    }

    fn install_hypo(&mut self, leaves: Vec<NodeId>, log_likelihood: f64) -> HypoId {
        let mut hypo = GroupHypo::new();
        hypo.log_likelihood = log_likelihood;
        hypo.leaves.extend(leaves.iter().copied());
        let id = self.hypos.insert(hypo);
        for leaf in leaves {
            self.nodes[leaf].hypo_links.push(id);
        }
        id
    }

    fn remove_hypo(&mut self, hypo: HypoId) {
        let leaves = self.hypos[hypo].leaves.clone();
        for leaf in leaves {
            if self.nodes.contains(leaf) {
                self.nodes[leaf].hypo_links.retain(|h| *h != hypo);
            }
        }
        self.hypos.remove(hypo);
    }

    fn recompute_hypo_likelihoods(&mut self, gi: usize) {
        let hypos = self.groups[gi].hypos.clone();
        for &hypo in &hypos {
            let total = self.hypos[hypo]
                .leaves
                .iter()
                .map(|&leaf| self.nodes[leaf].log_likelihood)
                .sum();
            self.hypos[hypo].log_likelihood = total;
        }
        let mut sorted = hypos;
        self.sort_hypos(&mut sorted);
        self.groups[gi].hypos = sorted;
    }

    fn sort_hypos(&self, hypos: &mut [HypoId]) {
        hypos.sort_by(|&a, &b| {
            self.hypos[b]
                .log_likelihood
                .partial_cmp(&self.hypos[a].log_likelihood)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    // ------------------------------------------------------------------
    // Scan steps 9-11: reclamation and verification
    // ------------------------------------------------------------------

    /// Remove leaves no hypothesis postulates, and internal nodes left
    /// childless, bottom-up.
    fn remove_unused_nodes(&mut self) {
        for tree_id in self.tree_order.clone() {
            if let Some(root) = self.trees[tree_id].root {
                if self.prune_unused(root) {
                    self.trees[tree_id].root = None;
                }
            }
        }
    }

    fn prune_unused(&mut self, node: NodeId) -> bool {
        let children = self.nodes[node].children.clone();
        for child in children {
            self.prune_unused(child);
        }
        if self.nodes[node].is_in_use() {
            false
        } else {
            self.unlink_node(node);
            true
        }
    }

    /// Pop roots that pruning left with a single continuation, emitting
    /// their verification events.
    fn verify_tree_roots(&mut self) {
        for tree_id in self.tree_order.clone() {
            let Some(mut root) = self.trees[tree_id].root else {
                continue;
            };
            loop {
                let (single_child, ends_track, must_verify) = {
                    let node = &self.nodes[root];
                    (node.children.len() == 1, node.ends_track, node.must_verify)
                };
                if !single_child || ends_track {
                    break;
                }
                if must_verify {
                    self.emit_verification(tree_id, root);
                }
                let child = self.nodes[root].children[0];
                self.nodes[child].parent = None;
                self.nodes[root].children.clear();
                self.unlink_node(root);

                root = child;
                self.trees[tree_id].root = Some(root);
                self.trees[tree_id].root_time = self.nodes[root].time_stamp;
            }

            let (ends_track, must_verify) = {
                let node = &self.nodes[root];
                (node.ends_track, node.must_verify)
            };
            if ends_track && must_verify {
                self.emit_verification(tree_id, root);
            }
        }
    }

    fn emit_verification(&mut self, tree_id: TreeId, node_id: NodeId) {
        let track_id = self.trees[tree_id].id;
        let node = &self.nodes[node_id];
        match node.kind {
            NodeKind::Start | NodeKind::Continue => {
                let slot = node.state_slot.expect("state node without a state");
                let ns = &self.states[Id::from_raw(slot)];
                let report = node.report.expect("measured node without a report");
                let report = &self.reports[report];
                let element = TrackElement {
                    code: ElementCode::Measured,
                    rx: report.x,
                    ry: report.y,
                    sx: ns.state.state_x(),
                    sy: ns.state.state_y(),
                    log_likelihood: ns.state.log_likelihood(),
                    time: self.current_time,
                    frame: report.frame,
                    model_code: ns.state.model_code(),
                    corner_id: report.corner_id,
                };
                self.store.append_element(track_id, element);
            }
            NodeKind::Skip => {
                let slot = node.state_slot.expect("state node without a state");
                let ns = &self.states[Id::from_raw(slot)];
                let element = TrackElement {
                    code: ElementCode::Skipped,
                    rx: f64::NAN,
                    ry: f64::NAN,
                    sx: ns.state.state_x(),
                    sy: ns.state.state_y(),
                    log_likelihood: ns.state.log_likelihood(),
                    time: self.current_time,
                    frame: -9,
                    model_code: ns.state.model_code(),
                    corner_id: 0,
                };
                self.store.append_element(track_id, element);
            }
            NodeKind::End => {
                self.store.close_track(track_id, self.current_time);
            }
            NodeKind::FalseAlarm => {
                let report = node.report.expect("false alarm without a report");
                let report = &self.reports[report];
                self.store.append_false_alarm(FalseAlarm {
                    x: report.x,
                    y: report.y,
                    frame: report.frame,
                    corner_id: report.corner_id,
                });
            }
            NodeKind::Root | NodeKind::Dummy => {
                debug_assert!(false, "roots and dummies never verify");
            }
        }
    }

    /// A tree stays only while something in it still matters: a node that
    /// must verify, or a leaf that keeps the track open.
    fn remove_unused_trees(&mut self) {
        let mut removed: Vec<TreeId> = Vec::new();
        for tree_id in self.tree_order.clone() {
            let in_use = match self.trees[tree_id].root {
                None => false,
                Some(root) => !self.nodes[root].ends_track && self.subtree_in_use(root),
            };
            if in_use {
                continue;
            }
            if let Some(root) = self.trees[tree_id].root {
                self.remove_subtree(root);
            }
            self.trees.remove(tree_id);
            removed.push(tree_id);
        }
        if !removed.is_empty() {
            self.tree_order.retain(|t| !removed.contains(t));
            for group in &mut self.groups {
                group.trees.retain(|t| !removed.contains(t));
            }
        }
    }

    fn subtree_in_use(&self, node: NodeId) -> bool {
        let n = &self.nodes[node];
        if n.must_verify || (n.is_leaf() && !n.ends_track) {
            return true;
        }
        n.children.iter().any(|&child| self.subtree_in_use(child))
    }

    fn remove_unused_reports(&mut self) {
        let reports = std::mem::take(&mut self.old_reports);
        for report in reports {
            if self.reports[report].is_in_use() {
                self.old_reports.push(report);
            } else {
                self.reports.remove(report);
            }
        }
    }

    fn remove_unused_groups(&mut self) {
        let groups = std::mem::take(&mut self.groups);
        for mut group in groups {
            let hypos = std::mem::take(&mut group.hypos);
            for hypo in hypos {
                if self.hypos[hypo].is_in_use() {
                    group.hypos.push(hypo);
                } else {
                    self.remove_hypo(hypo);
                }
            }
            if group.hypos.is_empty() || group.trees.is_empty() {
                debug_assert!(
                    group.hypos.is_empty() && group.trees.is_empty(),
                    "a group lost its hypotheses and its trees together"
                );
                continue;
            }
            self.groups.push(group);
        }
    }

    fn rebuild_active_leaves(&mut self) {
        self.active_leaves.clear();
        for &tree_id in &self.tree_order {
            let Some(root) = self.trees[tree_id].root else {
                continue;
            };
            // Depth-first, children in insertion order
            let mut pending = vec![root];
            while let Some(node) = pending.pop() {
                if self.nodes[node].is_leaf() {
                    self.active_leaves.push(node);
                } else {
                    for &child in self.nodes[node].children.iter().rev() {
                        pending.push(child);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Node plumbing
    // ------------------------------------------------------------------

    fn remove_subtree(&mut self, node: NodeId) {
        let children = self.nodes[node].children.clone();
        for child in children {
            self.remove_subtree(child);
        }
        self.unlink_node(node);
    }

    /// Remove one node, detaching both sides of every link it holds.
    fn unlink_node(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node].parent {
            if self.nodes.contains(parent) {
                self.nodes[parent].children.retain(|c| *c != node);
            }
        }
        if let Some(report) = self.nodes[node].report {
            self.reports[report].node_links.retain(|n| *n != node);
        }
        let links = self.nodes[node].hypo_links.clone();
        for hypo in links {
            self.hypos[hypo].leaves.retain(|n| *n != node);
        }
        if let Some(slot) = self.nodes[node].state_slot {
            self.states.remove(Id::from_raw(slot));
        }
        self.nodes.remove(node);
    }

    // ------------------------------------------------------------------
    // Drain-time pruning
    // ------------------------------------------------------------------

    /// One clear round: collapse the group toward its best hypothesis with
    /// the given depth limit.
    fn clear_group(&mut self, gi: usize, depth: i64) {
        // Earlier rounds may have removed finished trees; refresh the
        // likelihoods and only anchor on a hypothesis that still covers
        // every remaining tree
        self.recompute_hypo_likelihoods(gi);
        let num_trees = self.groups[gi].trees.len();
        let best = self.groups[gi]
            .hypos
            .iter()
            .copied()
            .find(|&h| self.hypos[h].leaves.len() == num_trees);
        let Some(best) = best else {
            return;
        };
        self.n_scanback_prune(gi, best, depth);
    }

    // ------------------------------------------------------------------
    // Debug invariants
    // ------------------------------------------------------------------

    #[cfg(debug_assertions)]
    fn check_consistency(&self) {
        // No two groups share a label
        for (i, a) in self.groups.iter().enumerate() {
            for b in self.groups.iter().skip(i + 1) {
                if let (Some(&ta), Some(&tb)) = (a.trees.first(), b.trees.first()) {
                    assert_ne!(
                        self.trees[ta].group_label, self.trees[tb].group_label,
                        "two groups with the same label"
                    );
                }
            }
        }

        for group in &self.groups {
            for &hypo in &group.hypos {
                let hypo = &self.hypos[hypo];
                // One leaf per tree of the group
                let mut seen_trees: Vec<TreeId> = Vec::new();
                let mut seen_reports: Vec<Id<Report>> = Vec::new();
                for &leaf in hypo.leaves() {
                    let tree = self.nodes[leaf].tree;
                    assert!(!seen_trees.contains(&tree), "two leaves from one tree");
                    assert!(group.trees.contains(&tree), "leaf outside its group");
                    seen_trees.push(tree);
                    if let Some(report) = self.nodes[leaf].report {
                        assert!(
                            !seen_reports.contains(&report),
                            "two leaves share a report"
                        );
                        seen_reports.push(report);
                    }
                }
                assert_eq!(
                    seen_trees.len(),
                    group.trees.len(),
                    "hypothesis misses a tree"
                );
            }
            assert!(
                group.hypos.len() <= self.max_g_hypos,
                "k-best pruning bound violated"
            );
        }

        // Every live report is referenced
        for &report in &self.old_reports {
            assert!(self.reports[report].is_in_use(), "dangling report");
        }
    }
}
