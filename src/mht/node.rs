//! Track-hypothesis nodes and track trees
//!
//! A track tree's paths are the alternative interpretations of one target's
//! history. Nodes come in seven kinds with fixed behaviors:
//!
//! | kind     | ends track | verifies as   | default children | report children |
//! |----------|-----------|----------------|------------------|-----------------|
//! | ROOT     | no        | —              | one DUMMY        | FALARM + STARTs |
//! | DUMMY    | yes       | —              | one DUMMY        | none            |
//! | FALARM   | yes       | false alarm    | one DUMMY        | none            |
//! | START    | no        | track start    | as CONTINUE      | as CONTINUE     |
//! | CONTINUE | no        | track continue | END + SKIPs      | CONTINUEs       |
//! | SKIP     | no        | track skip     | as CONTINUE      | as CONTINUE     |
//! | END      | yes       | track end      | one DUMMY        | none            |
//!
//! Child generation itself lives in the engine, which owns the arenas and
//! the model list; this module holds the node and tree data.

use smallvec::SmallVec;

use super::arena::Id;
use super::group::GroupHypo;
use super::report::Report;

pub type NodeId = Id<Node>;

/// The seven node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Dummy,
    FalseAlarm,
    Start,
    Continue,
    Skip,
    End,
}

/// A model state attributed to the model that produced it.
#[derive(Debug)]
pub struct NodeState<S> {
    /// Index into the engine's model list
    pub model: usize,
    pub state: S,
}

/// One node of a track tree.
///
/// `log_likelihood` is cumulative along the path from the tree root.
/// `hypo_links` are the group hypotheses currently postulating this node;
/// a node may only be reclaimed when it has neither children nor links.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub tree: Id<TrackTree>,
    pub time_stamp: i64,
    pub parent: Option<NodeId>,
    pub children: SmallVec<[NodeId; 4]>,
    pub report: Option<Id<Report>>,
    pub(crate) hypo_links: SmallVec<[Id<GroupHypo>; 4]>,
    pub log_likelihood: f64,
    pub ends_track: bool,
    pub must_verify: bool,
    /// Slot in the engine's state table; `Some` for START, CONTINUE, SKIP
    pub(crate) state_slot: Option<usize>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, log_likelihood: f64, report: Option<Id<Report>>) -> Self {
        let (ends_track, must_verify) = match kind {
            NodeKind::Root => (false, false),
            NodeKind::Dummy => (true, false),
            NodeKind::FalseAlarm => (true, true),
            NodeKind::Start => (false, true),
            NodeKind::Continue => (false, true),
            NodeKind::Skip => (false, true),
            NodeKind::End => (true, true),
        };
        Node {
            kind,
            // Patched when the node is installed on a tree
            tree: Id::invalid(),
            time_stamp: 0,
            parent: None,
            children: SmallVec::new(),
            report,
            hypo_links: SmallVec::new(),
            log_likelihood,
            ends_track,
            must_verify,
            state_slot: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// A node is in use while it has children or a hypothesis postulates it.
    pub(crate) fn is_in_use(&self) -> bool {
        !self.is_leaf() || !self.hypo_links.is_empty()
    }

    pub fn has_report(&self) -> bool {
        self.report.is_some()
    }
}

/// A track tree: the root node plus the tree's identity.
#[derive(Debug)]
pub struct TrackTree {
    /// Root node; `None` once the tree has been fully collapsed
    pub root: Option<NodeId>,
    /// Globally unique, monotonically assigned track id
    pub id: u32,
    /// Timestamp of the current root
    pub root_time: i64,
    /// Label assigned during group relabeling; -1 is the unassigned sentinel
    pub(crate) group_label: i64,
    /// Whether the new-group pass has wrapped this tree yet
    pub(crate) grouped: bool,
}

impl TrackTree {
    pub(crate) fn new(root: NodeId, id: u32, root_time: i64) -> Self {
        TrackTree {
            root: Some(root),
            id,
            root_time,
            group_label: -1,
            grouped: false,
        }
    }
}

pub type TreeId = Id<TrackTree>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_flags() {
        let n = Node::new(NodeKind::FalseAlarm, -1.0, None);
        assert!(n.ends_track);
        assert!(n.must_verify);

        let n = Node::new(NodeKind::Continue, -1.0, None);
        assert!(!n.ends_track);
        assert!(n.must_verify);

        let n = Node::new(NodeKind::Dummy, 0.0, None);
        assert!(n.ends_track);
        assert!(!n.must_verify);

        let n = Node::new(NodeKind::Root, 0.0, None);
        assert!(!n.ends_track);
        assert!(!n.must_verify);
    }

    #[test]
    fn test_leaf_usage() {
        let n = Node::new(NodeKind::Dummy, 0.0, None);
        assert!(n.is_leaf());
        assert!(!n.is_in_use());
    }
}
