//! Multiple hypothesis tracking
//!
//! The engine and the data it owns: measurement reports, track trees of
//! hypothesis nodes, groups of trees coupled by shared reports, and the
//! ranked group hypotheses explaining each group.

pub mod arena;
pub mod engine;
pub mod group;
pub mod node;
pub mod report;

pub use engine::{EngineStats, MhtTracker, ScanOutcome};
pub use group::{Group, GroupHypo};
pub use node::{Node, NodeKind, TrackTree};
pub use report::{Detection, DetectionBatch, Report};
