//! Measurement reports and inbound detection batches

use smallvec::SmallVec;

use crate::models::texture::Texture;

use super::arena::Id;
use super::node::Node;

/// One corner detection as read from a frame file.
#[derive(Debug, Clone)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub texture: Texture,
    pub frame: i32,
    pub corner_id: u64,
}

/// One frame's worth of detections, queued for a future scan.
#[derive(Debug, Clone)]
pub struct DetectionBatch {
    /// Interval since the previous frame
    pub time_delta: f64,
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(time_delta: f64, detections: Vec<Detection>) -> Self {
        DetectionBatch {
            time_delta,
            detections,
        }
    }
}

/// A detection admitted into the engine.
///
/// Immutable once installed, apart from the bookkeeping fields: the row
/// number it occupies in assignment problems while new, the group label
/// assigned during relabeling, and the back links to the tree nodes that
/// reference it. A report lives until no node refers to it.
#[derive(Debug)]
pub struct Report {
    pub x: f64,
    pub y: f64,
    pub texture: Texture,
    pub frame: i32,
    pub corner_id: u64,
    pub falarm_log_likelihood: f64,

    pub(crate) row: usize,
    pub(crate) group_label: i64,
    pub(crate) node_links: SmallVec<[Id<Node>; 4]>,
}

impl Report {
    pub(crate) fn new(detection: Detection, falarm_log_likelihood: f64) -> Self {
        Report {
            x: detection.x,
            y: detection.y,
            texture: detection.texture,
            frame: detection.frame,
            corner_id: detection.corner_id,
            falarm_log_likelihood,
            row: 0,
            group_label: 0,
            node_links: SmallVec::new(),
        }
    }

    /// A report is in use while at least one track hypothesis links to it.
    pub(crate) fn is_in_use(&self) -> bool {
        !self.node_links.is_empty()
    }
}
