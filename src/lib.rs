/*!
# corner-mht - Multiple hypothesis corner tracking

Rust implementation of a multiple hypothesis tracker (MHT) that turns a
time-ordered sequence of noisy corner detections into persistent tracks
with smoothed constant-velocity state estimates, plus a list of detections
classified as false alarms.

## Features

- Track trees of alternative interpretations, grown per scan and pruned by
  N-scanback, ratio and k-best strategies
- Incremental grouping of trees that share detections, with group
  splitting and merging
- Lazy k-best assignment enumeration (Murty partitioning over a
  Hungarian base solver)
- Pluggable motion models; a constant-velocity Kalman model with
  Mahalanobis and texture-correlation gating is provided

## Modules

- [`mht`] - The tracking engine and its data model
- [`association`] - Ranked assignment of detections to hypotheses
- [`models`] - Motion model abstraction and the constant-velocity model
- [`output`] - Verified tracks and false alarms
- [`config`] / [`io`] - Parameter files, corner frames, track files

## Example

```rust,no_run
use corner_mht::{
    ConstVelModel, ConstVelParams, Detection, DetectionBatch, MhtTracker,
    ScanOutcome, Texture, TextureMetric,
};

let model = ConstVelModel::new(ConstVelParams {
    position_variance_x: 1.0,
    position_variance_y: 1.0,
    intensity_variance: 100.0,
    process_variance: 0.01,
    start_prob: 0.2,
    lambda: 15.0,
    detect_prob: 0.9,
    state_variance: 20.0,
    intensity_threshold: 0.5,
    max_distance: 5.99,
    texture_metric: TextureMetric::Correlation,
});

// (max depth, min hypothesis ratio, max hypotheses, models,
//  false-alarm log-likelihood, end scan)
let mut tracker = MhtTracker::new(3, 0.001, 64, vec![model], (0.05f64).ln(), 100);

tracker.add_reports(DetectionBatch::new(
    1.0,
    vec![Detection {
        x: 10.0,
        y: 20.0,
        texture: Texture::default(),
        frame: 0,
        corner_id: 0,
    }],
));
while tracker.scan() == ScanOutcome::Progressed {}
tracker.clear();

for track in tracker.tracks() {
    println!("track {}: {} elements", track.id, track.elements.len());
}
```
*/

// ============================================================================
// Core modules
// ============================================================================

/// The multiple hypothesis tracking engine and its data model
pub mod mht;

/// Data association: assignment problems, k-best enumeration
pub mod association;

/// Motion models: the model abstraction and the constant-velocity model
pub mod models;

/// Verified output: tracks, elements, false alarms
pub mod output;

/// Tracker parameters and the parameter-file reader
pub mod config;

/// Corner-frame input and track-file output
pub mod io;

/// Error types
pub mod errors;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use association::{AssignmentProblem, KBestEnumerator, SolutionQueue};
pub use config::{read_params, TrackerParams};
pub use errors::TrackerError;
pub use mht::{
    Detection, DetectionBatch, EngineStats, MhtTracker, NodeKind, ScanOutcome,
};
pub use models::{
    ConstVelModel, ConstVelParams, ConstVelState, MotionModel, MotionState, ScanContext, Texture,
    TextureMetric,
};
pub use output::{CornerTrack, ElementCode, FalseAlarm, TrackElement, TrackStore, PALETTE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
