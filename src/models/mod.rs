//! Motion models
//!
//! The hypothesis generator knows nothing about motion physics. It talks to
//! a [`MotionModel`], which turns (previous state, report) pairs into zero
//! or more candidate successor states:
//!
//! - with no previous state, a candidate **new-track** state built from the
//!   report alone;
//! - with no report, a **skip** continuation of the previous state;
//! - with both, a **measured** continuation, or nothing when the report
//!   fails gating.
//!
//! The usage pattern mirrors the enumeration protocol of the hypothesis
//! generator:
//!
//! ```ignore
//! let n = model.begin_new_states(prev, report, &ctx);
//! for i in 0..n {
//!     if let Some(state) = model.new_state(i, prev, report, &ctx) {
//!         // grow a child hypothesis around `state`
//!     }
//! }
//! model.end_new_states();
//! ```

pub mod constvel;
pub mod texture;

pub use constvel::{ConstVelModel, ConstVelParams, ConstVelState, TextureMetric};
pub use texture::Texture;

use crate::mht::Report;

/// Per-scan facts a model may need while spawning states, passed
/// explicitly by the engine rather than read from process-global state.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext {
    /// Interval between the previous frame and this one
    pub time_delta: f64,
    /// True while the engine processes its very first batch
    pub first_scan: bool,
}

/// Engine-facing surface of a model state.
pub trait MotionState {
    /// Likelihood that this state truly follows the one it was spawned from
    fn log_likelihood(&self) -> f64;

    /// Estimated x position
    fn state_x(&self) -> f64;

    /// Estimated y position
    fn state_y(&self) -> f64;

    /// Numeric model code recorded on emitted track elements
    fn model_code(&self) -> u32;
}

/// A target behavior model.
pub trait MotionModel {
    type State: MotionState;

    /// Announce how many candidate successor states could arise from this
    /// (state, report) pair. Either argument may be absent; see the module
    /// docs for the three construction modes.
    fn begin_new_states(
        &self,
        prev: Option<&Self::State>,
        report: Option<&Report>,
        ctx: &ScanContext,
    ) -> usize;

    /// Produce the `index`-th successor state, or `None` when that candidate
    /// is rejected (for example by gating).
    fn new_state(
        &self,
        index: usize,
        prev: Option<&Self::State>,
        report: Option<&Report>,
        ctx: &ScanContext,
    ) -> Option<Self::State>;

    /// Cleanup hook, called after the `new_state` loop.
    fn end_new_states(&self) {}

    /// Log-likelihood that a track ends after being in `state`
    fn end_log_likelihood(&self, state: &Self::State) -> f64;

    /// Log-likelihood that a track continues after being in `state`;
    /// the complement of [`MotionModel::end_log_likelihood`]
    fn continue_log_likelihood(&self, state: &Self::State) -> f64;

    /// Log-likelihood that a continuing track goes undetected this scan
    fn skip_log_likelihood(&self, state: &Self::State) -> f64;

    /// Log-likelihood that a continuing track is detected this scan;
    /// the complement of [`MotionModel::skip_log_likelihood`]
    fn detect_log_likelihood(&self, state: &Self::State) -> f64;
}
