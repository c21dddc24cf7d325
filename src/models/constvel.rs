//! Constant-velocity corner model
//!
//! A linear Kalman filter over the 4-D state (x, dx, y, dy), observing 2-D
//! corner positions. Candidate continuations are gated twice: by the
//! Mahalanobis distance of the position innovation, then by matching the
//! corner's texture descriptor against the track's previous one.

use std::cell::OnceCell;

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};

use crate::mht::Report;

use super::texture::{max_window_correlation, min_window_ssd, Texture};
use super::{MotionModel, MotionState, ScanContext};

/// log( (2 pi)^(measurement dims / 2) )
const LOG_NORM_FACTOR: f64 = 1.596_359_7;

/// Guard against taking the log of an exact zero probability
const EPSILON: f64 = 1e-14;

/// Secondary gating metric for the texture descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureMetric {
    /// Accept when the best window correlation exceeds the threshold
    #[default]
    Correlation,
    /// Accept when the best sum of squared differences, scaled by the
    /// intensity variance, falls below the threshold
    SumSquaredDiff,
}

/// Parameters of the constant-velocity model.
#[derive(Debug, Clone)]
pub struct ConstVelParams {
    /// Measurement variance of the x position
    pub position_variance_x: f64,
    /// Measurement variance of the y position
    pub position_variance_y: f64,
    /// Scale for the sum-of-squared-differences texture metric
    pub intensity_variance: f64,
    /// Process noise intensity
    pub process_variance: f64,
    /// Probability that a first-scan report starts a track
    pub start_prob: f64,
    /// Mean track lifetime in skipped scans; drives the end probability
    /// `p_end(m) = 1 - exp(-m / lambda)`
    pub lambda: f64,
    /// Probability that a live track is detected on a scan
    pub detect_prob: f64,
    /// Initial variance of the velocity components
    pub state_variance: f64,
    /// Texture acceptance threshold
    pub intensity_threshold: f64,
    /// Mahalanobis gate on the position innovation
    pub max_distance: f64,
    /// Which texture metric to gate with
    pub texture_metric: TextureMetric,
}

/// Constant-velocity corner model.
#[derive(Debug)]
pub struct ConstVelModel {
    start_log_likelihood: f64,
    skip_log_likelihood: f64,
    detect_log_likelihood: f64,
    lambda: f64,
    max_distance: f64,
    process_variance: f64,
    intensity_variance: f64,
    intensity_threshold: f64,
    texture_metric: TextureMetric,
    r: Matrix2<f64>,
    start_p: Matrix4<f64>,
}

impl ConstVelModel {
    pub fn new(params: ConstVelParams) -> Self {
        let start_p = Matrix4::from_diagonal(&Vector4::new(
            params.position_variance_x,
            params.state_variance,
            params.position_variance_y,
            params.state_variance,
        ));

        ConstVelModel {
            start_log_likelihood: params.start_prob.ln(),
            skip_log_likelihood: (1.0 - params.detect_prob).ln(),
            detect_log_likelihood: params.detect_prob.ln(),
            lambda: params.lambda,
            max_distance: params.max_distance,
            process_variance: params.process_variance,
            intensity_variance: params.intensity_variance,
            intensity_threshold: params.intensity_threshold,
            texture_metric: params.texture_metric,
            r: Matrix2::from_diagonal(&Vector2::new(
                params.position_variance_x,
                params.position_variance_y,
            )),
            start_p,
        }
    }

    fn end_prob(&self, skipped: u32) -> f64 {
        let p = 1.0 - (-(skipped as f64) / self.lambda).exp();
        if p == 0.0 {
            EPSILON
        } else {
            p
        }
    }

    fn texture_accepts(&self, prev: &Texture, cur: &Texture) -> bool {
        match self.texture_metric {
            TextureMetric::Correlation => {
                max_window_correlation(prev, cur) > self.intensity_threshold
            }
            TextureMetric::SumSquaredDiff => {
                min_window_ssd(prev, cur) / self.intensity_variance < self.intensity_threshold
            }
        }
    }

    fn start_state(&self, report: &Report) -> ConstVelState {
        ConstVelState {
            x: Vector4::new(report.x, 0.0, report.y, 0.0),
            p: self.start_p,
            log_likelihood: self.start_log_likelihood,
            skipped: 0,
            texture: report.texture.clone(),
            derived: OnceCell::new(),
        }
    }

    fn skip_state(&self, prev: &ConstVelState, dt: f64) -> Option<ConstVelState> {
        let d = prev.derived(self, dt)?;
        Some(ConstVelState {
            x: d.x_pred,
            p: d.next_p,
            log_likelihood: 0.0,
            skipped: prev.skipped + 1,
            texture: prev.texture.clone(),
            derived: OnceCell::new(),
        })
    }

    fn measured_state(
        &self,
        prev: &ConstVelState,
        report: &Report,
        dt: f64,
    ) -> Option<ConstVelState> {
        let d = prev.derived(self, dt)?;

        let v = Vector2::new(report.x - d.x_pred[0], report.y - d.x_pred[2]);
        let distance = v.dot(&(d.s_inv * v));
        if distance > self.max_distance {
            return None;
        }
        if !self.texture_accepts(&prev.texture, &report.texture) {
            return None;
        }

        let x = d.x_pred + d.w * v;
        Some(ConstVelState {
            x,
            p: d.next_p,
            log_likelihood: d.log_coef - distance / 2.0,
            skipped: 0,
            texture: report.texture.clone(),
            derived: OnceCell::new(),
        })
    }
}

impl MotionModel for ConstVelModel {
    type State = ConstVelState;

    fn begin_new_states(
        &self,
        prev: Option<&ConstVelState>,
        _report: Option<&Report>,
        ctx: &ScanContext,
    ) -> usize {
        // Track initiation is only allowed on the very first scan; later
        // scans extend existing trees.
        if prev.is_none() && !ctx.first_scan {
            0
        } else {
            1
        }
    }

    fn new_state(
        &self,
        index: usize,
        prev: Option<&ConstVelState>,
        report: Option<&Report>,
        ctx: &ScanContext,
    ) -> Option<ConstVelState> {
        debug_assert_eq!(index, 0, "constant-velocity model spawns one state");
        match (prev, report) {
            (None, Some(report)) => Some(self.start_state(report)),
            (Some(prev), None) => self.skip_state(prev, ctx.time_delta),
            (Some(prev), Some(report)) => self.measured_state(prev, report, ctx.time_delta),
            (None, None) => {
                debug_assert!(false, "new_state needs a previous state or a report");
                None
            }
        }
    }

    fn end_log_likelihood(&self, state: &ConstVelState) -> f64 {
        self.end_prob(state.skipped).ln()
    }

    fn continue_log_likelihood(&self, state: &ConstVelState) -> f64 {
        (1.0 - self.end_prob(state.skipped)).ln()
    }

    fn skip_log_likelihood(&self, _state: &ConstVelState) -> f64 {
        self.skip_log_likelihood
    }

    fn detect_log_likelihood(&self, _state: &ConstVelState) -> f64 {
        self.detect_log_likelihood
    }
}

/// Report-independent part of the Kalman step out of a state, computed at
/// most once per state, on first use.
#[derive(Debug, Clone)]
struct Derived {
    /// Predicted state `F x`
    x_pred: Vector4<f64>,
    /// Posterior covariance for the successor state
    next_p: Matrix4<f64>,
    /// Inverse innovation covariance
    s_inv: Matrix2<f64>,
    /// Filter gain
    w: Matrix4x2<f64>,
    /// Innovation-independent part of the measurement likelihood
    log_coef: f64,
}

/// State estimate of a corner track under the constant-velocity model.
#[derive(Debug)]
pub struct ConstVelState {
    x: Vector4<f64>,
    p: Matrix4<f64>,
    log_likelihood: f64,
    /// Consecutive scans without a detection
    skipped: u32,
    /// Descriptor of the last corner absorbed into the track
    texture: Texture,
    derived: OnceCell<Option<Derived>>,
}

impl ConstVelState {
    pub fn velocity_x(&self) -> f64 {
        self.x[1]
    }

    pub fn velocity_y(&self) -> f64 {
        self.x[3]
    }

    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    fn derived(&self, model: &ConstVelModel, dt: f64) -> Option<&Derived> {
        self.derived
            .get_or_init(|| compute_derived(&self.x, &self.p, model, dt))
            .as_ref()
    }
}

impl MotionState for ConstVelState {
    fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    fn state_x(&self) -> f64 {
        self.x[0]
    }

    fn state_y(&self) -> f64 {
        self.x[2]
    }

    fn model_code(&self) -> u32 {
        2
    }
}

fn compute_derived(
    x: &Vector4<f64>,
    p: &Matrix4<f64>,
    model: &ConstVelModel,
    dt: f64,
) -> Option<Derived> {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;

    #[rustfmt::skip]
    let f = Matrix4::new(
        1.0,  dt, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0,  dt,
        0.0, 0.0, 0.0, 1.0,
    );

    #[rustfmt::skip]
    let q = model.process_variance * Matrix4::new(
        dt3 / 3.0, dt2 / 2.0,       0.0,       0.0,
        dt2 / 2.0,        dt,       0.0,       0.0,
              0.0,       0.0, dt3 / 3.0, dt2 / 2.0,
              0.0,       0.0, dt2 / 2.0,        dt,
    );

    #[rustfmt::skip]
    let h = Matrix2x4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
    );

    let p1 = f * p * f.transpose() + q;
    let s = h * p1 * h.transpose() + model.r;

    let det = s.determinant();
    if det <= 0.0 {
        return None;
    }
    let s_inv = s.try_inverse()?;

    let w = p1 * h.transpose() * s_inv;
    let next_p = p1 - w * s * w.transpose();

    Some(Derived {
        x_pred: f * x,
        next_p,
        s_inv,
        w,
        log_coef: -(LOG_NORM_FACTOR + det.ln() / 2.0),
    })
}
