//! Envelope function for crossfade volume ramps
//!
//! Maps normalized fade progress to a gain. Curve shapes:
//! - Linear: simple ramp (note: 3dB dip at the midpoint when mirrored)
//! - EaseIn: slow start, fast finish (t²)
//! - EaseOut: fast start, slow finish (1 - (1 - t)²)
//! - SCurve: slow start and end
//! - EqualPower: constant perceived loudness (best for music, default)

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Crossfade curve type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// Linear fade: simple and predictable
    ///
    /// **Note**: mirrored linear ramps keep constant amplitude but not constant
    /// power. At the midpoint: power = 0.5² + 0.5² = 0.5 (-3dB).
    Linear,

    /// Quadratic ease-in: the gain stays low for most of the fade
    EaseIn,

    /// Quadratic ease-out: the gain rises quickly and settles
    EaseOut,

    /// S-Curve fade: slow start, fast middle, slow end
    SCurve,

    /// Quarter-sine rise: the incoming gain reaches ~0.707 at the midpoint
    ///
    /// Applied to both sides through [`fade_gains`], the outgoing gain is
    /// `1 - sin`, so the pair does not sum to constant power.
    #[default]
    EqualPower,
}

impl FadeCurve {
    /// Gain at normalized `progress` (clamped to [0, 1])
    ///
    /// Monotonic non-decreasing with `gain(0) = 0` and `gain(1) = 1`.
    #[inline]
    pub fn gain(&self, progress: f64) -> f64 {
        let t = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };

        let gain = match self {
            FadeCurve::Linear => t,
            FadeCurve::EaseIn => t * t,
            FadeCurve::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            FadeCurve::SCurve => (1.0 - (PI * t).cos()) * 0.5,
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        };

        // Trig rounding can land a hair outside [0, 1] at the endpoints
        gain.clamp(0.0, 1.0)
    }

    /// Human-readable name for the curve
    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::EaseIn => "Ease In",
            FadeCurve::EaseOut => "Ease Out",
            FadeCurve::SCurve => "S-Curve",
            FadeCurve::EqualPower => "Equal Power",
        }
    }
}

/// Envelope function: gain for `progress` under `curve`
#[inline]
pub fn envelope(progress: f64, curve: FadeCurve) -> f64 {
    curve.gain(progress)
}

/// Gains for one fade step as `(incoming, outgoing)`
///
/// Incoming follows `curve_in` upward, outgoing is `1 - curve_out`.
#[inline]
pub fn fade_gains(progress: f64, curve_in: FadeCurve, curve_out: FadeCurve) -> (f64, f64) {
    (
        envelope(progress, curve_in),
        1.0 - envelope(progress, curve_out),
    )
}
