//! Transition settings and the in-flight transition session

use crate::envelope::{fade_gains, FadeCurve};
use crate::types::{QueueEntry, TransitionStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shortest fade the engine will run
pub const MIN_FADE_DURATION: Duration = Duration::from_millis(500);

/// Caller-supplied crossfade configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSettings {
    /// Fade duration in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u32,

    /// Curve for the incoming track
    #[serde(default)]
    pub curve_in: FadeCurve,

    /// Curve for the outgoing track
    #[serde(default)]
    pub curve_out: FadeCurve,
}

fn default_duration_ms() -> u32 {
    3000
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            curve_in: FadeCurve::default(),
            curve_out: FadeCurve::default(),
        }
    }
}

impl TransitionSettings {
    pub fn new(duration_ms: u32, curve_in: FadeCurve, curve_out: FadeCurve) -> Self {
        Self {
            duration_ms,
            curve_in,
            curve_out,
        }
    }

    /// Same curve in both directions
    pub fn symmetric(duration_ms: u32, curve: FadeCurve) -> Self {
        Self::new(duration_ms, curve, curve)
    }

    /// Requested duration floor-clamped to [`MIN_FADE_DURATION`]
    pub fn effective_duration(&self) -> Duration {
        self.duration_with_floor(MIN_FADE_DURATION)
    }

    /// Requested duration floor-clamped to `floor`
    pub fn duration_with_floor(&self, floor: Duration) -> Duration {
        Duration::from_millis(u64::from(self.duration_ms)).max(floor)
    }
}

/// The single in-flight transition
///
/// Created by `prepare_next`, given settings by `begin_transition` and dropped
/// on completion, cancellation or failure.
#[derive(Debug)]
pub struct TransitionSession {
    pub id: u64,
    pub incoming: QueueEntry,
    pub settings: Option<TransitionSettings>,
    pub started_at: Option<Instant>,
    pub elapsed: Duration,
    pub status: TransitionStatus,
    pub cancel: CancellationToken,
}

impl TransitionSession {
    pub fn new(id: u64, incoming: QueueEntry, cancel: CancellationToken) -> Self {
        Self {
            id,
            incoming,
            settings: None,
            started_at: None,
            elapsed: Duration::ZERO,
            status: TransitionStatus::Preparing,
            cancel,
        }
    }

    /// Attach settings and start the fade clock
    pub fn start(&mut self, settings: TransitionSettings) {
        self.settings = Some(settings);
        self.started_at = Some(Instant::now());
        self.elapsed = Duration::ZERO;
    }

    /// Normalized fade progress in [0, 1]
    ///
    /// Driven by accumulated tick time rather than wall-clock time, so the
    /// fade stands still while playback is paused.
    pub fn progress(&self, floor: Duration) -> f64 {
        let Some(settings) = self.settings else {
            return 0.0;
        };
        let total = settings.duration_with_floor(floor).as_secs_f64();
        (self.elapsed.as_secs_f64() / total).clamp(0.0, 1.0)
    }

    /// Advance the fade clock by one tick and return `(incoming, outgoing)`
    /// gains for the new position
    pub fn advance(&mut self, tick: Duration, floor: Duration) -> (f32, f32) {
        self.elapsed += tick;
        self.gains(floor)
    }

    /// Gains at the current position without advancing
    pub fn gains(&self, floor: Duration) -> (f32, f32) {
        let settings = self.settings.unwrap_or_default();
        let (incoming, outgoing) =
            fade_gains(self.progress(floor), settings.curve_in, settings.curve_out);
        (incoming as f32, outgoing as f32)
    }

    pub fn is_complete(&self, floor: Duration) -> bool {
        self.settings.is_some() && self.progress(floor) >= 1.0
    }
}
