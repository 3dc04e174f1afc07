//! Engine configuration

use crate::error::{PlaybackError, Result};
use crate::transition::TransitionSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator tuning
///
/// Every field has a serde default so a partial TOML table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fade tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Bounded wait for the auxiliary slot to become ready
    #[serde(default = "default_aux_ready_timeout_ms")]
    pub aux_ready_timeout_ms: u64,

    /// Bounded wait for confirmation that the auxiliary is rendering audio
    #[serde(default = "default_playing_confirm_timeout_ms")]
    pub playing_confirm_timeout_ms: u64,

    /// Upper bound on a single engine `load` call
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Floor applied to every fade duration
    #[serde(default = "default_min_fade_ms")]
    pub min_fade_ms: u64,

    /// Settings used when a caller has none of its own
    #[serde(default)]
    pub default_transition: TransitionSettings,

    /// Pause the Master at the end of each media item
    #[serde(default)]
    pub pause_at_end: bool,

    /// Broadcast buffer for playback events
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Command queue depth for the orchestrator task
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

fn default_tick_interval_ms() -> u64 {
    16
}

fn default_aux_ready_timeout_ms() -> u64 {
    3000
}

fn default_playing_confirm_timeout_ms() -> u64 {
    2000
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

fn default_min_fade_ms() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    64
}

fn default_command_capacity() -> usize {
    32
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            aux_ready_timeout_ms: default_aux_ready_timeout_ms(),
            playing_confirm_timeout_ms: default_playing_confirm_timeout_ms(),
            load_timeout_ms: default_load_timeout_ms(),
            min_fade_ms: default_min_fade_ms(),
            default_transition: TransitionSettings::default(),
            pause_at_end: false,
            event_capacity: default_event_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn aux_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.aux_ready_timeout_ms)
    }

    pub fn playing_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.playing_confirm_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn min_fade(&self) -> Duration {
        Duration::from_millis(self.min_fade_ms)
    }

    /// Reject values that would stall the task or spin the fade loop
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.tick_interval_ms == 0, "tick_interval_ms must be greater than 0"),
            (self.aux_ready_timeout_ms == 0, "aux_ready_timeout_ms must be greater than 0"),
            (
                self.playing_confirm_timeout_ms == 0,
                "playing_confirm_timeout_ms must be greater than 0",
            ),
            (self.load_timeout_ms == 0, "load_timeout_ms must be greater than 0"),
            (self.event_capacity == 0, "event_capacity must be greater than 0"),
            (self.command_capacity == 0, "command_capacity must be greater than 0"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(PlaybackError::InvalidConfig((*message).to_string())),
            None => Ok(()),
        }
    }
}
