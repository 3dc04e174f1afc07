/// Demo configuration
use anyhow::Context;
use segue_playback::EngineConfig;
use segue_source::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub simulation: SimulationSettings,
}

/// Behaviour of the simulated players and network
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationSettings {
    /// How long a simulated engine takes to buffer after `load`
    #[serde(default = "default_load_latency_ms")]
    pub load_latency_ms: u64,

    /// How long a simulated engine takes to start rendering after `play`
    #[serde(default = "default_start_latency_ms")]
    pub start_latency_ms: u64,

    /// Whether the simulated device is online
    #[serde(default = "default_online")]
    pub online: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            load_latency_ms: default_load_latency_ms(),
            start_latency_ms: default_start_latency_ms(),
            online: default_online(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// Environment keys use the `SEGUE_` prefix and `__` between nested
    /// tables, e.g. `SEGUE_ENGINE__AUX_READY_TIMEOUT_MS=5000`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path));
        } else {
            // Optional default file next to the working directory
            settings = settings.add_source(config::File::with_name("segue").required(false));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("SEGUE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        config.engine.validate()?;
        Ok(config)
    }
}

// Default values
fn default_load_latency_ms() -> u64 {
    120
}

fn default_start_latency_ms() -> u64 {
    40
}

fn default_online() -> bool {
    true
}
