use anyhow::{Context, Result};
use camino::Utf8Path;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// File name of the optional coordinator settings file.
pub const SETTINGS_FILE: &str = "Coordinator.yaml";

/// Prefix of environment overrides, e.g. `GSM_PID_TIMEOUT_MS=10000`.
pub const ENV_PREFIX: &str = "GSM";

/// Timings and process settings for the coordinator.
///
/// Layered lowest to highest: built-in defaults, `Coordinator.yaml` in the
/// config directory, then `GSM_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub pid_poll_interval_ms: u64,
    pub pid_timeout_ms: u64,
    pub agent_settle_delay_ms: u64,
    pub status_poll_interval_ms: u64,
    pub transcript_capacity: usize,
    pub python_path: String,
    pub debug_mode: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            pid_poll_interval_ms: 1000,
            pid_timeout_ms: 30_000,
            agent_settle_delay_ms: 3000,
            status_poll_interval_ms: 5000,
            transcript_capacity: 1000,
            python_path: "python".to_string(),
            debug_mode: false,
        }
    }
}

impl CoordinatorSettings {
    /// Load settings for `config_dir`, reading the process environment.
    pub fn load(config_dir: &Utf8Path) -> Result<Self> {
        Self::load_with_env(config_dir, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Load settings with an explicit environment source.
    pub fn load_with_env(config_dir: &Utf8Path, env: Environment) -> Result<Self> {
        let path = config_dir.join(SETTINGS_FILE);
        let settings: Self = Config::builder()
            .add_source(File::new(path.as_str(), FileFormat::Yaml).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read coordinator settings from {}", path))?
            .try_deserialize()
            .context("Invalid coordinator settings")?;

        tracing::debug!("Coordinator settings: {:?}", settings);
        Ok(settings)
    }

    pub fn pid_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pid_poll_interval_ms)
    }

    pub fn pid_timeout(&self) -> Duration {
        Duration::from_millis(self.pid_timeout_ms)
    }

    pub fn agent_settle_delay(&self) -> Duration {
        Duration::from_millis(self.agent_settle_delay_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}
