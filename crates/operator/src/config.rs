use crate::duration::serde_ms;
use crate::registry::{Registry, SystemProfile};
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Settle waits and poll bounds.
///
/// The target page emits no "render complete" signal, so these waits are
/// part of each step's contract. Defaults are the empirically chosen values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Timings {
    #[serde(with = "serde_ms")]
    pub poll_interval: Duration,
    #[serde(with = "serde_ms")]
    pub resolve_timeout: Duration,
    #[serde(with = "serde_ms")]
    pub section_open_timeout: Duration,
    #[serde(with = "serde_ms")]
    pub autocomplete_deadline: Duration,
    #[serde(with = "serde_ms")]
    pub autocomplete_settle: Duration,
    #[serde(with = "serde_ms")]
    pub click_settle: Duration,
    #[serde(with = "serde_ms")]
    pub menu_settle: Duration,
    #[serde(with = "serde_ms")]
    pub dialog_settle: Duration,
    #[serde(with = "serde_ms")]
    pub dialog_close_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            resolve_timeout: Duration::from_secs(3),
            section_open_timeout: Duration::from_secs(5),
            autocomplete_deadline: Duration::from_millis(800),
            autocomplete_settle: Duration::from_millis(2000),
            click_settle: Duration::from_millis(500),
            menu_settle: Duration::from_millis(300),
            dialog_settle: Duration::from_millis(1000),
            dialog_close_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub timings: Timings,
    /// Extra or replacement system profiles.
    pub profiles: Vec<SystemProfile>,
}

impl EngineConfig {
    pub fn from_yaml(source: &str) -> Result<Self, AutomationError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Loads a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, AutomationError> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&source)?;
        info!(
            profiles = config.profiles.len(),
            "Loaded config from {}",
            path.display()
        );
        Ok(config)
    }

    /// Built-in registry merged with this config's profiles.
    pub fn registry(&self) -> Result<Registry, AutomationError> {
        Ok(Registry::builtin()?.merge(self.profiles.clone()))
    }
}
