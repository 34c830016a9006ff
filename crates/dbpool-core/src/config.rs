//! TOML configuration model
//!
//! ```toml
//! [monitor]
//! entry_pause_ms = 50
//!
//! [targets.main]
//! driver = "sqlite"
//! url = "data/main.db"
//! max_idle_size = 8
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::{DatabaseTarget, DbPoolError, Result};

/// Pauses used by the idle monitor, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Pause between two idle entries of one pool
    pub entry_pause_ms: u64,
    /// Pause between two pools
    pub pool_pause_ms: u64,
    /// Pause after a full pass
    pub idle_pause_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            entry_pause_ms: 50,
            pool_pause_ms: 50,
            idle_pause_ms: 100,
        }
    }
}

/// File model: one table per target plus monitor settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolsConfig {
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    targets: BTreeMap<String, DatabaseTarget>,
}

impl PoolsConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading pool configuration");
        raw.parse()
    }

    /// Add or replace a target under its own name
    pub fn insert_target(&mut self, target: DatabaseTarget) {
        self.targets.insert(target.name.clone(), target);
    }

    /// Targets ordered by name, each named after its table key when the
    /// table does not set `name` itself
    pub fn targets(&self) -> Vec<DatabaseTarget> {
        self.targets
            .iter()
            .map(|(key, target)| {
                let mut target = target.clone();
                if target.name.trim().is_empty() {
                    target.name = key.clone();
                }
                target
            })
            .collect()
    }

    /// Validate every target and reject two tables resolving to one name
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for target in self.targets() {
            target.validate()?;
            if !seen.insert(target.name.clone()) {
                return Err(DbPoolError::Configuration(format!(
                    "target name '{}' is used by more than one table",
                    target.name
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for PoolsConfig {
    type Err = DbPoolError;

    fn from_str(raw: &str) -> Result<Self> {
        let config: PoolsConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}
