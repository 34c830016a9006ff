//! Monitor configuration types

use std::time::Duration;

use dbpool_core::MonitorSettings;

/// Pauses taken by the monitor worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Pause between two idle entries of one pool
    pub entry_pause: Duration,
    /// Pause between two pools
    pub pool_pause: Duration,
    /// Pause when a pass found nothing to inspect
    pub idle_pause: Duration,
}

impl MonitorConfig {
    /// A configuration with every pause set to zero.
    ///
    /// Sweeps still yield to the runtime between entries.
    pub fn immediate() -> Self {
        Self {
            entry_pause: Duration::ZERO,
            pool_pause: Duration::ZERO,
            idle_pause: Duration::ZERO,
        }
    }

    pub fn with_entry_pause(mut self, pause: Duration) -> Self {
        self.entry_pause = pause;
        self
    }

    pub fn with_pool_pause(mut self, pause: Duration) -> Self {
        self.pool_pause = pause;
        self
    }

    pub fn with_idle_pause(mut self, pause: Duration) -> Self {
        self.idle_pause = pause;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorSettings::default().into()
    }
}

impl From<MonitorSettings> for MonitorConfig {
    fn from(settings: MonitorSettings) -> Self {
        Self {
            entry_pause: Duration::from_millis(settings.entry_pause_ms),
            pool_pause: Duration::from_millis(settings.pool_pause_ms),
            idle_pause: Duration::from_millis(settings.idle_pause_ms),
        }
    }
}
