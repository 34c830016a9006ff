//! Pool configuration types

use std::time::Duration;

use dbpool_core::DatabaseTarget;
use serde::{Deserialize, Serialize};

/// Idle handles allowed per available CPU when no bound is configured
pub const WORKER_CPU_COEFFICIENT: usize = 4;

/// Idle timeout used when none (or a non-positive one) is configured
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest idle timeout a pool accepts
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Configuration for a connection pool
///
/// Holds the raw values from the target descriptor; the effective bounds are
/// resolved by `max_idle_size()` and `idle_timeout()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Requested idle queue bound; non-positive means "derive from CPUs"
    max_idle_size: Option<i64>,
    /// Requested idle timeout in milliseconds; non-positive means default
    idle_timeout_ms: Option<i64>,
    /// Overrides the detected parallelism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parallelism: Option<usize>,
}

impl PoolConfig {
    /// Create a configuration with every value defaulted
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pool tuning from a target descriptor
    pub fn from_target(target: &DatabaseTarget) -> Self {
        Self {
            max_idle_size: target.max_idle_size,
            idle_timeout_ms: target.idle_timeout_ms,
            parallelism: None,
        }
    }

    /// Set the requested idle queue bound
    pub fn with_max_idle_size(mut self, size: i64) -> Self {
        self.max_idle_size = Some(size);
        self
    }

    /// Set the requested idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.idle_timeout_ms = Some(timeout_ms);
        self
    }

    /// Pin the parallelism used to derive the idle bound
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism.max(1));
        self
    }

    /// Parallelism the bound is derived from
    pub fn parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Effective idle queue bound
    ///
    /// Unset or non-positive gives `parallelism * WORKER_CPU_COEFFICIENT`;
    /// any configured value is raised to at least `parallelism`.
    pub fn max_idle_size(&self) -> usize {
        let parallelism = self.parallelism();
        match self.max_idle_size {
            Some(size) if size > 0 => (size as usize).max(parallelism),
            _ => parallelism * WORKER_CPU_COEFFICIENT,
        }
    }

    /// Effective idle timeout, clamped to `(0, MAX_IDLE_TIMEOUT]`
    pub fn idle_timeout(&self) -> Duration {
        match self.idle_timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms as u64).min(MAX_IDLE_TIMEOUT),
            _ => DEFAULT_IDLE_TIMEOUT,
        }
    }
}
