//! Pool statistics types

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Counters shared between a pool and the handles it created.
///
/// Handles hold their own `Arc` to these, so the counts stay correct for
/// handles that outlive their pool.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    created: AtomicU64,
    reused: AtomicU64,
    destroyed: AtomicU64,
    live: AtomicUsize,
}

impl PoolCounters {
    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    /// A handle's state was dropped, destroyed or not
    pub(crate) fn record_dropped(&self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, idle: usize) -> PoolStats {
        let live = self.live.load(Ordering::Relaxed);
        PoolStats {
            idle,
            active: live.saturating_sub(idle),
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about a connection pool's current state
///
/// `active` counts handles that exist outside the idle queue: checked out,
/// or closed by a caller that still holds them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Entries currently in the idle queue
    idle: usize,
    /// Handles alive outside the idle queue
    active: usize,
    /// Native connections opened over the pool's lifetime
    created: u64,
    /// Acquisitions served from the idle queue
    reused: u64,
    /// Handles permanently destroyed
    destroyed: u64,
}

impl PoolStats {
    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn reused(&self) -> u64 {
        self.reused
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed
    }

    /// Share of acquisitions served without opening a connection (0.0 to 1.0)
    ///
    /// Returns 0.0 before the first acquisition.
    pub fn reuse_ratio(&self) -> f64 {
        let total = self.created + self.reused;
        if total == 0 {
            0.0
        } else {
            self.reused as f64 / total as f64
        }
    }
}
