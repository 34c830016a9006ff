//! Monitor worker and sweep implementation

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dbpool_core::{DbPoolError, Result};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::config::MonitorConfig;
use crate::pool::ConnectionPool;

/// Lifecycle of the monitor worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Created,
    Running,
    Stopped,
}

impl MonitorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => MonitorState::Created,
            1 => MonitorState::Running,
            _ => MonitorState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MonitorState::Created => 0,
            MonitorState::Running => 1,
            MonitorState::Stopped => 2,
        }
    }
}

/// What one sweep pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pools with a non-empty idle queue that were scanned
    pub pools: usize,
    /// Idle entries looked at
    pub inspected: usize,
    /// Invalidated entries dropped from a queue
    pub discarded: usize,
    /// Expired handles removed and destroyed
    pub evicted: usize,
}

/// Background idle eviction shared by all pools.
///
/// Pools are held weakly; a pool dropped without `destroy` simply falls out
/// of the set on the next pass.
pub struct PoolMonitor {
    config: MonitorConfig,
    pools: DashMap<Uuid, Weak<ConnectionPool>>,
    state: AtomicU8,
    /// Bumped by every start so a worker from an earlier run cannot
    /// resume after a restart
    epoch: AtomicU64,
    wake: Notify,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Makes the next worker pass panic outside any entry
    #[cfg(test)]
    pub(crate) fault_next_pass: std::sync::atomic::AtomicBool,
}

impl PoolMonitor {
    pub fn new(config: MonitorConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            pools: DashMap::new(),
            state: AtomicU8::new(MonitorState::Created.as_u8()),
            epoch: AtomicU64::new(0),
            wake: Notify::new(),
            worker: Mutex::new(None),
            #[cfg(test)]
            fault_next_pass: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(MonitorConfig::default())
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True only once the monitor has been stopped
    pub fn is_stop(&self) -> bool {
        self.state() == MonitorState::Stopped
    }

    /// Start the worker task on the current tokio runtime.
    ///
    /// Starting a running monitor does nothing; a stopped monitor can be
    /// started again.
    pub fn start_thread(self: &Arc<Self>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            DbPoolError::NotSupported("the pool monitor needs a tokio runtime".into())
        })?;

        loop {
            let current = self.state.load(Ordering::Acquire);
            if current == MonitorState::Running.as_u8() {
                return Ok(());
            }
            if self
                .state
                .compare_exchange(
                    current,
                    MonitorState::Running.as_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                break;
            }
        }

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let monitor = Arc::clone(self);
        let handle = runtime.spawn(async move { monitor.run(epoch).await });
        // An earlier worker notices its stale epoch and exits by itself
        drop(self.worker.lock().replace(handle));
        Ok(())
    }

    /// Ask a running worker to stop; it exits at its next check.
    ///
    /// A monitor that was never started stays `Created`.
    pub fn stop_thread(&self) {
        let stopped = self
            .state
            .compare_exchange(
                MonitorState::Running.as_u8(),
                MonitorState::Stopped.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if stopped {
            tracing::info!("pool monitor stop requested");
            self.wake.notify_waiters();
        }
    }

    /// Wait for the worker to exit, re-raising a panic it died from.
    ///
    /// Call after `stop_thread`; a running worker never exits on its own.
    pub async fn join(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return;
        };
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => tracing::debug!(error = %e, "pool monitor worker cancelled"),
        }
    }

    /// Add a pool to the sweep set
    pub fn set_pooling(&self, pool: &Arc<ConnectionPool>) {
        self.pools.insert(pool.id(), Arc::downgrade(pool));
        tracing::debug!(pool = %pool.name(), "pool registered with monitor");
    }

    /// Remove a pool from the sweep set
    pub fn clear_pooling(&self, pool: &ConnectionPool) {
        if self.pools.remove(&pool.id()).is_some() {
            tracing::debug!(pool = %pool.name(), "pool deregistered from monitor");
        }
    }

    pub fn is_pooling(&self, pool: &ConnectionPool) -> bool {
        self.pools.contains_key(&pool.id())
    }

    /// Number of registered pools
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Run one full pass over every registered pool
    pub async fn sweep_once(&self) -> SweepReport {
        self.sweep(None).await
    }

    fn should_run(&self, epoch: u64) -> bool {
        self.state() == MonitorState::Running && self.epoch.load(Ordering::Acquire) == epoch
    }

    fn keep_sweeping(&self, epoch: Option<u64>) -> bool {
        epoch.is_none_or(|epoch| self.should_run(epoch))
    }

    async fn pause(&self, pause: Duration) {
        if pause.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = self.wake.notified() => {}
        }
    }

    async fn run(self: Arc<Self>, epoch: u64) {
        let outcome = AssertUnwindSafe(self.work(epoch)).catch_unwind().await;
        if let Err(panic) = outcome {
            tracing::error!("pool monitor worker panicked, clearing registered pools");
            self.pools.clear();
            self.state
                .store(MonitorState::Stopped.as_u8(), Ordering::Release);
            std::panic::resume_unwind(panic);
        }
    }

    async fn work(&self, epoch: u64) {
        tracing::info!("pool monitor started");
        while self.should_run(epoch) {
            #[cfg(test)]
            if self.fault_next_pass.swap(false, Ordering::AcqRel) {
                panic!("injected monitor pass fault");
            }
            let report = self.sweep(Some(epoch)).await;
            if report.evicted > 0 || report.discarded > 0 {
                tracing::debug!(
                    evicted = report.evicted,
                    discarded = report.discarded,
                    "idle sweep finished"
                );
            }
            if !self.should_run(epoch) {
                break;
            }
            let pause = if report.inspected == 0 {
                self.config.idle_pause
            } else {
                self.config.pool_pause
            };
            self.pause(pause).await;
        }
        tracing::info!("pool monitor stopped");
    }

    async fn sweep(&self, epoch: Option<u64>) -> SweepReport {
        let mut report = SweepReport::default();

        let registered: Vec<(Uuid, Weak<ConnectionPool>)> = self
            .pools
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (index, (id, weak)) in registered.into_iter().enumerate() {
            if !self.keep_sweeping(epoch) {
                break;
            }
            let Some(pool) = weak.upgrade() else {
                self.pools.remove(&id);
                continue;
            };
            if pool.is_destroyed() || pool.size() == 0 {
                continue;
            }
            if index > 0 {
                self.pause(self.config.pool_pause).await;
            }
            report.pools += 1;
            self.sweep_pool(&pool, epoch, &mut report).await;
        }
        report
    }

    async fn sweep_pool(
        &self,
        pool: &ConnectionPool,
        epoch: Option<u64>,
        report: &mut SweepReport,
    ) {
        let timeout = pool.idle_timeout();
        for entry in pool.idle_snapshot() {
            if !self.keep_sweeping(epoch) {
                return;
            }
            report.inspected += 1;
            match entry.resolve() {
                None => {
                    if pool.remove_idle(&entry) {
                        report.discarded += 1;
                    }
                }
                Some(state) => {
                    // Only the sweeper that takes the entry out may destroy it;
                    // a handle an acquirer got first is left alone
                    if state.idle_expired(timeout, Instant::now()) && pool.remove_idle(&entry) {
                        tracing::debug!(pool = %pool.name(), handle = state.id(), "evicting idle handle");
                        state.destroy().await;
                        report.evicted += 1;
                    }
                }
            }
            self.pause(self.config.entry_pause).await;
        }
    }
}

impl std::fmt::Debug for PoolMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMonitor")
            .field("state", &self.state())
            .field("pools", &self.pools.len())
            .field("config", &self.config)
            .finish()
    }
}
