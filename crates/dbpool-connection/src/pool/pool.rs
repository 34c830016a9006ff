//! Connection pool implementation

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dbpool_core::{Connection, Credentials, DatabaseTarget, DbPoolError, DriverManager, Result};
use uuid::Uuid;

use super::config::PoolConfig;
use super::idle::{IdleEntry, IdleQueue};
use super::stats::{PoolCounters, PoolStats};
use crate::handle::{HandleState, PooledConnection};
use crate::monitor::PoolMonitor;

/// Open a native connection, registering the driver and retrying once when
/// the first attempt fails
pub(crate) async fn open_native(
    drivers: &dyn DriverManager,
    target: &DatabaseTarget,
    credentials: &Credentials,
) -> Result<Box<dyn Connection>> {
    match drivers.open(target, credentials).await {
        Ok(conn) => Ok(conn),
        Err(first) => {
            tracing::warn!(
                target = %target.name,
                driver = %target.driver,
                error = %first,
                "connection attempt failed, registering driver and retrying"
            );
            drivers.register_driver(&target.driver).map_err(|e| {
                DbPoolError::DriverUnavailable(format!(
                    "driver '{}' for target '{}': {} (first attempt: {})",
                    target.driver, target.name, e, first
                ))
            })?;
            drivers.open(target, credentials).await.map_err(|e| {
                tracing::error!(target = %target.name, error = %e, "connection retry failed");
                e
            })
        }
    }
}

/// A pool of connections to one database target
///
/// Released handles wait in a bounded idle queue until the next
/// `acquire`; the shared `PoolMonitor` destroys the ones that stay idle
/// past the idle timeout. There is no bound on checked-out handles.
pub struct ConnectionPool {
    id: Uuid,
    target: Arc<DatabaseTarget>,
    drivers: Arc<dyn DriverManager>,
    config: PoolConfig,
    idle_timeout: Duration,
    idle: IdleQueue,
    destroyed: AtomicBool,
    counters: Arc<PoolCounters>,
    monitor: Weak<PoolMonitor>,
}

impl ConnectionPool {
    /// Create a pool tuned by the target's own settings and register it
    /// with the monitor
    pub fn new(
        target: DatabaseTarget,
        drivers: Arc<dyn DriverManager>,
        monitor: &Arc<PoolMonitor>,
    ) -> Arc<Self> {
        let config = PoolConfig::from_target(&target);
        Self::with_config(target, config, drivers, monitor)
    }

    /// Create a pool with explicit tuning and register it with the monitor
    pub fn with_config(
        target: DatabaseTarget,
        config: PoolConfig,
        drivers: Arc<dyn DriverManager>,
        monitor: &Arc<PoolMonitor>,
    ) -> Arc<Self> {
        let max_idle = config.max_idle_size();
        let idle_timeout = config.idle_timeout();
        let pool = Arc::new(Self {
            id: Uuid::new_v4(),
            target: Arc::new(target),
            drivers,
            config,
            idle_timeout,
            idle: IdleQueue::new(max_idle),
            destroyed: AtomicBool::new(false),
            counters: Arc::new(PoolCounters::default()),
            monitor: Arc::downgrade(monitor),
        });
        monitor.set_pooling(&pool);
        tracing::info!(
            pool = %pool.name(),
            driver = %pool.target.driver,
            max_idle,
            idle_timeout_ms = idle_timeout.as_millis() as u64,
            "connection pool created"
        );
        pool
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(DbPoolError::PoolUnavailable(format!(
                "pool '{}' has been destroyed",
                self.name()
            )));
        }
        Ok(())
    }

    /// Get a connection, reusing an idle one when possible
    ///
    /// Idle entries are taken in release order. Entries whose handle was
    /// invalidated are skipped silently; a handle that cannot be recreated
    /// is destroyed and the next entry tried. With nothing usable left, a
    /// new native connection is opened.
    #[tracing::instrument(skip(self), fields(pool = %self.target.name))]
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        self.ensure_available()?;

        while let Some(entry) = self.idle.poll() {
            let Some(state) = entry.resolve() else {
                tracing::trace!("skipping invalidated idle entry");
                continue;
            };
            match state.recreate() {
                Ok(lease) => {
                    tracing::debug!(handle = state.id(), "reusing idle handle");
                    return Ok(PooledConnection::new(Arc::clone(state), lease));
                }
                Err(e) => {
                    tracing::debug!(handle = state.id(), error = %e, "idle handle unusable");
                    state.destroy().await;
                }
            }
        }

        let credentials = Credentials::from_target(&self.target);
        let native = open_native(self.drivers.as_ref(), &self.target, &credentials).await?;
        let state = HandleState::open(
            native,
            true,
            Arc::downgrade(self),
            Arc::clone(&self.target),
            Arc::clone(&self.counters),
        )
        .await?;
        Ok(PooledConnection::fresh(state))
    }

    /// Open a single-use connection with explicit credentials
    ///
    /// The idle queue is never consulted, and the handle is destroyed when
    /// closed.
    #[tracing::instrument(skip(self, password), fields(pool = %self.target.name))]
    pub async fn acquire_with_credentials(
        &self,
        user: &str,
        password: &str,
    ) -> Result<PooledConnection> {
        self.ensure_available()?;

        let credentials = Credentials::new(user, password);
        let native = open_native(self.drivers.as_ref(), &self.target, &credentials).await?;
        let state = HandleState::open(
            native,
            false,
            Weak::new(),
            Arc::clone(&self.target),
            Arc::clone(&self.counters),
        )
        .await?;
        Ok(PooledConnection::fresh(state))
    }

    /// Queue a released handle; false when it must be destroyed instead
    pub(crate) fn offer(&self, entry: IdleEntry) -> bool {
        self.idle.offer(entry)
    }

    pub(crate) fn idle_snapshot(&self) -> Vec<IdleEntry> {
        self.idle.snapshot()
    }

    /// Take an entry out of the queue; false when it was already gone
    pub(crate) fn remove_idle(&self, entry: &IdleEntry) -> bool {
        self.idle.remove(entry)
    }

    /// Destroy every idle handle and refuse further use; idempotent
    #[tracing::instrument(skip(self), fields(pool = %self.target.name))]
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.clear_pooling(self);
        }

        let entries = self.idle.close();
        let drained = entries.len();
        for entry in entries {
            if let Some(state) = entry.resolve() {
                state.destroy().await;
            }
        }
        let stats = self.stats();
        tracing::info!(
            drained,
            created = stats.created(),
            reuse_ratio = stats.reuse_ratio(),
            "connection pool destroyed"
        );
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the target this pool serves
    pub fn name(&self) -> &str {
        &self.target.name
    }

    /// Entries currently in the idle queue
    pub fn size(&self) -> usize {
        self.idle.len()
    }

    /// Effective idle queue bound
    pub fn max_idle(&self) -> usize {
        self.config.max_idle_size()
    }

    /// Effective idle timeout
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// The target descriptor this pool was built from
    pub fn describe(&self) -> &Arc<DatabaseTarget> {
        &self.target
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.size())
    }
}

impl fmt::Display for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.target.summary();
        write!(
            f,
            "{} [{}] {} (idle {}/{}, timeout {}ms{})",
            summary.name,
            summary.driver,
            summary.url,
            self.size(),
            self.max_idle(),
            self.idle_timeout.as_millis(),
            if self.is_destroyed() { ", destroyed" } else { "" }
        )
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("max_idle", &self.max_idle())
            .field("idle_timeout", &self.idle_timeout)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
