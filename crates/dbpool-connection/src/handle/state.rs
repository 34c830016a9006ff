//! Shared state behind a pooled handle

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dbpool_core::{Connection, DatabaseTarget, DbPoolError, Result};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::pool::{ConnectionPool, PoolCounters};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// One native connection plus its pool bookkeeping.
///
/// The native connection is owned here and nowhere else. Who may act on the
/// state is decided by the lease: every `recreate` bumps it, and caller
/// handles or idle entries carrying an older lease are inert.
pub(crate) struct HandleState {
    id: u64,
    native: Box<dyn Connection>,
    poolable: bool,
    closed: AtomicBool,
    /// Cached "native reported closed"; terminal
    broken: AtomicBool,
    destroyed: AtomicBool,
    lease: AtomicU64,
    last_release: Mutex<Option<Instant>>,
    pool: Weak<ConnectionPool>,
    target: Arc<DatabaseTarget>,
    counters: Arc<PoolCounters>,
}

impl HandleState {
    /// Wrap a freshly opened native connection.
    ///
    /// Every handle starts in manual-commit mode; a native connection that
    /// refuses is closed and the error returned.
    pub(crate) async fn open(
        native: Box<dyn Connection>,
        poolable: bool,
        pool: Weak<ConnectionPool>,
        target: Arc<DatabaseTarget>,
        counters: Arc<PoolCounters>,
    ) -> Result<Arc<Self>> {
        if let Err(e) = native.set_auto_commit(false).await {
            if let Err(close_err) = native.close().await {
                tracing::debug!(error = %close_err, "closing rejected connection failed");
            }
            return Err(e);
        }

        counters.record_created();
        let state = Arc::new(Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            native,
            poolable,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            lease: AtomicU64::new(0),
            last_release: Mutex::new(None),
            pool,
            target,
            counters,
        });
        tracing::debug!(handle = state.id, target = %state.target.name, poolable, "handle created");
        Ok(state)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn native(&self) -> &dyn Connection {
        self.native.as_ref()
    }

    pub(crate) fn target(&self) -> &Arc<DatabaseTarget> {
        &self.target
    }

    pub(crate) fn pool(&self) -> Option<Arc<ConnectionPool>> {
        self.pool.upgrade()
    }

    pub(crate) fn is_poolable(&self) -> bool {
        self.poolable
    }

    pub(crate) fn lease(&self) -> u64 {
        self.lease.load(Ordering::Acquire)
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub(crate) fn is_logically_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flip the logical flag to closed; true if it was open
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Whether the native connection has reported closed, asking it once
    pub(crate) fn native_closed(&self) -> bool {
        if self.broken.load(Ordering::Acquire) {
            return true;
        }
        if self.native.is_closed() {
            self.broken.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Record that the handle just went idle
    pub(crate) fn stamp_release(&self) {
        *self.last_release.lock() = Some(Instant::now());
    }

    /// When the handle last went idle; `None` if it never did
    pub(crate) fn last_release(&self) -> Option<Instant> {
        *self.last_release.lock()
    }

    /// Whether an idle handle has outlived `timeout`
    pub(crate) fn idle_expired(&self, timeout: Duration, now: Instant) -> bool {
        match self.last_release() {
            Some(released) => released + timeout < now,
            None => true,
        }
    }

    /// Make an idle handle usable again under a new lease
    pub(crate) fn recreate(&self) -> Result<u64> {
        if !self.poolable {
            return Err(DbPoolError::NotPoolable);
        }
        if self.is_destroyed() || self.native_closed() {
            return Err(DbPoolError::ConnectionClosed);
        }
        let lease = self.lease.fetch_add(1, Ordering::AcqRel) + 1;
        self.closed.store(false, Ordering::Release);
        self.counters.record_reused();
        tracing::trace!(handle = self.id, lease, "handle recreated");
        Ok(lease)
    }

    /// Permanently close the handle; idempotent and never fails
    pub(crate) async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closed.store(true, Ordering::Release);
        self.counters.record_destroyed();
        match AssertUnwindSafe(self.native.close()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(handle = self.id, error = %e, "native close failed during destroy");
            }
            Err(_) => {
                tracing::warn!(handle = self.id, target = %self.target.name, "native close panicked during destroy");
            }
        }
        tracing::debug!(handle = self.id, target = %self.target.name, "handle destroyed");
    }
}

impl Drop for HandleState {
    fn drop(&mut self) {
        self.counters.record_dropped();
    }
}
