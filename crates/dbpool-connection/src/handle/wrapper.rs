//! The caller-facing pooled connection

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dbpool_core::{
    Connection, DatabaseTarget, DbPoolError, IsolationLevel, PreparedStatement, QueryCancelHandle,
    QueryResult, Result, StatementResult, Value,
};

use super::HandleState;
use crate::pool::IdleEntry;

/// A connection handed out by a pool.
///
/// Holds the handle state together with the lease it was issued under.
/// Once the state has been recreated for another caller, this value is
/// stale: it reports closed, rejects work, and `close`/`destroy` on it do
/// nothing.
pub struct PooledConnection {
    state: Arc<HandleState>,
    lease: u64,
}

impl PooledConnection {
    pub(crate) fn new(state: Arc<HandleState>, lease: u64) -> Self {
        Self { state, lease }
    }

    /// Wrap a brand-new state under its initial lease
    pub(crate) fn fresh(state: Arc<HandleState>) -> Self {
        let lease = state.lease();
        Self { state, lease }
    }

    fn is_current(&self) -> bool {
        self.state.lease() == self.lease
    }

    /// The native connection, if this handle may still use it
    fn live(&self) -> Result<&dyn Connection> {
        if self.state.is_logically_closed() || self.is_closed() {
            return Err(DbPoolError::ConnectionClosed);
        }
        Ok(self.state.native())
    }

    /// Process-unique id of the underlying handle, stable across reuse
    pub fn id(&self) -> u64 {
        self.state.id()
    }

    /// Target this handle was opened for
    pub fn target(&self) -> &DatabaseTarget {
        self.state.target()
    }

    /// Whether `close` may return this handle to a pool
    pub fn is_poolable(&self) -> bool {
        self.state.is_poolable()
    }

    /// Whether the underlying handle has been permanently closed
    pub fn is_destroyed(&self) -> bool {
        self.state.is_destroyed()
    }

    /// When the handle was last released to the idle queue
    pub fn last_time(&self) -> Option<Instant> {
        self.state.last_release()
    }

    /// Permanently close the handle instead of returning it to the pool
    pub async fn destroy(&self) {
        if self.is_current() {
            self.state.destroy().await;
        }
    }

    /// Take the handle back into use under a new lease.
    ///
    /// Any copy of this handle sitting in the idle queue stops resolving.
    pub fn recreate(&self) -> Result<PooledConnection> {
        if !self.state.is_poolable() {
            return Err(DbPoolError::NotPoolable);
        }
        if !self.is_current() {
            return Err(DbPoolError::ConnectionClosed);
        }
        let lease = self.state.recreate()?;
        Ok(PooledConnection::new(Arc::clone(&self.state), lease))
    }

    /// Roll back unless the native connection is autocommitting
    async fn reset_transaction(&self) {
        let native = self.state.native();
        match native.auto_commit().await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                if let Err(e) = native.rollback().await {
                    tracing::debug!(handle = self.state.id(), error = %e, "rollback on release failed");
                }
            }
        }
    }

    async fn release_to_pool(&self) {
        let state = &self.state;
        if state.native_closed() {
            state.destroy().await;
            return;
        }

        self.reset_transaction().await;

        let pool = match state.pool() {
            Some(pool) if !pool.is_destroyed() => pool,
            _ => {
                tracing::debug!(handle = state.id(), "pool gone, destroying released handle");
                state.destroy().await;
                return;
            }
        };

        if let Err(e) = state.native().set_auto_commit(false).await {
            tracing::debug!(handle = state.id(), error = %e, "could not restore manual commit");
            state.destroy().await;
            return;
        }

        state.stamp_release();
        if !pool.offer(IdleEntry::new(Arc::clone(state), self.lease)) {
            tracing::debug!(handle = state.id(), pool = %pool.name(), "idle queue full, destroying released handle");
            state.destroy().await;
        }
    }

    async fn close_single_use(&self) {
        self.reset_transaction().await;
        self.state.destroy().await;
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.state.id())
            .field("target", &self.state.target().name)
            .field("lease", &self.lease)
            .field("poolable", &self.state.is_poolable())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Connection for PooledConnection {
    fn driver_name(&self) -> &str {
        self.state.native().driver_name()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.live()?.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.live()?.query(sql, params).await
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let mut stmt = self.live()?.prepare(sql).await?;
        self.state.target().apply_statement_options(stmt.as_mut())?;
        Ok(stmt)
    }

    async fn prepare_call(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let mut stmt = self.live()?.prepare_call(sql).await?;
        self.state.target().apply_statement_options(stmt.as_mut())?;
        Ok(stmt)
    }

    async fn auto_commit(&self) -> Result<bool> {
        self.live()?.auto_commit().await
    }

    async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        self.live()?.set_auto_commit(enabled).await
    }

    async fn commit(&self) -> Result<()> {
        self.live()?.commit().await
    }

    async fn rollback(&self) -> Result<()> {
        self.live()?.rollback().await
    }

    async fn set_read_only(&self, read_only: bool) -> Result<()> {
        self.live()?.set_read_only(read_only).await
    }

    async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        self.live()?.set_transaction_isolation(level).await
    }

    /// Return the handle to its pool, or destroy it.
    ///
    /// Never fails: cleanup faults are logged and swallowed. Repeated calls
    /// and calls on a stale handle do nothing.
    async fn close(&self) -> Result<()> {
        if !self.is_current() || !self.state.mark_closed() {
            return Ok(());
        }
        if self.state.is_poolable() {
            self.release_to_pool().await;
        } else {
            self.close_single_use().await;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        if !self.is_current() {
            return true;
        }
        if !self.state.is_poolable() {
            return self.state.native().is_closed();
        }
        self.state.is_logically_closed() || self.state.native_closed()
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        self.live().ok()?.cancel_handle()
    }
}
