//! Named directory of pools

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dbpool_core::{DatabaseTarget, DbPoolError, Result};
use parking_lot::Mutex;

use crate::handle::PooledConnection;
use crate::pool::ConnectionPool;

/// Maps names to pools and remembers registration order.
///
/// The map and the ordered name list are updated within the same call, with
/// the list lock held across the map update so enumeration never sees a
/// name the map lacks.
pub struct PoolRegistry {
    pools: DashMap<String, Arc<ConnectionPool>>,
    order: Mutex<Vec<String>>,
    destroyed: AtomicBool,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            order: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(DbPoolError::RegistryDestroyed);
        }
        Ok(())
    }

    /// Register a pool under `name`
    #[tracing::instrument(skip(self, pool))]
    pub fn register(&self, name: &str, pool: Arc<ConnectionPool>) -> Result<()> {
        self.ensure_live()?;
        if name.is_empty() {
            return Err(DbPoolError::InvalidName);
        }
        if pool.is_destroyed() {
            return Err(DbPoolError::PoolUnavailable(format!(
                "pool '{}' has been destroyed",
                pool.name()
            )));
        }

        let mut order = self.order.lock();
        // destroy() may have drained the registry while we waited for the lock
        self.ensure_live()?;
        match self.pools.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(DbPoolError::DuplicateName(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(pool);
            }
        }
        order.push(name.to_string());
        tracing::info!("pool registered");
        Ok(())
    }

    /// Register a pool under its target's own name
    pub fn register_pool(&self, pool: Arc<ConnectionPool>) -> Result<()> {
        let name = pool.name().to_string();
        self.register(&name, pool)
    }

    /// Remove a pool without destroying it; the caller owns it afterwards
    #[tracing::instrument(skip(self))]
    pub fn release(&self, name: &str) -> Result<Option<Arc<ConnectionPool>>> {
        self.ensure_live()?;
        if name.is_empty() {
            return Err(DbPoolError::InvalidName);
        }

        let mut order = self.order.lock();
        let removed = self.pools.remove(name).map(|(_, pool)| pool);
        if removed.is_some() {
            order.retain(|n| n != name);
            tracing::info!("pool released");
        }
        Ok(removed)
    }

    /// Look up a pool by name
    pub fn get(&self, name: &str) -> Result<Arc<ConnectionPool>> {
        self.ensure_live()?;
        self.pools
            .get(name)
            .map(|pool| Arc::clone(pool.value()))
            .ok_or_else(|| {
                tracing::debug!(pool = %name, "pool not found in registry");
                DbPoolError::UnknownName(name.to_string())
            })
    }

    /// Acquire a connection from the named pool
    pub async fn get_connection(&self, name: &str) -> Result<PooledConnection> {
        let pool = self.get(name)?;
        pool.acquire().await
    }

    /// Target descriptor of the named pool
    pub fn get_target(&self, name: &str) -> Result<Arc<DatabaseTarget>> {
        Ok(Arc::clone(self.get(name)?.describe()))
    }

    pub fn size(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.order.lock().len())
    }

    /// Names in registration order
    pub fn names(&self) -> Result<Vec<String>> {
        self.ensure_live()?;
        Ok(self.order.lock().clone())
    }

    /// Append the names, in registration order, to `out`
    pub fn names_into(&self, out: &mut Vec<String>) -> Result<()> {
        self.ensure_live()?;
        out.extend(self.order.lock().iter().cloned());
        Ok(())
    }

    /// Name at `index` in registration order
    pub fn get_name(&self, index: usize) -> Result<Option<String>> {
        self.ensure_live()?;
        Ok(self.order.lock().get(index).cloned())
    }

    /// Whether a pool is registered under `name`; false once destroyed
    pub fn contains(&self, name: &str) -> bool {
        !self.destroyed.load(Ordering::Acquire) && self.pools.contains_key(name)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Redacted descriptors of every pool in registration order
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let names = self.names()?;
        let targets: Vec<serde_json::Value> = names
            .iter()
            .filter_map(|name| self.pools.get(name).map(|pool| pool.describe().summary()))
            .map(|summary| serde_json::to_value(summary).map_err(DbPoolError::database))
            .collect::<Result<_>>()?;
        Ok(serde_json::Value::Array(targets))
    }

    /// Destroy every pool and empty the registry; idempotent
    #[tracing::instrument(skip(self))]
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let pools: Vec<Arc<ConnectionPool>> = {
            let mut order = self.order.lock();
            let pools = order
                .iter()
                .filter_map(|name| self.pools.remove(name).map(|(_, pool)| pool))
                .collect();
            order.clear();
            pools
        };
        self.pools.clear();

        let count = pools.len();
        for pool in pools {
            pool.destroy().await;
        }
        tracing::info!(pools = count, "pool registry destroyed");
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
