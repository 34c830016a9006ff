//! Driver registry for managing available database drivers

use async_trait::async_trait;
use dbpool_core::{
    Connection, Credentials, DatabaseDriver, DatabaseTarget, DbPoolError, DriverManager, Result,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available database drivers.
///
/// Drivers live in two places: the catalog holds every driver this build can
/// provide, the loaded set holds the ones that have been registered. Only
/// loaded drivers can open sessions, so a pool's first acquisition against a
/// fresh registry fails with `DriverUnavailable` and succeeds after
/// `register_driver`.
pub struct DriverRegistry {
    catalog: RwLock<HashMap<String, Arc<dyn DatabaseDriver>>>,
    loaded: RwLock<HashMap<String, Arc<dyn DatabaseDriver>>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            catalog: RwLock::new(HashMap::new()),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry whose catalog holds all built-in drivers
    pub fn with_defaults() -> Self {
        let registry = Self::new();

        #[cfg(feature = "sqlite")]
        registry.add_to_catalog(Arc::new(crate::sqlite::SqliteDriver::new()));

        registry
    }

    /// Make a driver registrable by id without loading it
    pub fn add_to_catalog(&self, driver: Arc<dyn DatabaseDriver>) {
        let id = driver.id().to_string();
        tracing::debug!(driver = %id, "adding driver to catalog");
        self.catalog.write().insert(id, driver);
    }

    /// Load a driver directly, bypassing the catalog
    pub fn register(&self, driver: Arc<dyn DatabaseDriver>) {
        let id = driver.id().to_string();
        tracing::info!(driver = %id, "registering database driver");
        self.loaded.write().insert(id, driver);
    }

    /// Get a loaded driver by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.loaded.read().get(id).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %id, "driver not found in registry");
        }
        driver
    }

    /// List all loaded driver ids
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.loaded.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// List every driver id the catalog can provide
    pub fn available(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.catalog.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Check if a driver is loaded
    pub fn has(&self, id: &str) -> bool {
        self.loaded.read().contains_key(id)
    }

    /// Apply the baseline every pooled session starts from
    async fn apply_session_baseline(
        conn: &dyn Connection,
        target: &DatabaseTarget,
    ) -> Result<()> {
        if target.read_only {
            conn.set_read_only(true).await?;
        }
        conn.set_auto_commit(false).await?;
        if let Some(level) = target.transaction_isolation {
            conn.set_transaction_isolation(level).await?;
        }
        Ok(())
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl DriverManager for DriverRegistry {
    #[tracing::instrument(skip(self, target, credentials), fields(target = %target.name, driver = %target.driver))]
    async fn open(
        &self,
        target: &DatabaseTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>> {
        let driver = self.get(&target.driver).ok_or_else(|| {
            DbPoolError::DriverUnavailable(format!(
                "no registered driver for '{}'",
                target.driver
            ))
        })?;

        let conn = driver
            .connect(&target.connection_url(), credentials, target)
            .await?;

        if let Err(e) = Self::apply_session_baseline(conn.as_ref(), target).await {
            tracing::warn!(error = %e, "session baseline failed, closing connection");
            if let Err(close_err) = conn.close().await {
                tracing::debug!(error = %close_err, "close after baseline failure also failed");
            }
            return Err(e);
        }

        tracing::debug!("native connection opened");
        Ok(conn)
    }

    fn register_driver(&self, driver_id: &str) -> Result<()> {
        if self.has(driver_id) {
            return Ok(());
        }
        let driver = self.catalog.read().get(driver_id).cloned().ok_or_else(|| {
            DbPoolError::DriverUnavailable(format!(
                "driver '{}' is not available in this build",
                driver_id
            ))
        })?;
        self.register(driver);
        Ok(())
    }
}
