//! Test fixtures and utilities for pool testing
//!
//! Provides SQLite databases in temporary directories, a fault-injecting
//! wrapper around the SQLite driver, and helpers to build pools the way a
//! host process would.
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::fixtures::{TestDatabase, loaded_registry, quiet_monitor};
//!
//! #[tokio::test]
//! async fn test_basic_pool() -> anyhow::Result<()> {
//!     let db = TestDatabase::new().await?;
//!     let monitor = quiet_monitor();
//!     let pool = ConnectionPool::new(db.target("main"), loaded_registry()?, &monitor);
//!     let conn = pool.acquire().await?;
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use dbpool_connection::{MonitorConfig, PoolMonitor};
use dbpool_core::{
    Connection, Credentials, DatabaseDriver, DatabaseTarget, DbPoolError, DriverManager,
};
use dbpool_driver_sqlite::{SqliteConnection, SqliteDriver};
use dbpool_drivers::DriverRegistry;
use tempfile::TempDir;

/// Busy timeout given to every test target so concurrent sessions wait on
/// locks instead of failing
pub const TEST_BUSY_TIMEOUT_MS: i64 = 2_000;

/// A SQLite database file living in its own temporary directory
pub struct TestDatabase {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDatabase {
    /// Create an empty database with the `items` table
    pub async fn new() -> Result<Self> {
        initialize_logging();

        let dir = tempfile::tempdir().context("failed to create temp dir")?;
        let path = dir.path().join("pool-test.db");
        let conn = SqliteConnection::open(&path.to_string_lossy())
            .context("failed to create test database")?;
        conn.execute(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL)",
            &[],
        )
        .await
        .context("failed to create items table")?;
        conn.close().await.context("failed to close seed connection")?;

        Ok(Self { _dir: dir, path })
    }

    /// Connection URL of the database file
    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    /// A target named `name` pointing at this database
    pub fn target(&self, name: &str) -> DatabaseTarget {
        DatabaseTarget::new(name, "sqlite", &self.url()).with_busy_timeout_ms(TEST_BUSY_TIMEOUT_MS)
    }
}

/// SQLite driver that fails a configurable number of connects
pub struct FlakyDriver {
    inner: SqliteDriver,
    failures: AtomicUsize,
    connects: AtomicUsize,
}

impl FlakyDriver {
    /// A driver that never fails until told to
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteDriver::new(),
            failures: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        })
    }

    /// Make the next `count` connects fail
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of connect attempts seen, failed ones included
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseDriver for FlakyDriver {
    fn id(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(
        &self,
        url: &str,
        credentials: &Credentials,
        target: &DatabaseTarget,
    ) -> dbpool_core::Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            tracing::debug!("injected connect failure");
            return Err(DbPoolError::Database("injected connect failure".into()));
        }
        self.inner.connect(url, credentials, target).await
    }
}

/// Driver registry with the built-in drivers already registered
pub fn loaded_registry() -> Result<Arc<dyn DriverManager>> {
    let registry = DriverRegistry::with_defaults();
    registry
        .register_driver("sqlite")
        .context("sqlite driver missing from the catalog")?;
    Ok(Arc::new(registry))
}

/// Driver registry that only catalogs `driver`, so the first open has to
/// register it
pub fn catalog_only(driver: Arc<dyn DatabaseDriver>) -> Arc<DriverRegistry> {
    let registry = DriverRegistry::new();
    registry.add_to_catalog(driver);
    Arc::new(registry)
}

/// Monitor that never pauses, for driving sweeps by hand
pub fn quiet_monitor() -> Arc<PoolMonitor> {
    PoolMonitor::new(MonitorConfig::immediate())
}

/// Number of rows in `items` as seen by `conn`
pub async fn count_items(conn: &dyn Connection) -> Result<i64> {
    let result = conn
        .query("SELECT COUNT(*) FROM items", &[])
        .await
        .context("failed to count items")?;
    let row = result.rows.first().context("count returned no row")?;
    row.get(0)
        .and_then(|value| value.as_i64())
        .context("count was not an integer")
}

/// Initialize logging for tests if not already initialized
///
/// This sets up tracing with appropriate filters for test output.
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("dbpool_connection=debug,dbpool_driver_tests=debug")
        });
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_fixture() -> Result<()> {
        let db = TestDatabase::new().await?;
        assert!(db.url().starts_with("sqlite://"));

        let conn = SqliteConnection::open(&db.url())?;
        assert_eq!(count_items(&conn).await?, 0);
        conn.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_flaky_driver_recovers() -> Result<()> {
        let db = TestDatabase::new().await?;
        let driver = FlakyDriver::new();
        driver.fail_next(1);

        let target = db.target("main");
        let credentials = Credentials::default();
        assert!(driver.connect(&db.url(), &credentials, &target).await.is_err());
        let conn = driver.connect(&db.url(), &credentials, &target).await?;
        assert_eq!(driver.connects(), 2);
        conn.close().await?;
        Ok(())
    }
}
