//! SQLite driver implementation

use async_trait::async_trait;
use dbpool_core::{Connection, Credentials, DatabaseDriver, DatabaseTarget, DbPoolError, Result};

use crate::SqliteConnection;

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn id(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    #[tracing::instrument(skip(self, credentials, target), fields(target = %target.name))]
    async fn connect(
        &self,
        url: &str,
        credentials: &Credentials,
        target: &DatabaseTarget,
    ) -> Result<Box<dyn Connection>> {
        if !credentials.is_anonymous() {
            tracing::debug!("SQLite ignores user credentials");
        }

        let conn = SqliteConnection::open(url).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        if let Some(timeout) = target.busy_timeout() {
            conn.set_busy_timeout(timeout)?;
        }
        for (name, value) in &target.params {
            conn.set_pragma(name, value).map_err(|e| match e {
                DbPoolError::Configuration(_) => e,
                other => DbPoolError::Database(format!(
                    "target '{}': {}",
                    target.name, other
                )),
            })?;
        }

        tracing::info!(path = %conn.path(), "SQLite connection created");
        Ok(Box::new(conn))
    }
}
