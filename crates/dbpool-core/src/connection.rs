//! Native connection surface
//!
//! These traits describe what a driver hands back when it opens a session.
//! Pooled handles implement the same traits, so code written against a
//! native connection works unchanged against a pooled one.

use crate::{DbPoolError, QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Handle for cancelling a running query from any thread.
///
/// The handle is safe to call from any thread and can be called multiple
/// times (subsequent calls are no-ops).
pub trait QueryCancelHandle: Send + Sync {
    /// Cancel the currently running query on the associated connection.
    fn cancel(&self);
}

/// Transaction isolation level applied when a session is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::None => "none",
            IsolationLevel::ReadUncommitted => "read_uncommitted",
            IsolationLevel::ReadCommitted => "read_committed",
            IsolationLevel::RepeatableRead => "repeatable_read",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = DbPoolError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("transaction_").unwrap_or(&lowered);
        match name {
            "none" => Ok(IsolationLevel::None),
            "read_uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(DbPoolError::Configuration(format!(
                "unknown transaction isolation level: {}",
                s
            ))),
        }
    }
}

impl TryFrom<String> for IsolationLevel {
    type Error = DbPoolError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IsolationLevel> for String {
    fn from(level: IsolationLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A native database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Prepare a statement for repeated execution
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// Prepare a stored procedure call
    async fn prepare_call(&self, _sql: &str) -> Result<Box<dyn PreparedStatement>> {
        Err(DbPoolError::NotSupported(format!(
            "stored procedure calls are not supported by the {} driver",
            self.driver_name()
        )))
    }

    /// Whether every statement commits on its own
    async fn auto_commit(&self) -> Result<bool>;

    /// Switch autocommit mode
    async fn set_auto_commit(&self, enabled: bool) -> Result<()>;

    /// Commit the open transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> Result<()>;

    /// Mark the session read-only
    async fn set_read_only(&self, _read_only: bool) -> Result<()> {
        Ok(())
    }

    /// Set the session isolation level
    async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        Err(DbPoolError::NotSupported(format!(
            "isolation level {} is not supported by the {} driver",
            level,
            self.driver_name()
        )))
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Get a handle that can be used to cancel running queries.
    ///
    /// Returns `None` if the driver does not support query cancellation.
    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        None
    }
}

/// A prepared statement
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// SQL text this statement was prepared from
    fn sql(&self) -> &str;

    /// Limit how long a single execution may wait on the database
    fn set_query_timeout(&mut self, timeout: Duration) -> Result<()>;

    fn query_timeout(&self) -> Option<Duration>;

    /// Hint how many rows to fetch per round trip
    fn set_fetch_size(&mut self, rows: u32) -> Result<()>;

    fn fetch_size(&self) -> Option<u32>;

    /// Execute the prepared statement with parameters
    async fn execute(&self, params: &[Value]) -> Result<StatementResult>;

    /// Query the prepared statement with parameters
    async fn query(&self, params: &[Value]) -> Result<QueryResult>;

    /// Close/deallocate the prepared statement
    async fn close(self: Box<Self>) -> Result<()>;
}
