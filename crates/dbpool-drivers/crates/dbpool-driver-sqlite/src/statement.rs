//! SQLite prepared statements

use async_trait::async_trait;
use dbpool_core::{PreparedStatement, QueryResult, Result, StatementResult, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::{Session, execute_on, query_on};

/// A statement bound to the session it was prepared on.
///
/// The compiled form lives in rusqlite's per-connection statement cache, so
/// this only records the SQL text and the options applied to it. The query
/// timeout maps to SQLite's busy timeout for each execution; the fetch size
/// is recorded but SQLite always steps rows one at a time.
pub struct SqliteStatement {
    session: Arc<Session>,
    sql: String,
    query_timeout: Option<Duration>,
    fetch_size: Option<u32>,
}

impl SqliteStatement {
    pub(crate) fn new(session: Arc<Session>, sql: String) -> Self {
        Self {
            session,
            sql,
            query_timeout: None,
            fetch_size: None,
        }
    }
}

#[async_trait]
impl PreparedStatement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn set_query_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.query_timeout = Some(timeout);
        Ok(())
    }

    fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    fn set_fetch_size(&mut self, rows: u32) -> Result<()> {
        self.fetch_size = Some(rows);
        Ok(())
    }

    fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    async fn execute(&self, params: &[Value]) -> Result<StatementResult> {
        self.session
            .with_statement(self.query_timeout, |conn| execute_on(conn, &self.sql, params))
    }

    async fn query(&self, params: &[Value]) -> Result<QueryResult> {
        self.session
            .with_statement(self.query_timeout, |conn| query_on(conn, &self.sql, params))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
