//! SQLite connection implementation

use async_trait::async_trait;
use dbpool_core::{
    ColumnMeta, Connection, DbPoolError, IsolationLevel, PreparedStatement, QueryCancelHandle,
    QueryResult, Result, Row, StatementResult, Value,
};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, InterruptHandle, OpenFlags, params_from_iter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::SqliteStatement;

/// Cancel handle for SQLite queries.
///
/// This wraps the rusqlite `InterruptHandle` and can be called from any thread
/// to interrupt a running query. The interrupted query will return SQLITE_INTERRUPT.
pub struct SqliteCancelHandle {
    interrupt_handle: Arc<InterruptHandle>,
}

impl QueryCancelHandle for SqliteCancelHandle {
    fn cancel(&self) {
        tracing::debug!("Interrupting SQLite query");
        self.interrupt_handle.interrupt();
    }
}

/// State shared between a connection and the statements it prepared.
///
/// SQLite has no session-level autocommit switch, so manual-commit mode is
/// emulated: while `auto_commit` is off, the first statement after a commit
/// or rollback opens a deferred transaction.
pub(crate) struct Session {
    conn: Mutex<Option<RusqliteConnection>>,
    auto_commit: AtomicBool,
    closed: AtomicBool,
}

impl Session {
    /// Run `f` on the live connection, opening a transaction first when
    /// manual-commit mode requires one.
    pub(crate) fn with_statement<T>(
        &self,
        busy_timeout: Option<Duration>,
        f: impl FnOnce(&RusqliteConnection) -> Result<T>,
    ) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(DbPoolError::ConnectionClosed)?;
        if let Some(timeout) = busy_timeout {
            conn.busy_timeout(timeout).map_err(DbPoolError::database)?;
        }
        if !self.auto_commit.load(Ordering::Acquire) && conn.is_autocommit() {
            conn.execute_batch("BEGIN DEFERRED").map_err(|e| {
                DbPoolError::Database(format!("Failed to begin transaction: {}", e))
            })?;
        }
        f(conn)
    }

    /// Run `f` on the live connection without touching transaction state
    fn with_conn<T>(&self, f: impl FnOnce(&RusqliteConnection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(DbPoolError::ConnectionClosed)?;
        f(conn)
    }

    fn finish_transaction(&self, verb: &str) -> Result<()> {
        self.with_conn(|conn| {
            if conn.is_autocommit() {
                return Ok(());
            }
            conn.execute_batch(verb)
                .map_err(|e| DbPoolError::Database(format!("{} failed: {}", verb, e)))
        })
    }
}

/// SQLite connection wrapper
pub struct SqliteConnection {
    session: Arc<Session>,
    interrupt_handle: Arc<InterruptHandle>,
    path: String,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let path = normalize_path(path);

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                DbPoolError::Database(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !path.starts_with("file:") {
                let file_path = std::path::Path::new(&path);
                if let Some(parent) = file_path.parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    return Err(DbPoolError::Database(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            RusqliteConnection::open_with_flags(&path, flags).map_err(|e| {
                DbPoolError::Database(format!(
                    "Failed to open SQLite database at '{}': {}",
                    path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            DbPoolError::Database(format!("Failed to enable foreign keys: {}", e))
        })?;

        let interrupt_handle = Arc::new(conn.get_interrupt_handle());

        tracing::info!(path = %path, "SQLite database connection established");
        Ok(Self {
            session: Arc::new(Session {
                conn: Mutex::new(Some(conn)),
                auto_commit: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            }),
            interrupt_handle,
            path,
        })
    }

    /// Path or URI this connection was opened with
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Set a pragma on the session.
    ///
    /// Driver properties from the target arrive here; names are restricted to
    /// identifier characters since pragmas cannot be bound as parameters.
    pub fn set_pragma(&self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DbPoolError::Configuration(format!(
                "invalid SQLite pragma name: {}",
                name
            )));
        }
        self.session.with_conn(|conn| {
            conn.pragma_update(None, name, value).map_err(|e| {
                DbPoolError::Database(format!("Failed to set pragma {}: {}", name, e))
            })
        })
    }

    /// Default wait applied when the database is locked
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.session
            .with_conn(|conn| conn.busy_timeout(timeout).map_err(DbPoolError::database))
    }

    /// Whether a transaction is currently open on the session
    pub fn in_transaction(&self) -> bool {
        self.session
            .with_conn(|conn| Ok(!conn.is_autocommit()))
            .unwrap_or(false)
    }
}

/// Strip the URL scheme forms accepted in target URLs down to a path or URI
fn normalize_path(url: &str) -> String {
    let trimmed = url.trim();
    let stripped = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    if stripped.is_empty() {
        ":memory:".to_string()
    } else {
        stripped.to_string()
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let result = self
            .session
            .with_statement(None, |conn| execute_on(conn, sql, params))?;
        tracing::debug!(affected_rows = result.affected_rows, "statement executed");
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.session
            .with_statement(None, |conn| query_on(conn, sql, params))
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        // Compile once up front so syntax errors surface at prepare time
        self.session.with_conn(|conn| {
            conn.prepare_cached(sql)
                .map(|_| ())
                .map_err(|e| DbPoolError::Database(format!("Failed to prepare statement: {}", e)))
        })?;
        Ok(Box::new(SqliteStatement::new(
            Arc::clone(&self.session),
            sql.to_string(),
        )))
    }

    async fn auto_commit(&self) -> Result<bool> {
        if self.session.closed.load(Ordering::Acquire) {
            return Err(DbPoolError::ConnectionClosed);
        }
        Ok(self.session.auto_commit.load(Ordering::Acquire))
    }

    async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        if enabled {
            // Turning autocommit back on commits whatever is pending
            self.session.finish_transaction("COMMIT")?;
        } else {
            self.session.with_conn(|_| Ok(()))?;
        }
        self.session.auto_commit.store(enabled, Ordering::Release);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        tracing::debug!("committing SQLite transaction");
        self.session.finish_transaction("COMMIT")
    }

    async fn rollback(&self) -> Result<()> {
        tracing::debug!("rolling back SQLite transaction");
        self.session.finish_transaction("ROLLBACK")
    }

    async fn set_read_only(&self, read_only: bool) -> Result<()> {
        self.session.with_conn(|conn| {
            conn.pragma_update(None, "query_only", if read_only { "ON" } else { "OFF" })
                .map_err(|e| DbPoolError::Database(format!("Failed to set query_only: {}", e)))
        })
    }

    async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        let read_uncommitted = match level {
            IsolationLevel::ReadUncommitted => true,
            // SQLite transactions are serializable; weaker requested levels
            // are satisfied by the stronger guarantee
            IsolationLevel::ReadCommitted
            | IsolationLevel::RepeatableRead
            | IsolationLevel::Serializable => false,
            IsolationLevel::None => {
                return Err(DbPoolError::NotSupported(
                    "SQLite cannot run without transactions".into(),
                ));
            }
        };
        self.session.with_conn(|conn| {
            conn.pragma_update(None, "read_uncommitted", read_uncommitted)
                .map_err(|e| {
                    DbPoolError::Database(format!("Failed to set isolation level: {}", e))
                })
        })
    }

    async fn close(&self) -> Result<()> {
        if self.session.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(path = %self.path, "closing SQLite connection");
        let taken = self.session.conn.lock().take();
        if let Some(conn) = taken {
            conn.close().map_err(|(_, e)| {
                DbPoolError::Database(format!("Failed to close SQLite connection: {}", e))
            })?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.session.closed.load(Ordering::Acquire)
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(SqliteCancelHandle {
            interrupt_handle: self.interrupt_handle.clone(),
        }))
    }
}

pub(crate) fn execute_on(
    conn: &RusqliteConnection,
    sql: &str,
    params: &[Value],
) -> Result<StatementResult> {
    let rusqlite_params = values_to_rusqlite(params);
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| DbPoolError::Database(format!("Failed to prepare statement: {}", e)))?;
    let rows_affected = stmt
        .execute(params_from_iter(rusqlite_params.iter()))
        .map_err(|e| DbPoolError::Database(format!("Failed to execute statement: {}", e)))?;

    Ok(StatementResult {
        affected_rows: rows_affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

pub(crate) fn query_on(
    conn: &RusqliteConnection,
    sql: &str,
    params: &[Value],
) -> Result<QueryResult> {
    let start_time = std::time::Instant::now();
    let rusqlite_params = values_to_rusqlite(params);

    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| DbPoolError::Database(format!("Failed to prepare query: {}", e)))?;

    let mut column_names: Vec<String> = Vec::with_capacity(stmt.column_count());
    let mut columns: Vec<ColumnMeta> = Vec::with_capacity(stmt.column_count());
    for (idx, col) in stmt.columns().iter().enumerate() {
        let name = col.name().to_string();
        column_names.push(name.clone());
        columns.push(ColumnMeta {
            name,
            data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
            nullable: true,
            ordinal: idx,
        });
    }

    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query(params_from_iter(rusqlite_params.iter()))
        .map_err(|e| DbPoolError::Database(format!("Failed to execute query: {}", e)))?;

    while let Some(row) = query_rows
        .next()
        .map_err(|e| DbPoolError::Database(format!("Failed to fetch row: {}", e)))?
    {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(rusqlite_to_value(row, i)?);
        }
        rows.push(Row::new(column_names.clone(), values));
    }

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms = execution_time_ms,
        "query executed successfully"
    );
    Ok(QueryResult {
        id: uuid::Uuid::new_v4(),
        columns,
        rows,
        affected_rows: 0,
        execution_time_ms,
    })
}

/// Convert our Value types to rusqlite-compatible types
fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Int32(i) => rusqlite::types::Value::Integer(*i as i64),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::Decimal(d) => rusqlite::types::Value::Text(d.clone()),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::Date(d) => rusqlite::types::Value::Text(d.to_string()),
        Value::Time(t) => rusqlite::types::Value::Text(t.to_string()),
        Value::DateTime(dt) => rusqlite::types::Value::Text(dt.to_string()),
        Value::DateTimeUtc(dt) => rusqlite::types::Value::Text(dt.to_rfc3339()),
        Value::Json(j) => rusqlite::types::Value::Text(j.to_string()),
        Value::Uuid(u) => rusqlite::types::Value::Text(u.to_string()),
    }
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row.get_ref(idx).map_err(DbPoolError::database)?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => match std::str::from_utf8(b) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::Bytes(b.to_vec()),
        },
    };

    Ok(value)
}
