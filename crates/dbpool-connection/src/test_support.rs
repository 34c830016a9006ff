//! Mock driver layer shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dbpool_core::{
    Connection, Credentials, DatabaseTarget, DbPoolError, DriverManager, PreparedStatement,
    QueryResult, Result, StatementResult, Value,
};
use parking_lot::Mutex;

use crate::monitor::{MonitorConfig, PoolMonitor};
use crate::pool::{ConnectionPool, PoolConfig};

/// Observable state of one mock native connection
#[derive(Default)]
pub struct NativeState {
    pub closed: AtomicBool,
    pub auto_commit: AtomicBool,
    pub rollbacks: AtomicUsize,
    pub commits: AtomicUsize,
    pub fail_set_auto_commit: AtomicBool,
    pub panic_on_close: AtomicBool,
}

impl NativeState {
    /// Simulate the server dropping the session
    pub fn kill(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

pub struct MockConnection {
    state: Arc<NativeState>,
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        if self.state.is_closed() {
            return Err(DbPoolError::Database("session gone".into()));
        }
        Ok(StatementResult::affected(1))
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        if self.state.is_closed() {
            return Err(DbPoolError::Database("session gone".into()));
        }
        Ok(QueryResult::empty())
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        Ok(Box::new(MockStatement {
            sql: sql.to_string(),
            timeout: None,
            fetch: None,
        }))
    }

    async fn auto_commit(&self) -> Result<bool> {
        Ok(self.state.auto_commit.load(Ordering::SeqCst))
    }

    async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        if self.state.fail_set_auto_commit.load(Ordering::SeqCst) {
            return Err(DbPoolError::Database("autocommit switch refused".into()));
        }
        self.state.auto_commit.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.state.panic_on_close.load(Ordering::SeqCst) {
            panic!("mock driver crashed while closing");
        }
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

pub struct MockStatement {
    sql: String,
    timeout: Option<Duration>,
    fetch: Option<u32>,
}

#[async_trait]
impl PreparedStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn set_query_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = Some(timeout);
        Ok(())
    }

    fn query_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_fetch_size(&mut self, rows: u32) -> Result<()> {
        self.fetch = Some(rows);
        Ok(())
    }

    fn fetch_size(&self) -> Option<u32> {
        self.fetch
    }

    async fn execute(&self, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::affected(1))
    }

    async fn query(&self, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Driver layer double with fault injection
pub struct MockDrivers {
    registered: AtomicBool,
    can_register: AtomicBool,
    fail_opens: AtomicUsize,
    open_calls: AtomicUsize,
    register_calls: AtomicUsize,
    natives: Mutex<Vec<Arc<NativeState>>>,
    credentials: Mutex<Vec<Credentials>>,
}

impl MockDrivers {
    /// A driver layer whose driver is already registered
    pub fn ready() -> Arc<Self> {
        Arc::new(Self::build(true, true))
    }

    /// A driver layer that needs `register_driver` before the first open
    pub fn unregistered() -> Arc<Self> {
        Arc::new(Self::build(false, true))
    }

    /// A driver layer that can never provide the driver
    pub fn missing() -> Arc<Self> {
        Arc::new(Self::build(false, false))
    }

    fn build(registered: bool, can_register: bool) -> Self {
        Self {
            registered: AtomicBool::new(registered),
            can_register: AtomicBool::new(can_register),
            fail_opens: AtomicUsize::new(0),
            open_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            natives: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `count` opens fail with a database error
    pub fn fail_next_opens(&self, count: usize) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.natives.lock().len()
    }

    pub fn native(&self, index: usize) -> Arc<NativeState> {
        Arc::clone(&self.natives.lock()[index])
    }

    /// Natives that are currently closed
    pub fn closed_count(&self) -> usize {
        self.natives.lock().iter().filter(|n| n.is_closed()).count()
    }

    pub fn last_credentials(&self) -> Option<Credentials> {
        self.credentials.lock().last().cloned()
    }
}

#[async_trait]
impl DriverManager for MockDrivers {
    async fn open(
        &self,
        target: &DatabaseTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if !self.registered.load(Ordering::SeqCst) {
            return Err(DbPoolError::DriverUnavailable(target.driver.clone()));
        }
        let failing = self
            .fail_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DbPoolError::Database("connection refused".into()));
        }

        let state = Arc::new(NativeState {
            auto_commit: AtomicBool::new(true),
            ..NativeState::default()
        });
        self.natives.lock().push(Arc::clone(&state));
        self.credentials.lock().push(credentials.clone());
        Ok(Box::new(MockConnection { state }))
    }

    fn register_driver(&self, driver_id: &str) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.can_register.load(Ordering::SeqCst) {
            self.registered.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(DbPoolError::DriverUnavailable(driver_id.to_string()))
        }
    }
}

pub fn mock_target(name: &str) -> DatabaseTarget {
    DatabaseTarget::new(name, "mock", "mock://localhost/db")
}

/// A monitor that never sleeps, for driving sweeps by hand
pub fn quiet_monitor() -> Arc<PoolMonitor> {
    PoolMonitor::new(MonitorConfig::immediate())
}

pub fn mock_pool(
    name: &str,
    drivers: &Arc<MockDrivers>,
    monitor: &Arc<PoolMonitor>,
    config: PoolConfig,
) -> Arc<ConnectionPool> {
    let drivers: Arc<dyn DriverManager> = drivers.clone();
    ConnectionPool::with_config(mock_target(name), config, drivers, monitor)
}
