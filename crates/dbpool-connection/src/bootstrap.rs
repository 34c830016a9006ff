//! Process-level wiring of drivers, pools, registry and monitor

use std::sync::Arc;

use dbpool_core::{DatabaseTarget, DbPoolError, DriverManager, PoolsConfig, Result};
use parking_lot::RwLock;

use crate::handle::{PooledConnection, connect_unpooled};
use crate::monitor::{MonitorConfig, PoolMonitor};
use crate::pool::ConnectionPool;
use crate::registry::PoolRegistry;

#[derive(Clone)]
struct Running {
    registry: Arc<PoolRegistry>,
    monitor: Arc<PoolMonitor>,
}

enum Phase {
    NotStarted,
    Started(Running),
    Destroyed,
}

/// Owns every pool of a process.
///
/// Built once by the host and passed to whoever needs connections; there is
/// no global instance. `startup` builds one pool per configured target and
/// starts the monitor, `destroy` tears everything down.
pub struct DatabasePools {
    drivers: Arc<dyn DriverManager>,
    phase: RwLock<Phase>,
}

impl DatabasePools {
    pub fn new(drivers: Arc<dyn DriverManager>) -> Self {
        Self {
            drivers,
            phase: RwLock::new(Phase::NotStarted),
        }
    }

    fn running(&self) -> Result<Running> {
        match &*self.phase.read() {
            Phase::Started(running) => Ok(running.clone()),
            Phase::NotStarted => Err(DbPoolError::PoolUnavailable(
                "database pools have not been started".into(),
            )),
            Phase::Destroyed => Err(DbPoolError::RegistryDestroyed),
        }
    }

    /// Build and register one pool per target, then start the monitor.
    ///
    /// Must run inside a tokio runtime.
    #[tracing::instrument(skip(self, config))]
    pub fn startup(&self, config: &PoolsConfig) -> Result<()> {
        let mut phase = self.phase.write();
        match &*phase {
            Phase::NotStarted => {}
            Phase::Started(_) => {
                return Err(DbPoolError::Configuration(
                    "database pools are already started".into(),
                ));
            }
            Phase::Destroyed => return Err(DbPoolError::RegistryDestroyed),
        }
        config.validate()?;

        let monitor = PoolMonitor::new(MonitorConfig::from(config.monitor));
        let registry = Arc::new(PoolRegistry::new());
        for target in config.targets() {
            let pool = ConnectionPool::new(target, Arc::clone(&self.drivers), &monitor);
            registry.register_pool(pool)?;
        }
        monitor.start_thread()?;

        tracing::info!(pools = registry.size()?, "database pools started");
        *phase = Phase::Started(Running { registry, monitor });
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        matches!(&*self.phase.read(), Phase::Started(_))
    }

    /// Acquire a connection from the named pool
    pub async fn connection(&self, name: &str) -> Result<PooledConnection> {
        let running = self.running()?;
        running.registry.get_connection(name).await
    }

    /// Open a single-use connection outside every pool
    pub async fn connect_unpooled(
        &self,
        driver_id: &str,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<PooledConnection> {
        connect_unpooled(self.drivers.as_ref(), driver_id, url, user, password).await
    }

    pub fn target(&self, name: &str) -> Result<Arc<DatabaseTarget>> {
        self.running()?.registry.get_target(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.running()
            .map(|running| running.registry.contains(name))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Result<Vec<String>> {
        self.running()?.registry.names()
    }

    pub fn registry(&self) -> Result<Arc<PoolRegistry>> {
        Ok(self.running()?.registry)
    }

    pub fn monitor(&self) -> Result<Arc<PoolMonitor>> {
        Ok(self.running()?.monitor)
    }

    /// Destroy every pool and stop the monitor; idempotent
    pub async fn destroy(&self) {
        let previous = std::mem::replace(&mut *self.phase.write(), Phase::Destroyed);
        if let Phase::Started(running) = previous {
            running.registry.destroy().await;
            running.monitor.stop_thread();
            running.monitor.join().await;
            tracing::info!("database pools destroyed");
        }
    }
}
