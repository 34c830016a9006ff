//! Connection pooling for one database target
//!
//! A pool keeps released handles in an idle queue and hands them out again
//! on the next acquisition. New native connections are opened through the
//! driver layer only when the queue has nothing usable.
//!
//! # Example
//!
//! ```ignore
//! use dbpool_connection::{ConnectionPool, PoolMonitor};
//!
//! let monitor = PoolMonitor::with_defaults();
//! let pool = ConnectionPool::new(target, drivers, &monitor);
//!
//! let conn = pool.acquire().await?;
//! conn.execute("UPDATE jobs SET state = 'done' WHERE id = ?", &[id]).await?;
//! conn.commit().await?;
//! conn.close().await?; // back to the idle queue
//! ```

mod config;
mod idle;
mod pool;
mod stats;


pub use config::{DEFAULT_IDLE_TIMEOUT, MAX_IDLE_TIMEOUT, PoolConfig, WORKER_CPU_COEFFICIENT};
pub(crate) use idle::IdleEntry;
pub use pool::ConnectionPool;
pub(crate) use pool::open_native;
pub use stats::PoolStats;
pub(crate) use stats::PoolCounters;
