//! dbpool connection - pooling, the pool registry and idle eviction
//!
//! This crate turns native connections from the driver layer into pooled
//! handles:
//!
//! - `ConnectionPool` owns the idle queue of one database target
//! - `PooledConnection` is the handle callers use exactly like a native one
//! - `PoolRegistry` names the pools of a process
//! - `PoolMonitor` evicts idle handles that outlived their timeout
//! - `DatabasePools` wires all of the above from a `PoolsConfig`

mod bootstrap;
pub mod handle;
pub mod monitor;
pub mod pool;
mod registry;

#[cfg(test)]
mod test_support;

pub use bootstrap::DatabasePools;
pub use handle::{PooledConnection, connect_unpooled};
pub use monitor::{MonitorConfig, MonitorState, PoolMonitor};
pub use pool::{ConnectionPool, PoolConfig, PoolStats};
pub use registry::PoolRegistry;
