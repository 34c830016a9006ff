//! Idle eviction across all pools
//!
//! One `PoolMonitor` is shared by every pool of a process. Pools register
//! themselves when built and deregister when destroyed; the monitor's worker
//! task sweeps their idle queues and destroys handles that stayed idle past
//! the pool's idle timeout.
//!
//! # Example
//!
//! ```ignore
//! use dbpool_connection::{MonitorConfig, PoolMonitor};
//!
//! let monitor = PoolMonitor::new(MonitorConfig::default());
//! monitor.start_thread()?;
//! // ... pools register themselves on construction ...
//! monitor.stop_thread();
//! monitor.join().await;
//! ```

mod config;
mod monitor;


pub use config::MonitorConfig;
pub use monitor::{MonitorState, PoolMonitor, SweepReport};
