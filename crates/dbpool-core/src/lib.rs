//! dbpool core - shared abstractions for the pooling layer
//!
//! This crate defines what every other dbpool crate depends on:
//!
//! - `Connection` / `PreparedStatement` - the native connection surface
//! - `DatabaseDriver` / `DriverManager` - the driver layer contract
//! - `DatabaseTarget` - the immutable description of one database endpoint
//! - `PoolsConfig` - the TOML configuration model
//! - `DbPoolError` - the error kinds shared by drivers and pools

mod config;
mod connection;
mod driver;
mod error;
mod target;
mod types;

pub use config::*;
pub use connection::*;
pub use driver::*;
pub use error::*;
pub use target::*;
pub use types::*;
