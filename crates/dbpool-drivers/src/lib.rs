//! dbpool drivers - the driver layer behind every pool
//!
//! `DriverRegistry` is the production `DriverManager`: it keeps a catalog of
//! drivers that can be registered on demand and opens native sessions with
//! the target's session baseline applied.

#[cfg(feature = "sqlite")]
pub use dbpool_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from dbpool-core
pub use dbpool_core::{
    Connection, Credentials, DatabaseDriver, DatabaseTarget, DbPoolError, DriverManager,
    PreparedStatement, QueryResult, Result, Row, StatementResult, Value,
};
