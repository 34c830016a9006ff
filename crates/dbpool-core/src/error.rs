//! Error types for dbpool

use thiserror::Error;

/// Core error type for pooling and driver operations
#[derive(Error, Debug)]
pub enum DbPoolError {
    #[error("Invalid name: a pool name must not be empty")]
    InvalidName,

    #[error("Duplicate name: pool '{0}' is already registered")]
    DuplicateName(String),

    #[error("Unknown name: pool '{0}' is not registered")]
    UnknownName(String),

    #[error("Pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("Registry destroyed")]
    RegistryDestroyed,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Not poolable: single-use connections cannot be recreated")]
    NotPoolable,

    #[error("Driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DbPoolError {
    /// Whether this error means the driver layer could not find a driver.
    ///
    /// Acquisition retries exactly once after registering the driver when
    /// the first attempt fails this way.
    pub fn is_driver_missing(&self) -> bool {
        matches!(self, DbPoolError::DriverUnavailable(_))
    }

    /// Wrap any driver-side fault that has no more specific kind.
    pub fn database(err: impl std::fmt::Display) -> Self {
        DbPoolError::Database(err.to_string())
    }
}

/// Result type alias for dbpool operations
pub type Result<T> = std::result::Result<T, DbPoolError>;
