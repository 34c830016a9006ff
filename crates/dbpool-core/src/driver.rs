//! Driver layer contract

use crate::{Connection, DatabaseTarget, Result};
use async_trait::async_trait;
use std::fmt;

/// User name and password presented when opening a session
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }

    /// Credentials configured on a target
    pub fn from_target(target: &DatabaseTarget) -> Self {
        Self {
            user: target.user.clone(),
            password: target.password.clone(),
        }
    }

    /// Whether a user name was supplied at all
    pub fn is_anonymous(&self) -> bool {
        self.user.as_deref().is_none_or(str::is_empty)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A native database driver
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "sqlite")
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str {
        self.id()
    }

    /// Open a new native session.
    ///
    /// `url` is the fully rendered connection URL (including URL
    /// parameters); `target` gives access to driver properties.
    async fn connect(
        &self,
        url: &str,
        credentials: &Credentials,
        target: &DatabaseTarget,
    ) -> Result<Box<dyn Connection>>;
}

/// The driver layer consumed by pools
///
/// `open` fails with `DriverUnavailable` when no registered driver matches
/// the target; `register_driver` makes a driver available by id.
#[async_trait]
pub trait DriverManager: Send + Sync {
    /// Open a native session for `target` using `credentials`
    async fn open(
        &self,
        target: &DatabaseTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>>;

    /// Register the driver with the given id
    fn register_driver(&self, driver_id: &str) -> Result<()>;
}
