//! Database target descriptor
//!
//! A `DatabaseTarget` identifies one database endpoint together with the
//! per-statement options and pool tuning that apply to it. It is built once
//! from configuration and never mutated afterwards; pools share it behind an
//! `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DbPoolError, IsolationLevel, PreparedStatement, Result};

/// Upper bound accepted for `max_idle_size` by configuration validation
pub const MAX_IDLE_SIZE_LIMIT: i64 = 1024;

/// How URL parameters are appended to the connection URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlParamStyle {
    /// `url?k=v&k2=v2`
    #[default]
    Query,
    /// `url;k=v;k2=v2`
    Semicolon,
}

/// Immutable description of one database endpoint
#[derive(Clone, PartialEq, Deserialize)]
pub struct DatabaseTarget {
    /// Registration name; filled from the config table key when absent
    #[serde(default)]
    pub name: String,
    /// Driver identifier understood by the driver layer
    pub driver: String,
    /// Connection URL without URL parameters
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, alias = "passwd")]
    pub password: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    /// Statement query timeout in milliseconds; ignored unless positive
    #[serde(default, alias = "timeout", alias = "busy_timeout")]
    pub busy_timeout_ms: Option<i64>,
    /// Statement fetch size; ignored unless positive
    #[serde(default, alias = "fetch")]
    pub fetch_size: Option<i64>,
    #[serde(default, alias = "transaction", alias = "transaction_level")]
    pub transaction_isolation: Option<IsolationLevel>,
    /// Idle queue bound; non-positive means "use the default"
    #[serde(default, alias = "pool_size", alias = "pooling_size")]
    pub max_idle_size: Option<i64>,
    /// Idle eviction timeout in milliseconds; non-positive means "use the default"
    #[serde(default, alias = "pool_timeout", alias = "pooling_timeout")]
    pub idle_timeout_ms: Option<i64>,
    /// Driver properties passed through on connect
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub url_params: BTreeMap<String, String>,
    #[serde(default)]
    pub url_param_style: UrlParamStyle,
}

impl DatabaseTarget {
    /// Create a target with only the required fields set
    pub fn new(name: &str, driver: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: driver.to_string(),
            url: url.to_string(),
            user: None,
            password: None,
            read_only: false,
            busy_timeout_ms: None,
            fetch_size: None,
            transaction_isolation: None,
            max_idle_size: None,
            idle_timeout_ms: None,
            params: BTreeMap::new(),
            url_params: BTreeMap::new(),
            url_param_style: UrlParamStyle::default(),
        }
    }

    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_busy_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.busy_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_fetch_size(mut self, rows: i64) -> Self {
        self.fetch_size = Some(rows);
        self
    }

    pub fn with_isolation(mut self, level: IsolationLevel) -> Self {
        self.transaction_isolation = Some(level);
        self
    }

    pub fn with_max_idle_size(mut self, size: i64) -> Self {
        self.max_idle_size = Some(size);
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.idle_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_url_param(mut self, key: &str, value: &str) -> Self {
        self.url_params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_url_param_style(mut self, style: UrlParamStyle) -> Self {
        self.url_param_style = style;
        self
    }

    /// Check the fields every target must carry
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DbPoolError::Configuration("target name is not set".into()));
        }
        if self.driver.trim().is_empty() {
            return Err(DbPoolError::Configuration(format!(
                "target '{}' has no driver",
                self.name
            )));
        }
        if self.url.trim().is_empty() {
            return Err(DbPoolError::Configuration(format!(
                "target '{}' has no url",
                self.name
            )));
        }
        if let Some(size) = self.max_idle_size.filter(|size| *size > MAX_IDLE_SIZE_LIMIT) {
            return Err(DbPoolError::Configuration(format!(
                "target '{}': max_idle_size {} exceeds the limit of {}",
                self.name, size, MAX_IDLE_SIZE_LIMIT
            )));
        }
        Ok(())
    }

    /// Statement query timeout, if one is configured
    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout_ms
            .filter(|ms| *ms > 0)
            .map(|ms| Duration::from_millis(ms as u64))
    }

    /// Statement fetch size, if one is configured
    pub fn statement_fetch_size(&self) -> Option<u32> {
        self.fetch_size
            .filter(|rows| *rows > 0)
            .map(|rows| u32::try_from(rows).unwrap_or(u32::MAX))
    }

    /// Reapply the per-statement options to a freshly created statement
    pub fn apply_statement_options(&self, stmt: &mut dyn PreparedStatement) -> Result<()> {
        if let Some(timeout) = self.busy_timeout() {
            stmt.set_query_timeout(timeout)?;
        }
        if let Some(rows) = self.statement_fetch_size() {
            stmt.set_fetch_size(rows)?;
        }
        Ok(())
    }

    /// URL with the configured URL parameters appended
    pub fn connection_url(&self) -> String {
        if self.url_params.is_empty() {
            return self.url.clone();
        }
        let mut url = self.url.clone();
        match self.url_param_style {
            UrlParamStyle::Query => {
                let pairs: Vec<String> = self
                    .url_params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                url.push(if self.url.contains('?') { '&' } else { '?' });
                url.push_str(&pairs.join("&"));
            }
            UrlParamStyle::Semicolon => {
                for (k, v) in &self.url_params {
                    url.push(';');
                    url.push_str(&format!("{}={}", k, v));
                }
            }
        }
        url
    }

    /// Serializable view with the password redacted
    pub fn summary(&self) -> TargetSummary {
        TargetSummary {
            name: self.name.clone(),
            driver: self.driver.clone(),
            url: self.url.clone(),
            user: self.user.clone(),
            password: self.password.as_ref().map(|_| "***".to_string()),
            read_only: self.read_only,
            busy_timeout_ms: self.busy_timeout_ms,
            fetch_size: self.fetch_size,
            transaction_isolation: self.transaction_isolation,
            max_idle_size: self.max_idle_size,
            idle_timeout_ms: self.idle_timeout_ms,
            params: self.params.keys().cloned().collect(),
        }
    }
}

impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseTarget")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("read_only", &self.read_only)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .field("fetch_size", &self.fetch_size)
            .field("transaction_isolation", &self.transaction_isolation)
            .field("max_idle_size", &self.max_idle_size)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Redacted, serializable description of a target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSummary {
    pub name: String,
    pub driver: String,
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub read_only: bool,
    pub busy_timeout_ms: Option<i64>,
    pub fetch_size: Option<i64>,
    pub transaction_isolation: Option<IsolationLevel>,
    pub max_idle_size: Option<i64>,
    pub idle_timeout_ms: Option<i64>,
    /// Driver property names only; values may hold secrets
    pub params: Vec<String>,
}
