//! Database connection configuration.
//!
//! This module provides the `ConnectionConfig` struct for tuning the
//! short-lived Inspector connections and the long-lived local sink
//! connection.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for database connections.
///
/// # Security
/// This struct intentionally does NOT store passwords or credentials.
///
/// # Example
/// ```rust
/// use dbsync_core::adapters::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default()
///     .with_query_timeout(Some(Duration::from_secs(60)))
///     .with_read_only(true);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Per-statement limit; `None` means unlimited
    pub query_timeout: Option<Duration>,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// Whether to enforce read-only sessions
    pub read_only: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            query_timeout: None,
            max_connections: 1,
            read_only: true,
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConnectionConfig(connect={}s, query={}, max={}, {})",
            self.connect_timeout.as_secs(),
            self.query_timeout
                .map_or_else(|| "unlimited".to_string(), |t| format!("{}s", t.as_secs())),
            self.max_connections,
            if self.read_only { "read-only" } else { "read-write" }
        )
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_connections == 0 {
            return Err(crate::error::DbSyncError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(crate::error::DbSyncError::configuration(
                "max_connections should not exceed 100 for safety",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::DbSyncError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_some_and(|t| t.is_zero()) {
            return Err(crate::error::DbSyncError::configuration(
                "query_timeout must be greater than 0 (use None for unlimited)",
            ));
        }

        Ok(())
    }

    /// Maps a `max_execution_time` style setting (seconds, 0 = unlimited).
    pub fn with_max_execution_secs(self, secs: u64) -> Self {
        self.with_query_timeout((secs > 0).then(|| Duration::from_secs(secs)))
    }

    /// Builder method to set the statement timeout.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to set read-only mode.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
