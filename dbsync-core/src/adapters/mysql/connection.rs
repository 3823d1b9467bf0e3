//! MySQL connection setup for the Inspector and the local sink.
//!
//! # Security Features
//! - Inspector sessions are read-only and time-boxed
//! - Every session runs in UTC
//! - Connection targets are sanitized in all error messages

use crate::adapters::ConnectionConfig;
use crate::error::{DbSyncError, redact_database_url};
use crate::security::DatabaseCredentials;
use crate::Result;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{ConnectOptions, Connection, Executor, MySqlConnection};
use std::str::FromStr;
use url::Url;

/// Connect options for ad hoc credentials.
pub fn connect_options(credentials: &DatabaseCredentials) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&credentials.host)
        .port(credentials.port)
        .username(&credentials.username)
        .charset("utf8mb4");
    if credentials.has_password() {
        options = options.password(credentials.password());
    }
    if let Some(database) = credentials.database.as_deref() {
        options = options.database(database);
    }
    options.disable_statement_logging()
}

/// Opens the short-lived pool one Inspector request uses.
///
/// The pool connects eagerly so a bad host or password surfaces as
/// `DB_CONNECTION_ERROR` before any query runs.
pub async fn create_inspector_pool(
    credentials: &DatabaseCredentials,
    config: &ConnectionConfig,
) -> Result<MySqlPool> {
    config.validate()?;
    credentials.validate()?;

    let query_timeout_ms = config.query_timeout.map(|t| t.as_millis());
    let read_only = config.read_only;

    MySqlPoolOptions::new()
        .max_connections(config.max_connections.min(100))
        .min_connections(0)
        .acquire_timeout(config.connect_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // Set timezone to UTC for consistent timestamps
                conn.execute("SET time_zone = '+00:00'").await?;

                // Set session to read-only if configured
                if read_only {
                    conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                }

                // MariaDB has no max_execution_time; a failure here is not fatal
                if let Some(ms) = query_timeout_ms
                    && let Err(e) = conn
                        .execute(format!("SET SESSION max_execution_time = {}", ms).as_str())
                        .await
                {
                    tracing::debug!("Server ignored max_execution_time: {}", e);
                }

                Ok(())
            })
        })
        .connect_with(connect_options(credentials))
        .await
        .map_err(|e| DbSyncError::connection_failed_to(&credentials.to_safe_string(), e))
}

/// Validates a local MySQL connection URL.
///
/// # Errors
/// Returns error if the URL is malformed, uses another scheme or has no host
pub fn validate_mysql_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|e| {
        DbSyncError::configuration(format!("Invalid MySQL connection string format: {}", e))
    })?;

    if !matches!(url.scheme(), "mysql" | "mariadb") {
        return Err(DbSyncError::configuration(
            "Connection string must use mysql:// scheme",
        ));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(DbSyncError::configuration(
            "Connection string must specify a host",
        ));
    }

    Ok(())
}

/// Connect options for the local server with no database selected.
///
/// Any database path in the URL is dropped so the target can be created
/// by the first statement of a run.
pub fn local_connect_options(connection_string: &str) -> Result<MySqlConnectOptions> {
    validate_mysql_connection_string(connection_string)?;
    let mut url = Url::parse(&connection_string.replacen("mariadb://", "mysql://", 1))
        .map_err(|e| DbSyncError::configuration(format!("Invalid MySQL connection string: {}", e)))?;
    url.set_path("");
    let options = MySqlConnectOptions::from_str(url.as_str())
        .map_err(|e| DbSyncError::configuration(format!("Invalid MySQL connection string: {}", e)))?
        .charset("utf8mb4")
        .disable_statement_logging();
    Ok(options)
}

/// Opens the single local connection the sink holds for a whole run.
///
/// Every statement selects its target database itself.
pub async fn connect_local(connection_string: &str, config: &ConnectionConfig) -> Result<MySqlConnection> {
    let options = local_connect_options(connection_string)?;

    let target = redact_database_url(connection_string);
    let mut conn = tokio::time::timeout(config.connect_timeout, MySqlConnection::connect_with(&options))
        .await
        .map_err(|_| {
            DbSyncError::configuration(format!("Timed out connecting to {}", target))
        })?
        .map_err(|e| DbSyncError::connection_failed_to(&target, e))?;

    conn.execute("SET time_zone = '+00:00'")
        .await
        .map_err(|e| DbSyncError::connection_failed_to(&target, e))?;

    if let Some(ms) = config.query_timeout.map(|t| t.as_millis())
        && let Err(e) = conn
            .execute(format!("SET SESSION max_execution_time = {}", ms).as_str())
            .await
    {
        tracing::debug!("Server ignored max_execution_time: {}", e);
    }

    conn.ping()
        .await
        .map_err(|e| DbSyncError::connection_failed_to(&target, e))?;
    Ok(conn)
}
