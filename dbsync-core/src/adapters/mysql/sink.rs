//! The local execution sink: one held connection for a whole run.

use super::connection::connect_local;
use crate::adapters::{ConnectionConfig, ExecuteOptions, ExecutionOutcome, ExecutionSink};
use crate::error::DbSyncError;
use crate::sql::{is_create_database, use_database};
use crate::Result;
use async_trait::async_trait;
use sqlx::{Connection, Executor, MySqlConnection};

/// Executes orchestrator statements against the local server.
pub struct MySqlSink {
    conn: Option<MySqlConnection>,
}

impl std::fmt::Debug for MySqlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSink")
            .field("open", &self.conn.is_some())
            .finish()
    }
}

/// Driver text of a failed statement, verbatim.
fn execution_error(error: sqlx::Error) -> DbSyncError {
    let message = match &error {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    };
    DbSyncError::SqlExecution { message }
}

impl MySqlSink {
    /// Opens the local connection. Statement timeouts follow `config`.
    pub async fn connect(connection_string: &str, config: &ConnectionConfig) -> Result<Self> {
        let conn = connect_local(connection_string, config).await?;
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn.as_mut().ok_or_else(|| DbSyncError::SqlExecution {
            message: "Local connection already closed".to_string(),
        })
    }

    async fn run(&mut self, sql: &str) -> Result<u64> {
        let conn = self.conn()?;
        // A bare &str carries no arguments and runs over the text protocol.
        conn.execute(sql)
            .await
            .map(|r| r.rows_affected())
            .map_err(execution_error)
    }
}

#[async_trait]
impl ExecutionSink for MySqlSink {
    async fn execute(
        &mut self,
        sql: &str,
        target_db: &str,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome> {
        if !is_create_database(sql) {
            self.run(&use_database(target_db)).await?;
        }

        if options.disable_foreign_keys {
            self.run("SET FOREIGN_KEY_CHECKS = 0").await?;
        }

        let result = self.run(sql).await;

        if options.disable_foreign_keys
            && let Err(e) = self.run("SET FOREIGN_KEY_CHECKS = 1").await
        {
            tracing::error!("Failed to re-enable foreign key checks: {}", e);
            // A connection that cannot restore the checks must not run anything else.
            self.close().await;
        }

        result.map(|affected_rows| ExecutionOutcome { affected_rows })
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err(e) = conn.close().await
        {
            tracing::debug!("Error closing local connection: {}", e);
        }
    }
}
