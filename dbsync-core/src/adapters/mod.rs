//! Database adapter traits for introspection and execution.
//!
//! The Inspector reads a remote database through [`SchemaInspector`]; the
//! orchestrator writes the local copy through [`ExecutionSink`]. Both traits
//! are object-safe so handlers and runs can hold `Box<dyn ...>` values and
//! tests can substitute in-memory doubles.
//!
//! # Module Structure
//! - `config`: connection tuning (`ConnectionConfig`)
//! - `mysql`: the MySQL/MariaDB implementations (feature `mysql`)

use crate::Result;
use crate::models::{SchemaObjectKind, TablePage, TriggerDefinition};
use crate::security::DatabaseCredentials;
use async_trait::async_trait;

pub mod config;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use config::ConnectionConfig;

/// Read-only view of one database.
///
/// # Security Guarantees
/// - All operations are read-only
/// - Credentials are never stored or logged
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    /// Databases visible to the connected account.
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Names of all objects of a kind, in a stable order.
    async fn list_objects(&self, kind: SchemaObjectKind) -> Result<Vec<String>>;

    /// Recreate statement as the engine emits it.
    ///
    /// # Errors
    /// `ObjectNotFound` when no such object exists.
    async fn object_definition(&self, kind: SchemaObjectKind, name: &str) -> Result<String>;

    /// One page of rows with `has_more = offset + limit < total_rows`.
    async fn table_page(&self, table: &str, offset: u64, limit: u64) -> Result<TablePage>;

    /// Trigger metadata for the database.
    async fn list_triggers(&self) -> Result<Vec<TriggerDefinition>>;

    /// Releases the connection.
    async fn close(&self) {}
}

/// Opens a fresh inspector for each request's ad hoc credentials.
#[async_trait]
pub trait InspectorConnector: Send + Sync {
    async fn connect(&self, credentials: &DatabaseCredentials) -> Result<Box<dyn SchemaInspector>>;
}

/// Per-statement execution switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Run with `FOREIGN_KEY_CHECKS = 0`, restoring them afterwards
    pub disable_foreign_keys: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            disable_foreign_keys: true,
        }
    }
}

/// What one statement did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionOutcome {
    pub affected_rows: u64,
}

/// Write side of a sync.
#[async_trait]
pub trait ExecutionSink: Send {
    /// Runs one statement against `target_db`.
    ///
    /// The target is selected first unless the statement creates a database.
    /// When `disable_foreign_keys` is set, checks are restored afterwards
    /// whether or not the statement succeeded.
    ///
    /// # Errors
    /// `SqlExecution` carrying the driver message verbatim.
    async fn execute(
        &mut self,
        sql: &str,
        target_db: &str,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome>;

    /// Releases the connection.
    async fn close(&mut self) {}
}
