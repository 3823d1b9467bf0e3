//! Read-only schema introspection over one ad hoc connection.

use super::connection::create_inspector_pool;
use super::paging::fetch_page;
use crate::adapters::{ConnectionConfig, InspectorConnector, SchemaInspector};
use crate::error::DbSyncError;
use crate::models::{SchemaObjectKind, TablePage, TriggerDefinition};
use crate::security::DatabaseCredentials;
use crate::sql::quote_identifier;
use crate::Result;
use async_trait::async_trait;
use sqlx::{Executor, MySqlPool, Row};

/// Schema inspector bound to one remote database.
pub struct MySqlInspector {
    pool: MySqlPool,
    database: Option<String>,
}

impl std::fmt::Debug for MySqlInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlInspector")
            .field("database", &self.database)
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl MySqlInspector {
    /// Connects with ad hoc credentials.
    pub async fn connect(credentials: &DatabaseCredentials, config: &ConnectionConfig) -> Result<Self> {
        let pool = create_inspector_pool(credentials, config).await?;
        Ok(Self {
            pool,
            database: credentials.database.clone(),
        })
    }

    fn database(&self) -> Result<&str> {
        self.database
            .as_deref()
            .filter(|db| !db.is_empty())
            .ok_or_else(|| DbSyncError::missing_parameter("db_name"))
    }

    async fn object_exists(&self, kind: SchemaObjectKind, name: &str) -> Result<bool> {
        let db = self.database()?;
        let query = match kind {
            SchemaObjectKind::Table => {
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND TABLE_TYPE = 'BASE TABLE'"
            }
            SchemaObjectKind::View => {
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?"
            }
            SchemaObjectKind::Procedure | SchemaObjectKind::Function => {
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.ROUTINES WHERE ROUTINE_SCHEMA = ? AND ROUTINE_NAME = ? AND ROUTINE_TYPE = ?"
            }
            SchemaObjectKind::Trigger => {
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TRIGGERS WHERE TRIGGER_SCHEMA = ? AND TRIGGER_NAME = ?"
            }
        };
        let mut statement = sqlx::query_scalar::<_, i64>(query).bind(db).bind(name);
        if matches!(kind, SchemaObjectKind::Procedure | SchemaObjectKind::Function) {
            statement = statement.bind(kind.sql_keyword());
        }
        let count = statement.fetch_one(&self.pool).await.map_err(|e| {
            DbSyncError::query_failed(format!("Failed to look up {} '{}'", kind, name), e)
        })?;
        Ok(count > 0)
    }

    async fn require_object(&self, kind: SchemaObjectKind, name: &str) -> Result<()> {
        if self.object_exists(kind, name).await? {
            Ok(())
        } else {
            Err(DbSyncError::ObjectNotFound {
                kind,
                name: name.to_string(),
            })
        }
    }
}

/// Reads a text column from a `SHOW CREATE` row; NULL becomes empty.
fn text_column(row: &sqlx::mysql::MySqlRow, column: &str) -> Result<String> {
    let bytes: Option<Vec<u8>> = row
        .try_get_unchecked(column)
        .map_err(|e| DbSyncError::query_failed(format!("Missing column '{}'", column), e))?;
    Ok(bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default())
}

#[async_trait]
impl SchemaInspector for MySqlInspector {
    async fn list_databases(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT CAST(SCHEMA_NAME AS CHAR) AS name FROM INFORMATION_SCHEMA.SCHEMATA ORDER BY SCHEMA_NAME",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DbSyncError::query_failed("Failed to list databases", e))
    }

    async fn list_objects(&self, kind: SchemaObjectKind) -> Result<Vec<String>> {
        let db = self.database()?;
        let query = match kind {
            SchemaObjectKind::Table => {
                "SELECT CAST(TABLE_NAME AS CHAR) AS name FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
            }
            SchemaObjectKind::View => {
                "SELECT CAST(TABLE_NAME AS CHAR) AS name FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME"
            }
            SchemaObjectKind::Procedure | SchemaObjectKind::Function => {
                "SELECT CAST(ROUTINE_NAME AS CHAR) AS name FROM INFORMATION_SCHEMA.ROUTINES WHERE ROUTINE_SCHEMA = ? AND ROUTINE_TYPE = ? ORDER BY ROUTINE_NAME"
            }
            SchemaObjectKind::Trigger => {
                let triggers = self.list_triggers().await?;
                return Ok(triggers.into_iter().map(|t| t.trigger).collect());
            }
        };
        let mut statement = sqlx::query_scalar::<_, String>(query).bind(db);
        if matches!(kind, SchemaObjectKind::Procedure | SchemaObjectKind::Function) {
            statement = statement.bind(kind.sql_keyword());
        }
        statement
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbSyncError::query_failed(format!("Failed to list {}", kind.plural()), e))
    }

    async fn object_definition(&self, kind: SchemaObjectKind, name: &str) -> Result<String> {
        let db = self.database()?;
        let column = match kind {
            SchemaObjectKind::Table => "Create Table",
            SchemaObjectKind::View => "Create View",
            SchemaObjectKind::Procedure => "Create Procedure",
            SchemaObjectKind::Function => "Create Function",
            SchemaObjectKind::Trigger => "SQL Original Statement",
        };
        self.require_object(kind, name).await?;

        let query = format!(
            "SHOW CREATE {} {}.{}",
            kind.sql_keyword(),
            quote_identifier(db),
            quote_identifier(name)
        );
        // No arguments, so this goes over the text protocol; SHOW CREATE for
        // routines cannot be prepared
        let row = self
            .pool
            .fetch_optional(query.as_str())
            .await
            .map_err(|e| {
                DbSyncError::query_failed(format!("Failed to read definition of {} '{}'", kind, name), e)
            })?
            .ok_or_else(|| DbSyncError::ObjectNotFound {
                kind,
                name: name.to_string(),
            })?;
        text_column(&row, column)
    }

    async fn table_page(&self, table: &str, offset: u64, limit: u64) -> Result<TablePage> {
        let db = self.database()?;
        self.require_object(SchemaObjectKind::Table, table).await?;
        fetch_page(&self.pool, db, table, offset, limit).await
    }

    async fn list_triggers(&self) -> Result<Vec<TriggerDefinition>> {
        let db = self.database()?;
        let rows = sqlx::query(
            r#"
            SELECT CAST(TRIGGER_NAME AS CHAR) AS trigger_name,
                   CAST(ACTION_TIMING AS CHAR) AS timing,
                   CAST(EVENT_MANIPULATION AS CHAR) AS event,
                   CAST(EVENT_OBJECT_TABLE AS CHAR) AS table_name,
                   CAST(ACTION_STATEMENT AS CHAR) AS statement
            FROM INFORMATION_SCHEMA.TRIGGERS
            WHERE TRIGGER_SCHEMA = ?
            ORDER BY EVENT_OBJECT_TABLE, ACTION_TIMING, EVENT_MANIPULATION, ACTION_ORDER
            "#,
        )
        .bind(db)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DbSyncError::query_failed("Failed to list triggers", e))?;

        rows.iter()
            .map(|row| {
                Ok(TriggerDefinition {
                    trigger: row.try_get("trigger_name").map_err(trigger_column)?,
                    timing: row.try_get("timing").map_err(trigger_column)?,
                    event: row.try_get("event").map_err(trigger_column)?,
                    table: row.try_get("table_name").map_err(trigger_column)?,
                    statement: row.try_get("statement").map_err(trigger_column)?,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn trigger_column(e: sqlx::Error) -> DbSyncError {
    DbSyncError::query_failed("Failed to decode trigger row", e)
}

/// Opens a [`MySqlInspector`] per request.
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector {
    config: ConnectionConfig,
}

impl MySqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl InspectorConnector for MySqlConnector {
    async fn connect(&self, credentials: &DatabaseCredentials) -> Result<Box<dyn SchemaInspector>> {
        let inspector = MySqlInspector::connect(credentials, &self.config).await?;
        Ok(Box::new(inspector))
    }
}
