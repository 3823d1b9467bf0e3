//! In-memory doubles for the remote source and the local sink.

#![allow(dead_code)]

use async_trait::async_trait;
use dbsync_core::{
    DbSyncError, ExecuteOptions, ExecutionOutcome, ExecutionSink, ProgressTracker, RemoteSource,
    Row, SchemaObjectKind, TablePage, TransferError, TriggerDefinition,
};
use dbsync_core::sync::CancelHandle;
use parking_lot::Mutex;
use serde_json::json;

/// One remote table: name, DDL and rows.
#[derive(Debug, Clone)]
pub struct FakeTable {
    pub name: String,
    pub ddl: String,
    pub rows: Vec<Row>,
}

impl FakeTable {
    pub fn new(name: &str, row_count: usize) -> Self {
        let rows = (1..=row_count)
            .map(|id| {
                let mut row = Row::new();
                row.insert("id".to_string(), json!(id));
                row.insert("name".to_string(), json!(format!("{}-{}", name, id)));
                row
            })
            .collect();
        Self {
            name: name.to_string(),
            ddl: format!(
                "CREATE TABLE `{}` (`id` int NOT NULL, `name` varchar(50), PRIMARY KEY (`id`))",
                name
            ),
            rows,
        }
    }

    pub fn without_ddl(mut self) -> Self {
        self.ddl = String::new();
        self
    }
}

/// Remote database held in memory. Every call is recorded.
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub tables: Vec<FakeTable>,
    pub views: Vec<(String, String)>,
    pub procedures: Vec<(String, String)>,
    pub functions: Vec<(String, String)>,
    pub triggers: Vec<TriggerDefinition>,
    /// Table whose pages come back empty while claiming more rows
    pub endless_table: Option<String>,
    /// Cancelled when the first data page is served
    pub cancel_on_first_page: Option<CancelHandle>,
    /// Make table enumeration fail
    pub fail_listing: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn with_tables(tables: Vec<FakeTable>) -> Self {
        Self {
            tables,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn objects(&self, kind: SchemaObjectKind) -> Vec<(String, String)> {
        match kind {
            SchemaObjectKind::Table => self
                .tables
                .iter()
                .map(|t| (t.name.clone(), t.ddl.clone()))
                .collect(),
            SchemaObjectKind::View => self.views.clone(),
            SchemaObjectKind::Procedure => self.procedures.clone(),
            SchemaObjectKind::Function => self.functions.clone(),
            SchemaObjectKind::Trigger => self
                .triggers
                .iter()
                .map(|t| (t.trigger.clone(), t.create_statement()))
                .collect(),
        }
    }
}

fn not_found(action: &str, name: &str) -> TransferError {
    TransferError::Application {
        action: action.to_string(),
        message: format!("'{}' not found", name),
        timestamp: "2024-01-01 00:00:00".to_string(),
        code: Some("OBJECT_NOT_FOUND".to_string()),
        status: 404,
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn list_objects(&self, kind: SchemaObjectKind) -> Result<Vec<String>, TransferError> {
        self.calls.lock().push(format!("list:{}", kind.plural()));
        if self.fail_listing && kind == SchemaObjectKind::Table {
            return Err(TransferError::Application {
                action: "get_tables".to_string(),
                message: "Unauthorized: Invalid API key".to_string(),
                timestamp: "2024-01-01 00:00:00".to_string(),
                code: Some("INVALID_API_KEY".to_string()),
                status: 401,
            });
        }
        Ok(self.objects(kind).into_iter().map(|(name, _)| name).collect())
    }

    async fn object_definition(
        &self,
        kind: SchemaObjectKind,
        name: &str,
    ) -> Result<String, TransferError> {
        self.calls.lock().push(format!("structure:{}:{}", kind, name));
        self.objects(kind)
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, ddl)| ddl)
            .ok_or_else(|| not_found("structure", name))
    }

    async fn table_page(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<TablePage, TransferError> {
        self.calls
            .lock()
            .push(format!("get_table_data:{}:{}:{}", table, offset, limit));
        if let Some(cancel) = &self.cancel_on_first_page {
            cancel.cancel();
        }
        if self.endless_table.as_deref() == Some(table) {
            return Ok(TablePage {
                rows: Vec::new(),
                total_rows: 10,
                offset,
                limit,
                has_more: true,
            });
        }
        let source = self
            .tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| not_found("get_table_data", table))?;
        let start = usize::try_from(offset).unwrap().min(source.rows.len());
        let end = start
            .saturating_add(usize::try_from(limit).unwrap())
            .min(source.rows.len());
        Ok(TablePage::new(
            source.rows[start..end].to_vec(),
            source.rows.len() as u64,
            offset,
            limit,
        ))
    }

    async fn list_triggers(&self) -> Result<Vec<TriggerDefinition>, TransferError> {
        self.calls.lock().push("list:triggers".to_string());
        Ok(self.triggers.clone())
    }
}

/// One statement the sink received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub sql: String,
    pub target_db: String,
    pub disable_foreign_keys: bool,
}

/// Sink that records statements instead of running them.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub executed: Vec<Executed>,
    /// Fail any statement containing this text
    pub fail_on: Option<String>,
    /// Progress observed at each statement
    pub observe: Option<ProgressTracker>,
    pub observed_percent: Vec<f64>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(pattern: &str) -> Self {
        Self {
            fail_on: Some(pattern.to_string()),
            ..Self::default()
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed.iter().map(|e| e.sql.clone()).collect()
    }

    pub fn inserts(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with("INSERT INTO"))
            .collect()
    }
}

#[async_trait]
impl ExecutionSink for RecordingSink {
    async fn execute(
        &mut self,
        sql: &str,
        target_db: &str,
        options: ExecuteOptions,
    ) -> dbsync_core::Result<ExecutionOutcome> {
        if let Some(tracker) = &self.observe {
            self.observed_percent.push(tracker.current().percent);
        }
        if let Some(pattern) = &self.fail_on
            && sql.contains(pattern.as_str())
        {
            return Err(DbSyncError::SqlExecution {
                message: format!("Simulated failure for: {}", pattern),
            });
        }
        self.executed.push(Executed {
            sql: sql.to_string(),
            target_db: target_db.to_string(),
            disable_foreign_keys: options.disable_foreign_keys,
        });
        Ok(ExecutionOutcome { affected_rows: 1 })
    }
}
