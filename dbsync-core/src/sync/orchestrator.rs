//! The sequential clone state machine.
//!
//! `EnsureLocalDatabase → EnumerateTables → Tables → Views → Procedures →
//! Functions → Triggers → Done`. Exactly one remote call or local statement
//! is in flight at any time.

use super::options::SyncOptions;
use super::progress::{CancelHandle, ProgressTracker, SyncPhase, SyncProgress, table_percent};
use super::report::{SyncLog, SyncReport, SyncStats};
use crate::adapters::{ExecuteOptions, ExecutionSink};
use crate::error::DbSyncError;
use crate::models::{RowCursor, SchemaObject, SchemaObjectKind};
use crate::protocol::{InspectorAction, RemoteSource, TransferError};
use crate::sql::{build_insert, create_database, strip_definer};
use crate::Result;
use std::time::Instant;
use tokio::sync::watch;

/// Drives one clone from a [`RemoteSource`] into an [`ExecutionSink`].
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    options: SyncOptions,
    progress: ProgressTracker,
    cancel: CancelHandle,
}

impl SyncOrchestrator {
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            progress: ProgressTracker::new(),
            cancel: CancelHandle::new(),
        }
    }

    /// Uses an externally owned cancel flag.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Publishes progress through an externally owned tracker.
    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// Runs the clone. Never fails: errors end up in the report.
    pub async fn run(&self, source: &dyn RemoteSource, sink: &mut dyn ExecutionSink) -> SyncReport {
        let started = Instant::now();
        let mut run = Run {
            options: &self.options,
            progress: &self.progress,
            cancel: &self.cancel,
            source,
            sink,
            log: SyncLog::default(),
            stats: SyncStats::default(),
        };

        let outcome = run.execute().await;
        let Run {
            mut log, mut stats, ..
        } = run;
        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(()) => {
                self.progress.complete();
                log.success(format!(
                    "Sync into '{}' completed in {} ms",
                    self.options.local_database, stats.elapsed_ms
                ));
                SyncReport::succeeded(stats, log)
            }
            Err(error) => {
                self.progress.fail();
                log.error(format!("Sync failed: {}", error));
                SyncReport::failed(stats, log, &error)
            }
        }
    }
}

/// State owned by one in-flight run.
struct Run<'a> {
    options: &'a SyncOptions,
    progress: &'a ProgressTracker,
    cancel: &'a CancelHandle,
    source: &'a dyn RemoteSource,
    sink: &'a mut dyn ExecutionSink,
    log: SyncLog,
    stats: SyncStats,
}

impl Run<'_> {
    async fn execute(&mut self) -> Result<()> {
        self.options.validate()?;
        let database = self.options.local_database.clone();

        self.checkpoint()?;
        self.progress
            .update(SyncPhase::EnsureLocalDatabase, 0.0, Some(database.as_str()));
        self.log
            .info(format!("Ensuring local database '{}' exists", database));
        self.exec(&create_database(&database)).await?;
        self.progress.update(
            SyncPhase::EnsureLocalDatabase,
            SyncPhase::EnsureLocalDatabase.completed_percent(),
            None,
        );

        self.checkpoint()?;
        self.progress.update(
            SyncPhase::EnumerateTables,
            SyncPhase::EnsureLocalDatabase.completed_percent(),
            None,
        );
        let tables = self.source.list_objects(SchemaObjectKind::Table).await?;
        self.log.info(format!("Found {} tables", tables.len()));
        self.progress.update(
            SyncPhase::EnumerateTables,
            SyncPhase::EnumerateTables.completed_percent(),
            None,
        );

        self.clone_tables(&tables).await?;
        for kind in [
            SchemaObjectKind::View,
            SchemaObjectKind::Procedure,
            SchemaObjectKind::Function,
        ] {
            self.clone_objects(kind).await?;
        }
        self.clone_triggers().await
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DbSyncError::Cancelled);
        }
        Ok(())
    }

    async fn exec(&mut self, sql: &str) -> Result<u64> {
        let options = ExecuteOptions {
            disable_foreign_keys: self.options.disable_foreign_keys,
        };
        let outcome = self
            .sink
            .execute(sql, &self.options.local_database, options)
            .await?;
        Ok(outcome.affected_rows)
    }

    async fn clone_tables(&mut self, tables: &[String]) -> Result<()> {
        let total = tables.len();
        for (index, table) in tables.iter().enumerate() {
            self.checkpoint()?;
            self.progress
                .update(SyncPhase::Tables, table_percent(index, total), Some(table.as_str()));

            match self.clone_table(table).await {
                Ok(rows) => {
                    self.stats.record(SchemaObjectKind::Table);
                    self.log
                        .success(format!("Table '{}' cloned with {} rows", table, rows));
                }
                Err(DbSyncError::Cancelled) => return Err(DbSyncError::Cancelled),
                Err(error) if self.options.abort_on_missing_structure => return Err(error),
                Err(error) => {
                    self.log
                        .error(format!("Table '{}' skipped: {}", table, error));
                    self.stats.skipped_tables.push(table.clone());
                }
            }

            self.progress
                .update(SyncPhase::Tables, table_percent(index + 1, total), None);
        }
        self.progress.update(
            SyncPhase::Tables,
            SyncPhase::Tables.completed_percent(),
            None,
        );
        Ok(())
    }

    /// Recreates one table and copies its rows. Returns the rows copied.
    async fn clone_table(&mut self, table: &str) -> Result<u64> {
        let definition = self
            .source
            .object_definition(SchemaObjectKind::Table, table)
            .await?;
        let object = SchemaObject::new(SchemaObjectKind::Table, table, definition);
        if object.is_missing_definition() {
            return Err(DbSyncError::MissingDefinition {
                kind: SchemaObjectKind::Table,
                name: table.to_string(),
            });
        }

        self.exec(&object.drop_statement()).await?;
        self.exec(&object.create_statement).await?;

        let mut cursor = RowCursor::start(self.options.chunk_size);
        let mut copied: u64 = 0;
        while cursor.has_more {
            self.checkpoint()?;
            let page = self
                .source
                .table_page(table, cursor.offset, cursor.page_size)
                .await?;
            if page.rows.is_empty() && page.has_more {
                return Err(DbSyncError::Transfer(TransferError::Protocol {
                    action: InspectorAction::GetTableData.to_string(),
                    message: format!(
                        "empty page at offset {} of '{}' claims more rows",
                        cursor.offset, table
                    ),
                }));
            }

            if let Some(insert) = build_insert(table, &page.rows) {
                self.exec(&insert).await?;
            }
            let received = page.rows.len() as u64;
            copied = copied.saturating_add(received);
            self.stats.rows = self.stats.rows.saturating_add(received);
            cursor.advance(&page);
            tracing::debug!(
                "Copied {} rows of '{}' (offset {}, total {:?})",
                received,
                table,
                cursor.offset,
                cursor.total_rows
            );
        }
        Ok(copied)
    }

    async fn clone_objects(&mut self, kind: SchemaObjectKind) -> Result<()> {
        let phase = SyncPhase::for_kind(kind);
        self.checkpoint()?;
        self.progress.update(phase, 0.0, None);

        let names = self.source.list_objects(kind).await?;
        self.log
            .info(format!("Found {} {}", names.len(), kind.plural()));

        for name in &names {
            self.checkpoint()?;
            self.progress.update(phase, 0.0, Some(name.as_str()));
            let definition = self.source.object_definition(kind, name).await?;
            let object = SchemaObject::new(kind, name.clone(), definition);
            if object.is_missing_definition() {
                return Err(DbSyncError::MissingDefinition {
                    kind,
                    name: name.clone(),
                });
            }
            self.deploy(object).await?;
        }

        self.finish_phase(kind, names.len());
        Ok(())
    }

    async fn clone_triggers(&mut self) -> Result<()> {
        let kind = SchemaObjectKind::Trigger;
        self.checkpoint()?;
        self.progress.update(SyncPhase::Triggers, 0.0, None);

        let triggers = self.source.list_triggers().await?;
        self.log.info(format!("Found {} triggers", triggers.len()));

        for trigger in &triggers {
            self.checkpoint()?;
            self.progress
                .update(SyncPhase::Triggers, 0.0, Some(trigger.trigger.as_str()));
            self.deploy(trigger.to_schema_object()).await?;
        }

        self.finish_phase(kind, triggers.len());
        Ok(())
    }

    /// Drops and recreates a non-table object.
    async fn deploy(&mut self, mut object: SchemaObject) -> Result<()> {
        if self.options.strip_definers {
            object.create_statement = strip_definer(&object.create_statement);
        }
        self.exec(&object.drop_statement()).await?;
        self.exec(&object.create_statement).await?;
        self.stats.record(object.kind);
        tracing::debug!("Deployed {} '{}'", object.kind, object.name);
        Ok(())
    }

    fn finish_phase(&mut self, kind: SchemaObjectKind, count: usize) {
        let phase = SyncPhase::for_kind(kind);
        self.progress
            .update(phase, phase.completed_percent(), None);
        self.log
            .success(format!("Cloned {} {}", count, kind.plural()));
    }
}
