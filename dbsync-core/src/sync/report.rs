//! Stats, the run log and the final report.

use crate::error::{DbSyncError, ErrorCode};
use crate::models::SchemaObjectKind;
use crate::protocol::wire_timestamp;
use serde::{Deserialize, Serialize};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One timestamped line of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
}

/// Ordered run log. Every entry is mirrored to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct SyncLog {
    entries: Vec<SyncLogEntry>,
}

impl SyncLog {
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
        self.entries.push(SyncLogEntry {
            timestamp: wire_timestamp(),
            level,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn entries(&self) -> &[SyncLogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<SyncLogEntry> {
        self.entries
    }
}

/// Counters accumulated during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub tables: u64,
    pub rows: u64,
    pub views: u64,
    pub procedures: u64,
    pub functions: u64,
    pub triggers: u64,
    /// Tables that failed and were skipped
    #[serde(default)]
    pub skipped_tables: Vec<String>,
    pub elapsed_ms: u64,
}

impl SyncStats {
    /// Counts one deployed object.
    pub fn record(&mut self, kind: SchemaObjectKind) {
        let counter = match kind {
            SchemaObjectKind::Table => &mut self.tables,
            SchemaObjectKind::View => &mut self.views,
            SchemaObjectKind::Procedure => &mut self.procedures,
            SchemaObjectKind::Function => &mut self.functions,
            SchemaObjectKind::Trigger => &mut self.triggers,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub code: ErrorCode,
    pub message: String,
    /// Code reported by the remote Inspector, when the failure came from it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_code: Option<String>,
}

impl From<&DbSyncError> for SyncFailure {
    fn from(error: &DbSyncError) -> Self {
        let remote_code = match error {
            DbSyncError::Transfer(e) => e.remote_code().map(str::to_string),
            _ => None,
        };
        Self {
            code: error.code(),
            message: error.to_string(),
            remote_code,
        }
    }
}

/// Outcome of one run. Always carries the stats and logs gathered so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub success: bool,
    pub stats: SyncStats,
    pub logs: Vec<SyncLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncFailure>,
}

impl SyncReport {
    pub fn succeeded(stats: SyncStats, log: SyncLog) -> Self {
        Self {
            success: true,
            stats,
            logs: log.into_entries(),
            error: None,
        }
    }

    pub fn failed(stats: SyncStats, log: SyncLog, error: &DbSyncError) -> Self {
        Self {
            success: false,
            stats,
            logs: log.into_entries(),
            error: Some(SyncFailure::from(error)),
        }
    }

    /// Failure code, if the run failed.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
