//! Run options for one sync.

use crate::error::DbSyncError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Rows fetched per page unless the operator says otherwise.
pub const DEFAULT_CHUNK_SIZE: u64 = 1000;
/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: u64 = 100;
/// Largest accepted chunk size; matches the Inspector's page cap.
pub const MAX_CHUNK_SIZE: u64 = 10_000;

/// How one run behaves.
///
/// # Example
///
/// ```rust
/// use dbsync_core::sync::SyncOptions;
///
/// let options = SyncOptions::new("shop_copy")
///     .with_chunk_size(500)
///     .with_abort_on_missing_structure(true);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Local destination database
    pub local_database: String,
    /// Rows per `get_table_data` page
    pub chunk_size: u64,
    /// Stop the whole run at the first table that fails
    pub abort_on_missing_structure: bool,
    /// Run every local statement with foreign key checks off
    pub disable_foreign_keys: bool,
    /// Remove `DEFINER=` clauses from view, routine and trigger DDL
    pub strip_definers: bool,
}

impl SyncOptions {
    pub fn new(local_database: impl Into<String>) -> Self {
        Self {
            local_database: local_database.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            abort_on_missing_structure: false,
            disable_foreign_keys: true,
            strip_definers: true,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_abort_on_missing_structure(mut self, abort: bool) -> Self {
        self.abort_on_missing_structure = abort;
        self
    }

    pub fn with_disable_foreign_keys(mut self, disable: bool) -> Self {
        self.disable_foreign_keys = disable;
        self
    }

    pub fn with_strip_definers(mut self, strip: bool) -> Self {
        self.strip_definers = strip;
        self
    }

    /// Validates the destination name and that pages are non-empty and
    /// within the Inspector's cap.
    pub fn validate(&self) -> Result<()> {
        if self.local_database.trim().is_empty() {
            return Err(DbSyncError::missing_parameter("localDbName"));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(DbSyncError::configuration(format!(
                "chunkSize must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Stricter check applied to operator input.
    pub fn validate_operator_input(&self) -> Result<()> {
        self.validate()?;
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(DbSyncError::configuration(format!(
                "chunkSize must be between {} and {}, got {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        Ok(())
    }
}
