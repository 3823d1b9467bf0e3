//! Advisory per-target locks.
//!
//! Two runs into the same local database would interleave DROP and CREATE
//! statements, so the agent takes a lease on the target first.

use crate::error::DbSyncError;
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Registry of local databases with a run in progress.
#[derive(Debug, Clone, Default)]
pub struct TargetLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(database: &str) -> String {
        database.trim().to_lowercase()
    }

    /// Takes the lease for `database`.
    ///
    /// # Errors
    /// `SYNC_IN_PROGRESS` when another run holds it.
    pub fn try_acquire(&self, database: &str) -> Result<TargetLease> {
        let key = Self::key(database);
        if !self.held.lock().insert(key.clone()) {
            return Err(DbSyncError::SyncInProgress {
                database: database.to_string(),
            });
        }
        tracing::debug!("Acquired sync lock for '{}'", key);
        Ok(TargetLease {
            held: Arc::clone(&self.held),
            key,
        })
    }

    pub fn is_locked(&self, database: &str) -> bool {
        self.held.lock().contains(&Self::key(database))
    }
}

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct TargetLease {
    held: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl TargetLease {
    pub fn database(&self) -> &str {
        &self.key
    }
}

impl Drop for TargetLease {
    fn drop(&mut self) {
        self.held.lock().remove(&self.key);
        tracing::debug!("Released sync lock for '{}'", self.key);
    }
}
