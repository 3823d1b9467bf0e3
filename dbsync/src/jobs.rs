//! In-memory registry of background sync jobs.
//!
//! A job is visible from the moment it is started until it has been finished
//! for longer than the retention window. Progress is read straight from the
//! run's watch channel.

use chrono::{DateTime, Duration, Utc};
use dbsync_core::{CancelHandle, SyncProgress, SyncReport};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// How long finished jobs stay queryable.
pub const JOB_RETENTION_HOURS: i64 = 24;

struct JobEntry {
    database: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    progress: watch::Receiver<SyncProgress>,
    cancel: CancelHandle,
    report: Option<SyncReport>,
}

/// Snapshot returned by the jobs API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: Uuid,
    pub database: String,
    pub running: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: SyncProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
}

impl JobStatus {
    fn of(id: Uuid, entry: &JobEntry) -> Self {
        Self {
            id,
            database: entry.database.clone(),
            running: entry.report.is_none(),
            started_at: entry.started_at,
            finished_at: entry.finished_at,
            progress: entry.progress.borrow().clone(),
            report: entry.report.clone(),
        }
    }
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs.read().len())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a started job and drops expired finished ones.
    pub fn register(
        &self,
        database: &str,
        progress: watch::Receiver<SyncProgress>,
        cancel: CancelHandle,
    ) -> Uuid {
        self.prune(Utc::now() - Duration::hours(JOB_RETENTION_HOURS));
        let id = Uuid::new_v4();
        self.jobs.write().insert(
            id,
            JobEntry {
                database: database.to_string(),
                started_at: Utc::now(),
                finished_at: None,
                progress,
                cancel,
                report: None,
            },
        );
        id
    }

    pub fn finish(&self, id: Uuid, report: SyncReport) {
        if let Some(entry) = self.jobs.write().get_mut(&id) {
            entry.finished_at = Some(Utc::now());
            entry.report = Some(report);
        }
    }

    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs.read().get(&id).map(|entry| JobStatus::of(id, entry))
    }

    /// All known jobs, oldest first.
    pub fn list(&self) -> Vec<JobStatus> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .iter()
            .map(|(id, entry)| JobStatus::of(*id, entry))
            .collect();
        jobs.sort_by_key(|job| job.started_at);
        jobs
    }

    /// Requests cancellation. Returns `false` for unknown jobs.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.jobs.read().get(&id) {
            Some(entry) => {
                if entry.report.is_none() {
                    tracing::info!("Cancelling sync job {} into '{}'", id, entry.database);
                    entry.cancel.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Removes jobs that finished before `cutoff`.
    pub fn prune(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, entry| entry.finished_at.is_none_or(|at| at >= cutoff));
        before - jobs.len()
    }
}
