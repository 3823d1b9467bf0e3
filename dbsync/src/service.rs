//! The agent's sync service.
//!
//! Resolves incomplete requests against the last-used profile and the
//! settings document, serializes runs per local database and executes them
//! either inline or as background jobs.

use crate::backend::SyncBackend;
use crate::jobs::JobRegistry;
use dbsync_core::security::KeyValueStore;
use dbsync_core::sync::SyncLog;
use dbsync_core::{
    CancelHandle, DbSyncError, ProgressTracker, Result, Settings, SyncOrchestrator, SyncPlan,
    SyncProfileStore, SyncReport, SyncRequest, SyncStats, TargetLocks,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub struct SyncService {
    backend: Arc<dyn SyncBackend>,
    settings: RwLock<Settings>,
    settings_path: Option<PathBuf>,
    profiles: SyncProfileStore,
    locks: TargetLocks,
    jobs: JobRegistry,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("settings_path", &self.settings_path)
            .field("locks", &self.locks)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl SyncService {
    pub fn new(backend: Arc<dyn SyncBackend>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            settings: RwLock::new(Settings::default()),
            settings_path: None,
            profiles: SyncProfileStore::new(store),
            locks: TargetLocks::new(),
            jobs: JobRegistry::new(),
        }
    }

    /// Uses `settings` and writes updates back to `path`, if given.
    pub fn with_settings(mut self, settings: Settings, path: Option<PathBuf>) -> Self {
        self.settings = RwLock::new(settings);
        self.settings_path = path;
        self
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Replaces the settings document.
    ///
    /// # Errors
    /// `CONFIGURATION_ERROR` for a malformed or out-of-range document, or an
    /// I/O error when the file cannot be written.
    pub fn update_settings(&self, document: Value) -> Result<Settings> {
        let settings = Settings::from_value(document).map_err(|e| match e {
            DbSyncError::Serialization { source, .. } => {
                DbSyncError::configuration(format!("Invalid settings document: {}", source))
            }
            other => other,
        })?;
        if let Some(path) = &self.settings_path {
            settings.save(path)?;
        }
        *self.settings.write() = settings.clone();
        tracing::info!("Settings updated");
        Ok(settings)
    }

    /// The remembered profile without its secrets, plus flags saying which
    /// secrets are still on file.
    pub fn profile(&self) -> Result<Value> {
        let profile = self.remembered()?;
        let mut view = profile.to_map(false);
        view.insert("hasApiKey".to_string(), Value::Bool(profile.api_key.is_some()));
        view.insert(
            "hasRemoteDbPass".to_string(),
            Value::Bool(profile.remote_db_pass.is_some()),
        );
        Ok(Value::Object(view))
    }

    /// The unexpired fields of the last resolved request, secrets included.
    pub fn remembered(&self) -> Result<SyncRequest> {
        self.profiles.load()
    }

    pub fn clear_profile(&self) -> Result<()> {
        self.profiles.clear()
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Completes `request` from the profile, then the settings, and remembers
    /// the merged request once it resolves.
    pub fn resolve(&self, request: SyncRequest) -> Result<SyncPlan> {
        let profile = self.profiles.load()?;
        let defaults = self.settings.read().sync_defaults();
        let merged = request.or(&profile).or(&defaults);
        let plan = merged.clone().into_plan()?;
        self.profiles.save(&merged)?;
        Ok(plan)
    }

    /// Runs a sync to completion.
    ///
    /// # Errors
    /// Only for requests that never started: validation failures and
    /// `SYNC_IN_PROGRESS`. Failed runs come back as a failed report.
    pub async fn run(&self, request: SyncRequest) -> Result<SyncReport> {
        let plan = self.resolve(request)?;
        let _lease = self.locks.try_acquire(&plan.options.local_database)?;
        Ok(self
            .execute(plan, ProgressTracker::new(), CancelHandle::new())
            .await)
    }

    /// Starts a background run and returns its job id.
    pub fn start_job(self: &Arc<Self>, request: SyncRequest) -> Result<Uuid> {
        let plan = self.resolve(request)?;
        let lease = self.locks.try_acquire(&plan.options.local_database)?;
        let progress = ProgressTracker::new();
        let cancel = CancelHandle::new();
        let id = self.jobs.register(
            &plan.options.local_database,
            progress.subscribe(),
            cancel.clone(),
        );
        tracing::info!("Started sync job {} into '{}'", id, lease.database());

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let report = service.execute(plan, progress, cancel).await;
            drop(lease);
            service.jobs.finish(id, report);
        });
        Ok(id)
    }

    async fn execute(
        &self,
        plan: SyncPlan,
        progress: ProgressTracker,
        cancel: CancelHandle,
    ) -> SyncReport {
        tracing::info!(
            "Syncing {} via {} into '{}' (chunk size {})",
            plan.credentials.to_safe_string(),
            plan.client.base_url,
            plan.options.local_database,
            plan.options.chunk_size
        );

        let remote = match self.backend.remote(&plan) {
            Ok(remote) => remote,
            Err(e) => return setup_failed(&progress, &e),
        };
        let mut local = match self.backend.local().await {
            Ok(local) => local,
            Err(e) => return setup_failed(&progress, &e),
        };

        let database = plan.options.local_database.clone();
        let report = SyncOrchestrator::new(plan.options)
            .with_progress(progress)
            .with_cancel_handle(cancel)
            .run(remote.as_ref(), local.as_mut())
            .await;
        local.close().await;

        match &report.error {
            None => tracing::info!(
                "Sync into '{}' finished: {} tables, {} rows, {} skipped",
                database,
                report.stats.tables,
                report.stats.rows,
                report.stats.skipped_tables.len()
            ),
            Some(failure) => tracing::error!(
                "Sync into '{}' failed with {}: {}",
                database,
                failure.code,
                failure.message
            ),
        }
        report
    }
}

fn setup_failed(progress: &ProgressTracker, error: &DbSyncError) -> SyncReport {
    tracing::error!("Sync could not start: {}", error);
    progress.fail();
    let mut log = SyncLog::default();
    log.error(format!("Sync could not start: {}", error));
    SyncReport::failed(SyncStats::default(), log, error)
}
