//! Run progress and cooperative cancellation.
//!
//! Progress is published through a `tokio::sync::watch` channel so any
//! number of observers can poll the latest value without slowing the run.
//! The percentage never decreases and only reaches 100 on success.

use crate::models::SchemaObjectKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Reached once the local database exists.
pub const DATABASE_READY_PERCENT: f64 = 5.0;
/// Reached once the remote tables are enumerated.
pub const TABLES_LISTED_PERCENT: f64 = 15.0;
/// Spread evenly across the tables.
pub const TABLES_SHARE_PERCENT: f64 = 60.0;
/// Added after each of views, procedures, functions and triggers.
pub const OBJECT_PHASE_PERCENT: f64 = 3.75;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Pending,
    EnsureLocalDatabase,
    EnumerateTables,
    Tables,
    Views,
    Procedures,
    Functions,
    Triggers,
    Done,
    Failed,
}

impl SyncPhase {
    /// Phase that deploys objects of `kind`.
    pub fn for_kind(kind: SchemaObjectKind) -> Self {
        match kind {
            SchemaObjectKind::Table => Self::Tables,
            SchemaObjectKind::View => Self::Views,
            SchemaObjectKind::Procedure => Self::Procedures,
            SchemaObjectKind::Function => Self::Functions,
            SchemaObjectKind::Trigger => Self::Triggers,
        }
    }

    /// Percentage reached when this phase finishes.
    pub fn completed_percent(&self) -> f64 {
        let tables_done = TABLES_LISTED_PERCENT + TABLES_SHARE_PERCENT;
        match self {
            Self::Pending => 0.0,
            Self::EnsureLocalDatabase => DATABASE_READY_PERCENT,
            Self::EnumerateTables => TABLES_LISTED_PERCENT,
            Self::Tables => tables_done,
            Self::Views => tables_done + OBJECT_PHASE_PERCENT,
            Self::Procedures => tables_done + 2.0 * OBJECT_PHASE_PERCENT,
            Self::Functions => tables_done + 3.0 * OBJECT_PHASE_PERCENT,
            Self::Triggers => tables_done + 4.0 * OBJECT_PHASE_PERCENT,
            Self::Done => 100.0,
            Self::Failed => 0.0,
        }
    }
}

/// Percentage after `done` of `total` tables.
pub fn table_percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return SyncPhase::Tables.completed_percent();
    }
    let ratio = done.min(total) as f64 / total as f64;
    TABLES_LISTED_PERCENT + TABLES_SHARE_PERCENT * ratio
}

/// Snapshot published to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub percent: f64,
    pub phase: SyncPhase,
    pub current_object: Option<String>,
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self {
            percent: 0.0,
            phase: SyncPhase::Pending,
            current_object: None,
        }
    }
}

/// Publishing side of the progress channel.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    tx: Arc<watch::Sender<SyncProgress>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncProgress::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SyncProgress {
        self.tx.borrow().clone()
    }

    /// Moves to `phase`. The percentage is raised to `percent` but never
    /// lowered, and capped below 100 until [`ProgressTracker::complete`].
    pub fn update(&self, phase: SyncPhase, percent: f64, current_object: Option<&str>) {
        let ceiling = SyncPhase::Triggers.completed_percent();
        self.tx.send_modify(|progress| {
            progress.phase = phase;
            progress.percent = progress.percent.max(percent.min(ceiling));
            progress.current_object = current_object.map(str::to_string);
        });
    }

    /// Marks the run as successfully finished.
    pub fn complete(&self) {
        self.tx.send_modify(|progress| {
            progress.phase = SyncPhase::Done;
            progress.percent = 100.0;
            progress.current_object = None;
        });
    }

    /// Marks the run as failed, keeping the percentage reached.
    pub fn fail(&self) {
        self.tx.send_modify(|progress| {
            progress.phase = SyncPhase::Failed;
            progress.current_object = None;
        });
    }
}

/// Cooperative cancel flag shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The run stops at its next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
