//! The sync engine.
//!
//! # Module Structure
//! - `options`: chunk size and failure-handling switches
//! - `request`: the operator's sync request and its resolution into a plan
//! - `progress`: watch-channel progress and the cancel handle
//! - `report`: stats, the leveled run log and the final report
//! - `lock`: per-target advisory locks
//! - `orchestrator`: the sequential clone state machine

mod lock;
mod options;
mod orchestrator;
mod progress;
mod report;
mod request;

pub use lock::{TargetLease, TargetLocks};
pub use options::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, SyncOptions};
pub use orchestrator::SyncOrchestrator;
pub use progress::{
    CancelHandle, DATABASE_READY_PERCENT, OBJECT_PHASE_PERCENT, ProgressTracker, SyncPhase,
    SyncProgress, TABLES_LISTED_PERCENT, TABLES_SHARE_PERCENT, table_percent,
};
pub use report::{LogLevel, SyncFailure, SyncLog, SyncLogEntry, SyncReport, SyncStats};
pub use request::{SyncPlan, SyncRequest};
pub(crate) use request::SECRET_KEYS;
