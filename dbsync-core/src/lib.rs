//! Core data structures and the sync engine for dbsync.
//!
//! This crate provides the types, traits and services shared between the
//! remote Inspector and the local agent: the wire protocol, the access gate,
//! the MySQL adapters and the orchestrator that clones a remote database.
//!
//! # Security Guarantees
//! - No credentials stored or logged in any data structures
//! - Inspector sessions are read-only
//! - Every machine-to-machine call is checked against the IP allow-list and
//!   the shared secret before any database work happens
//!
//! # Architecture
//! - `adapters`: `SchemaInspector`, `ExecutionSink` and their MySQL versions
//! - `protocol`: envelope, actions and the `TransferClient`
//! - `security`: credentials, allow-list, tokens, sessions, the gate
//! - `sync`: options, progress, reports, locks and the orchestrator
//! - `settings`: the flat settings document and the last-used profile

pub mod adapters;
pub mod error;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod security;
pub mod settings;
pub mod sql;
pub mod sync;

// Re-export commonly used types
pub use adapters::{
    ConnectionConfig, ExecuteOptions, ExecutionOutcome, ExecutionSink, InspectorConnector,
    SchemaInspector,
};
pub use error::{DbSyncError, ErrorCode, Result};
pub use models::{
    NameList, ObjectDefinition, Row, RowCursor, SchemaObject, SchemaObjectKind, TablePage,
    TriggerDefinition, TriggerList,
};
pub use protocol::{
    ClientConfig, InspectRequest, InspectorAction, RemoteSource, TransferClient, TransferEnvelope,
    TransferError,
};
pub use settings::{Settings, SyncProfileStore};
pub use sync::{
    CancelHandle, ProgressTracker, SyncOptions, SyncOrchestrator, SyncPhase, SyncPlan,
    SyncProgress, SyncReport, SyncRequest, SyncStats, TargetLocks,
};
