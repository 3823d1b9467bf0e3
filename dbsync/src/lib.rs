//! Local dbsync agent.
//!
//! The agent is the write side of a sync. It resolves a sync request against
//! the last-used profile and the settings file, then drives the orchestrator
//! from a remote Inspector into the local MySQL server. Runs are started from
//! the command line or through a small session-gated HTTP API.
//!
//! # Security Guarantees
//! - Remote secrets are remembered for 24 hours at most and never returned
//!   by the API
//! - Console routes require an allow-listed address and, once accounts
//!   exist, a logged-in session
//! - One run per local database at a time
//!
//! # Module Structure
//! - `backend`: opens the remote source and local sink for a run
//! - `service`: request resolution, per-target locking and run execution
//! - `jobs`: background job registry
//! - `api`: routes, session middleware and the serve loop
//! - `cli`: command line and environment configuration

pub mod api;
pub mod backend;
pub mod cli;
pub mod jobs;
pub mod service;

pub use api::{AgentState, ApiError, router, serve, status_for};
#[cfg(feature = "mysql")]
pub use backend::MySqlBackend;
pub use backend::SyncBackend;
pub use cli::Cli;
pub use jobs::{JobRegistry, JobStatus};
pub use service::SyncService;
