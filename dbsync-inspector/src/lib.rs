//! Remote schema Inspector for dbsync.
//!
//! The Inspector is the read side of a sync. It exposes a single HTTP endpoint,
//! `/api/inspect`, that an agent calls once per action (list tables, fetch a
//! `CREATE` statement, read a page of rows). Every request passes the access
//! gate before any parameter is validated or any database is touched, and
//! every reply is a JSON envelope.
//!
//! # Security Guarantees
//! - Loopback callers skip the key check, everyone else must be allow-listed
//!   and present the shared secret
//! - Database credentials arrive with each request and are dropped with it
//! - Inspector database sessions are read-only
//!
//! # Module Structure
//! - `cli`: command line and environment configuration
//! - `params`: merges query string, form and JSON body parameters
//! - `dispatch`: validates a request and runs one action against an inspector
//! - `server`: router, handler, status mapping and the serve loop

pub mod cli;
pub mod dispatch;
pub mod params;
pub mod server;

pub use cli::Cli;
pub use dispatch::{dispatch, prepare};
pub use params::Parameters;
pub use server::{INSPECT_ROUTE, InspectorConfig, InspectorState, router, serve, status_for};
