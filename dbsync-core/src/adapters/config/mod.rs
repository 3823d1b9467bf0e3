//! Configuration types for database adapters.
//!
//! # Security
//! These configuration structs intentionally do NOT store passwords or credentials.
//! Credentials travel separately in `security::DatabaseCredentials`.

mod connection;

pub use connection::ConnectionConfig;
