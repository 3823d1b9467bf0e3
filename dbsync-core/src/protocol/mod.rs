//! The sync wire protocol: envelopes, actions and the remote client.
//!
//! # Module Structure
//! - `envelope`: the `{success, data, message, timestamp}` reply wrapper
//! - `action`: Inspector actions and their flat parameter set
//! - `client`: the reqwest-based Inspector client

pub(crate) mod action;
mod client;
mod envelope;

pub use action::{DEFAULT_PAGE_LIMIT, InspectRequest, InspectorAction, MAX_PAGE_LIMIT};
pub use client::{ClientConfig, DEFAULT_CALL_TIMEOUT, INSPECT_PATH, TransferClient, TransferError};
pub use envelope::{TIMESTAMP_FORMAT, TransferEnvelope, wire_timestamp};

use crate::models::{SchemaObjectKind, TablePage, TriggerDefinition};
use async_trait::async_trait;

/// Read side of a sync: whatever serves schema objects and rows.
///
/// [`TransferClient`] is the production implementation.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Names of all objects of a kind.
    async fn list_objects(&self, kind: SchemaObjectKind) -> Result<Vec<String>, TransferError>;

    /// Recreate statement for one table, view, procedure or function.
    async fn object_definition(
        &self,
        kind: SchemaObjectKind,
        name: &str,
    ) -> Result<String, TransferError>;

    /// One page of rows.
    async fn table_page(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<TablePage, TransferError>;

    /// Trigger metadata for the whole database.
    async fn list_triggers(&self) -> Result<Vec<TriggerDefinition>, TransferError>;
}
