//! Action dispatch against a connected [`SchemaInspector`].

use dbsync_core::security::DatabaseCredentials;
use dbsync_core::{
    DbSyncError, InspectRequest, InspectorAction, NameList, ObjectDefinition, Result,
    SchemaInspector, SchemaObjectKind, TriggerList,
};
use serde::Serialize;
use serde_json::Value;

/// Validates everything a request needs before a connection is opened.
///
/// # Errors
/// `MISSING_PARAMETER` for an unknown action, a missing object name, a bad
/// page, missing credentials or a missing `db_name`.
pub fn prepare(request: &InspectRequest) -> Result<(InspectorAction, DatabaseCredentials)> {
    let action = request.action()?;
    if action.needs_object_name() {
        request.object_name()?;
    }
    if action == InspectorAction::GetTableData {
        request.page()?;
    }
    let credentials = request.credentials()?;
    if action.needs_database() {
        credentials.require_database()?;
    }
    Ok((action, credentials))
}

fn encode<T: Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|e| DbSyncError::serialization("Failed to encode Inspector payload", e))
}

fn kind_of(action: InspectorAction) -> Result<SchemaObjectKind> {
    action
        .kind()
        .ok_or_else(|| DbSyncError::missing_parameter("action"))
}

/// Runs one action and returns the envelope `data`.
pub async fn dispatch(
    inspector: &dyn SchemaInspector,
    action: InspectorAction,
    request: &InspectRequest,
) -> Result<Value> {
    match action {
        InspectorAction::ListDatabases => encode(&NameList {
            names: inspector.list_databases().await?,
        }),
        InspectorAction::GetTables
        | InspectorAction::GetViews
        | InspectorAction::GetProcedures
        | InspectorAction::GetFunctions => encode(&NameList {
            names: inspector.list_objects(kind_of(action)?).await?,
        }),
        InspectorAction::GetTableStructure
        | InspectorAction::GetViewStructure
        | InspectorAction::GetProcedureStructure
        | InspectorAction::GetFunctionStructure => {
            let name = request.object_name()?;
            let create_statement = inspector.object_definition(kind_of(action)?, name).await?;
            encode(&ObjectDefinition {
                name: name.to_string(),
                create_statement,
            })
        }
        InspectorAction::GetTableData => {
            let table = request.object_name()?;
            let (offset, limit) = request.page()?;
            encode(&inspector.table_page(table, offset, limit).await?)
        }
        InspectorAction::GetTriggers => encode(&TriggerList {
            triggers: inspector.list_triggers().await?,
        }),
    }
}
