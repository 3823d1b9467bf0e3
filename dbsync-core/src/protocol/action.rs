//! Inspector actions and their request parameters.

use crate::error::DbSyncError;
use crate::models::SchemaObjectKind;
use crate::security::DatabaseCredentials;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Default page size for `get_table_data`.
pub const DEFAULT_PAGE_LIMIT: u64 = 1000;
/// Largest page the Inspector will serve.
pub const MAX_PAGE_LIMIT: u64 = 10_000;

/// The dispatchable Inspector actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InspectorAction {
    ListDatabases,
    GetTables,
    GetTableStructure,
    GetTableData,
    GetViews,
    GetViewStructure,
    GetProcedures,
    GetProcedureStructure,
    GetFunctions,
    GetFunctionStructure,
    GetTriggers,
}

impl InspectorAction {
    pub const ALL: [InspectorAction; 11] = [
        Self::ListDatabases,
        Self::GetTables,
        Self::GetTableStructure,
        Self::GetTableData,
        Self::GetViews,
        Self::GetViewStructure,
        Self::GetProcedures,
        Self::GetProcedureStructure,
        Self::GetFunctions,
        Self::GetFunctionStructure,
        Self::GetTriggers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListDatabases => "list_databases",
            Self::GetTables => "get_tables",
            Self::GetTableStructure => "get_table_structure",
            Self::GetTableData => "get_table_data",
            Self::GetViews => "get_views",
            Self::GetViewStructure => "get_view_structure",
            Self::GetProcedures => "get_procedures",
            Self::GetProcedureStructure => "get_procedure_structure",
            Self::GetFunctions => "get_functions",
            Self::GetFunctionStructure => "get_function_structure",
            Self::GetTriggers => "get_triggers",
        }
    }

    /// Listing action for a kind.
    pub fn list_for(kind: SchemaObjectKind) -> Self {
        match kind {
            SchemaObjectKind::Table => Self::GetTables,
            SchemaObjectKind::View => Self::GetViews,
            SchemaObjectKind::Procedure => Self::GetProcedures,
            SchemaObjectKind::Function => Self::GetFunctions,
            SchemaObjectKind::Trigger => Self::GetTriggers,
        }
    }

    /// Structure action for a kind. Triggers have none; their DDL is synthesized.
    pub fn structure_for(kind: SchemaObjectKind) -> Option<Self> {
        match kind {
            SchemaObjectKind::Table => Some(Self::GetTableStructure),
            SchemaObjectKind::View => Some(Self::GetViewStructure),
            SchemaObjectKind::Procedure => Some(Self::GetProcedureStructure),
            SchemaObjectKind::Function => Some(Self::GetFunctionStructure),
            SchemaObjectKind::Trigger => None,
        }
    }

    /// Whether the action names a single object.
    pub fn needs_object_name(&self) -> bool {
        matches!(
            self,
            Self::GetTableStructure
                | Self::GetTableData
                | Self::GetViewStructure
                | Self::GetProcedureStructure
                | Self::GetFunctionStructure
        )
    }

    /// Whether the action needs `db_name`.
    pub fn needs_database(&self) -> bool {
        !matches!(self, Self::ListDatabases)
    }

    /// The object kind an action reads, `None` for `list_databases`.
    pub fn kind(&self) -> Option<SchemaObjectKind> {
        match self {
            Self::ListDatabases => None,
            Self::GetTables | Self::GetTableStructure | Self::GetTableData => {
                Some(SchemaObjectKind::Table)
            }
            Self::GetViews | Self::GetViewStructure => Some(SchemaObjectKind::View),
            Self::GetProcedures | Self::GetProcedureStructure => Some(SchemaObjectKind::Procedure),
            Self::GetFunctions | Self::GetFunctionStructure => Some(SchemaObjectKind::Function),
            Self::GetTriggers => Some(SchemaObjectKind::Trigger),
        }
    }
}

impl FromStr for InspectorAction {
    type Err = DbSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s.trim())
            .ok_or_else(|| DbSyncError::missing_parameter("action"))
    }
}

impl std::fmt::Display for InspectorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat Inspector parameter set.
///
/// Query strings and form bodies carry everything as text, so numeric
/// fields accept either JSON numbers or numeric strings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InspectRequest {
    pub action: Option<String>,
    pub table: Option<String>,
    pub name: Option<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub db_pass: Option<String>,
    pub db_name: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for InspectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectRequest")
            .field("action", &self.action)
            .field("table", &self.table)
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_name", &self.db_name)
            // db_pass and api_key intentionally omitted
            .finish_non_exhaustive()
    }
}

pub(crate) fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn number_field<T: FromStr>(map: &Map<String, Value>, key: &str) -> crate::Result<Option<T>> {
    match text_field(map, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DbSyncError::missing_parameter(key)),
    }
}

impl InspectRequest {
    /// Request for one action.
    pub fn for_action(action: InspectorAction) -> Self {
        Self {
            action: Some(action.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Parses a merged parameter map. Malformed numbers are `MISSING_PARAMETER`.
    pub fn from_map(map: &Map<String, Value>) -> crate::Result<Self> {
        Ok(Self {
            action: text_field(map, "action"),
            table: text_field(map, "table"),
            name: text_field(map, "name"),
            offset: number_field(map, "offset")?,
            limit: number_field(map, "limit")?,
            db_host: text_field(map, "db_host"),
            db_port: number_field(map, "db_port")?,
            db_user: text_field(map, "db_user"),
            db_pass: text_field(map, "db_pass"),
            db_name: text_field(map, "db_name"),
            api_key: text_field(map, "api_key"),
        })
    }

    /// Serializes into the JSON body the client posts. `api_key` is never
    /// included; the client sends it as a header.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut put_text = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                map.insert(key.to_string(), Value::String(v.clone()));
            }
        };
        put_text("action", &self.action);
        put_text("table", &self.table);
        put_text("name", &self.name);
        put_text("db_host", &self.db_host);
        put_text("db_user", &self.db_user);
        put_text("db_pass", &self.db_pass);
        put_text("db_name", &self.db_name);
        if let Some(offset) = self.offset {
            map.insert("offset".to_string(), Value::from(offset));
        }
        if let Some(limit) = self.limit {
            map.insert("limit".to_string(), Value::from(limit));
        }
        if let Some(port) = self.db_port {
            map.insert("db_port".to_string(), Value::from(port));
        }
        map
    }

    pub fn with_object(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_page(mut self, offset: u64, limit: u64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Copies database credentials into the request.
    pub fn with_credentials(mut self, credentials: &DatabaseCredentials) -> Self {
        self.db_host = Some(credentials.host.clone());
        self.db_port = Some(credentials.port);
        self.db_user = Some(credentials.username.clone());
        self.db_pass = Some(credentials.password().to_string());
        self.db_name = credentials.database.clone();
        self
    }

    /// The requested action.
    pub fn action(&self) -> crate::Result<InspectorAction> {
        self.action
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| DbSyncError::missing_parameter("action"))?
            .parse()
    }

    /// Object name from `name`, falling back to `table`.
    pub fn object_name(&self) -> crate::Result<&str> {
        self.name
            .as_deref()
            .or(self.table.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| DbSyncError::missing_parameter("table"))
    }

    /// `(offset, limit)` with defaults applied; the limit is capped.
    pub fn page(&self) -> crate::Result<(u64, u64)> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 {
            return Err(DbSyncError::missing_parameter("limit"));
        }
        Ok((self.offset.unwrap_or(0), limit.min(MAX_PAGE_LIMIT)))
    }

    /// Database credentials for the ad hoc connection.
    pub fn credentials(&self) -> crate::Result<DatabaseCredentials> {
        let host = self
            .db_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or("localhost");
        let user = self
            .db_user
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| DbSyncError::missing_parameter("db_user"))?;
        let mut credentials = DatabaseCredentials::new(
            host.trim(),
            user.trim(),
            self.db_pass.clone().unwrap_or_default(),
        )
        .with_port(self.db_port.unwrap_or(DatabaseCredentials::DEFAULT_PORT));
        if let Some(db) = self.db_name.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            credentials = credentials.with_database(db);
        }
        credentials.validate()?;
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_action_round_trip_names() {
        for action in InspectorAction::ALL {
            assert_eq!(action.as_str().parse::<InspectorAction>().unwrap(), action);
        }
        let err = "drop_everything".parse::<InspectorAction>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingParameter);
    }

    #[test]
    fn test_action_kind_mapping() {
        assert_eq!(
            InspectorAction::list_for(SchemaObjectKind::Procedure),
            InspectorAction::GetProcedures
        );
        assert_eq!(
            InspectorAction::structure_for(SchemaObjectKind::View),
            Some(InspectorAction::GetViewStructure)
        );
        assert_eq!(InspectorAction::structure_for(SchemaObjectKind::Trigger), None);
        assert!(!InspectorAction::ListDatabases.needs_database());
        assert!(InspectorAction::GetTableData.needs_object_name());
        assert_eq!(InspectorAction::ListDatabases.kind(), None);
        assert_eq!(
            InspectorAction::GetFunctionStructure.kind(),
            Some(SchemaObjectKind::Function)
        );
        for kind in SchemaObjectKind::DEPLOY_ORDER {
            assert_eq!(InspectorAction::list_for(kind).kind(), Some(kind));
        }
    }

    #[test]
    fn test_from_map_accepts_string_numbers() {
        let request = InspectRequest::from_map(&map(json!({
            "action": "get_table_data",
            "table": "users",
            "offset": "20",
            "limit": 10,
            "db_port": "3307",
            "db_user": "reader",
            "db_name": "shop"
        })))
        .unwrap();
        assert_eq!(request.action().unwrap(), InspectorAction::GetTableData);
        assert_eq!(request.object_name().unwrap(), "users");
        assert_eq!(request.page().unwrap(), (20, 10));
        let creds = request.credentials().unwrap();
        assert_eq!(creds.port, 3307);
        assert_eq!(creds.host, "localhost");
        assert_eq!(creds.require_database().unwrap(), "shop");
    }

    #[test]
    fn test_malformed_numbers_are_missing_parameters() {
        let err = InspectRequest::from_map(&map(json!({"offset": "abc"}))).unwrap_err();
        assert!(matches!(err, DbSyncError::MissingParameter { ref name } if name == "offset"));
        let err = InspectRequest::from_map(&map(json!({"limit": -5}))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingParameter);
    }

    #[test]
    fn test_page_defaults_and_cap() {
        let request = InspectRequest::default();
        assert_eq!(request.page().unwrap(), (0, DEFAULT_PAGE_LIMIT));
        let request = InspectRequest::default().with_page(5, 1_000_000);
        assert_eq!(request.page().unwrap(), (5, MAX_PAGE_LIMIT));
        assert!(InspectRequest::default().with_page(0, 0).page().is_err());
    }

    #[test]
    fn test_missing_pieces() {
        assert!(InspectRequest::default().action().is_err());
        assert!(InspectRequest::default().object_name().is_err());
        assert!(InspectRequest::default().credentials().is_err());
    }

    #[test]
    fn test_to_map_omits_api_key() {
        let creds = DatabaseCredentials::new("db", "u", "p").with_database("shop");
        let mut request = InspectRequest::for_action(InspectorAction::GetTableData)
            .with_object("users")
            .with_page(0, 2)
            .with_credentials(&creds);
        request.api_key = Some("secret".to_string());

        let wire = request.to_map();
        assert_eq!(wire["action"], json!("get_table_data"));
        assert_eq!(wire["limit"], json!(2));
        assert_eq!(wire["db_port"], json!(3306));
        assert_eq!(wire["db_pass"], json!("p"));
        assert!(!wire.contains_key("api_key"));

        let parsed = InspectRequest::from_map(&wire).unwrap();
        assert_eq!(parsed.object_name().unwrap(), "users");
        assert!(!format!("{:?}", parsed).contains("\"p\""));
    }
}
