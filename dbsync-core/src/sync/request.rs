//! The operator's sync request.
//!
//! Requests arrive as JSON or form bodies with camelCase keys. Every field is
//! optional at parse time so a request can be completed from the settings
//! file and the last-used profile before it is resolved into a [`SyncPlan`].

use super::options::{DEFAULT_CHUNK_SIZE, SyncOptions};
use crate::error::DbSyncError;
use crate::protocol::action::{number_field, text_field};
use crate::protocol::ClientConfig;
use crate::security::{DatabaseCredentials, SharedSecret};
use crate::Result;
use serde_json::{Map, Value};
use zeroize::Zeroizing;

const REMOTE_URL: &str = "remoteUrl";
const API_KEY: &str = "apiKey";
const USE_TOKEN: &str = "useToken";
const REMOTE_DB_HOST: &str = "remoteDbHost";
const REMOTE_DB_PORT: &str = "remoteDbPort";
const REMOTE_DB_USER: &str = "remoteDbUser";
const REMOTE_DB_PASS: &str = "remoteDbPass";
const REMOTE_DB_NAME: &str = "remoteDbName";
const LOCAL_DB_NAME: &str = "localDbName";
const CHUNK_SIZE: &str = "chunkSize";
const ABORT_ON_MISSING_STRUCTURE: &str = "abortOnMissingStructure";
const DISABLE_FOREIGN_KEYS: &str = "disableForeignKeys";
const STRIP_DEFINERS: &str = "stripDefiners";

/// Keys holding secrets.
pub(crate) const SECRET_KEYS: [&str; 2] = [API_KEY, REMOTE_DB_PASS];

/// A possibly incomplete sync request.
#[derive(Clone, Default)]
pub struct SyncRequest {
    pub remote_url: Option<String>,
    pub api_key: Option<SharedSecret>,
    pub use_token: Option<bool>,
    pub remote_db_host: Option<String>,
    pub remote_db_port: Option<u16>,
    pub remote_db_user: Option<String>,
    pub remote_db_pass: Option<Zeroizing<String>>,
    pub remote_db_name: Option<String>,
    pub local_db_name: Option<String>,
    pub chunk_size: Option<u64>,
    pub abort_on_missing_structure: Option<bool>,
    pub disable_foreign_keys: Option<bool>,
    pub strip_definers: Option<bool>,
}

impl std::fmt::Debug for SyncRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRequest")
            .field("remote_url", &self.remote_url)
            .field("use_token", &self.use_token)
            .field("remote_db_host", &self.remote_db_host)
            .field("remote_db_port", &self.remote_db_port)
            .field("remote_db_user", &self.remote_db_user)
            .field("remote_db_name", &self.remote_db_name)
            .field("local_db_name", &self.local_db_name)
            .field("chunk_size", &self.chunk_size)
            .field("abort_on_missing_structure", &self.abort_on_missing_structure)
            // api_key and remote_db_pass intentionally omitted
            .finish_non_exhaustive()
    }
}

/// A fully resolved run: where to read, what to read, how to write.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub client: ClientConfig,
    pub credentials: DatabaseCredentials,
    pub options: SyncOptions,
}

fn non_empty(map: &Map<String, Value>, key: &str) -> Option<String> {
    text_field(map, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn bool_field(map: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    let Some(raw) = text_field(map, key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" | "on" | "yes" => Ok(Some(true)),
        "false" | "0" | "off" | "no" => Ok(Some(false)),
        _ => Err(DbSyncError::missing_parameter(key)),
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| DbSyncError::missing_parameter(key))
}

impl SyncRequest {
    /// Parses a JSON object or decoded form. Empty strings count as absent,
    /// except for the remote password.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            remote_url: non_empty(map, REMOTE_URL),
            api_key: non_empty(map, API_KEY).map(SharedSecret::new),
            use_token: bool_field(map, USE_TOKEN)?,
            remote_db_host: non_empty(map, REMOTE_DB_HOST),
            remote_db_port: number_field(map, REMOTE_DB_PORT)?,
            remote_db_user: non_empty(map, REMOTE_DB_USER),
            remote_db_pass: text_field(map, REMOTE_DB_PASS).map(Zeroizing::new),
            remote_db_name: non_empty(map, REMOTE_DB_NAME),
            local_db_name: non_empty(map, LOCAL_DB_NAME),
            chunk_size: number_field(map, CHUNK_SIZE)?,
            abort_on_missing_structure: bool_field(map, ABORT_ON_MISSING_STRUCTURE)?,
            disable_foreign_keys: bool_field(map, DISABLE_FOREIGN_KEYS)?,
            strip_definers: bool_field(map, STRIP_DEFINERS)?,
        })
    }

    /// Serializes the request. Secrets are only written when asked for.
    pub fn to_map(&self, include_secrets: bool) -> Map<String, Value> {
        let mut map = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };
        put(REMOTE_URL, self.remote_url.clone().map(Value::String));
        put(USE_TOKEN, self.use_token.map(Value::Bool));
        put(REMOTE_DB_HOST, self.remote_db_host.clone().map(Value::String));
        put(REMOTE_DB_PORT, self.remote_db_port.map(Value::from));
        put(REMOTE_DB_USER, self.remote_db_user.clone().map(Value::String));
        put(REMOTE_DB_NAME, self.remote_db_name.clone().map(Value::String));
        put(LOCAL_DB_NAME, self.local_db_name.clone().map(Value::String));
        put(CHUNK_SIZE, self.chunk_size.map(Value::from));
        put(
            ABORT_ON_MISSING_STRUCTURE,
            self.abort_on_missing_structure.map(Value::Bool),
        );
        put(DISABLE_FOREIGN_KEYS, self.disable_foreign_keys.map(Value::Bool));
        put(STRIP_DEFINERS, self.strip_definers.map(Value::Bool));
        if include_secrets {
            put(
                API_KEY,
                self.api_key
                    .as_ref()
                    .map(|k| Value::String(k.expose().to_string())),
            );
            put(
                REMOTE_DB_PASS,
                self.remote_db_pass
                    .as_ref()
                    .map(|p| Value::String(p.as_str().to_string())),
            );
        }
        map
    }

    /// Fills every absent field from `fallback`.
    pub fn or(self, fallback: &SyncRequest) -> Self {
        Self {
            remote_url: self.remote_url.or_else(|| fallback.remote_url.clone()),
            api_key: self.api_key.or_else(|| fallback.api_key.clone()),
            use_token: self.use_token.or(fallback.use_token),
            remote_db_host: self
                .remote_db_host
                .or_else(|| fallback.remote_db_host.clone()),
            remote_db_port: self.remote_db_port.or(fallback.remote_db_port),
            remote_db_user: self
                .remote_db_user
                .or_else(|| fallback.remote_db_user.clone()),
            remote_db_pass: self
                .remote_db_pass
                .or_else(|| fallback.remote_db_pass.clone()),
            remote_db_name: self
                .remote_db_name
                .or_else(|| fallback.remote_db_name.clone()),
            local_db_name: self
                .local_db_name
                .or_else(|| fallback.local_db_name.clone()),
            chunk_size: self.chunk_size.or(fallback.chunk_size),
            abort_on_missing_structure: self
                .abort_on_missing_structure
                .or(fallback.abort_on_missing_structure),
            disable_foreign_keys: self.disable_foreign_keys.or(fallback.disable_foreign_keys),
            strip_definers: self.strip_definers.or(fallback.strip_definers),
        }
    }

    /// Resolves into a runnable plan.
    ///
    /// # Errors
    /// `MISSING_PARAMETER` naming the first absent required field, or
    /// `CONFIGURATION_ERROR` for a bad URL or chunk size.
    pub fn into_plan(self) -> Result<SyncPlan> {
        let remote_url = required(self.remote_url, REMOTE_URL)?;
        let api_key = required(self.api_key, API_KEY)?;
        let host = required(self.remote_db_host, REMOTE_DB_HOST)?;
        let user = required(self.remote_db_user, REMOTE_DB_USER)?;
        let database = required(self.remote_db_name, REMOTE_DB_NAME)?;
        let local_database = required(self.local_db_name, LOCAL_DB_NAME)?;

        let client = ClientConfig::new(&remote_url, api_key)?
            .with_token(self.use_token.unwrap_or(false));

        let password = self
            .remote_db_pass
            .as_deref()
            .map(String::as_str)
            .unwrap_or_default();
        let credentials = DatabaseCredentials::new(host, user, password)
            .with_port(
                self.remote_db_port
                    .unwrap_or(DatabaseCredentials::DEFAULT_PORT),
            )
            .with_database(database);
        credentials.validate()?;

        let options = SyncOptions::new(local_database)
            .with_chunk_size(self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE))
            .with_abort_on_missing_structure(self.abort_on_missing_structure.unwrap_or(false))
            .with_disable_foreign_keys(self.disable_foreign_keys.unwrap_or(true))
            .with_strip_definers(self.strip_definers.unwrap_or(true));
        options.validate_operator_input()?;

        Ok(SyncPlan {
            client,
            credentials,
            options,
        })
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

    fn complete() -> Map<String, Value> {
        map(json!({
            "remoteUrl": "https://remote.example/console",
            "apiKey": "shared",
            "remoteDbHost": "db.internal",
            "remoteDbUser": "reader",
            "remoteDbPass": "pw",
            "remoteDbName": "shop",
            "localDbName": "shop_copy",
        }))
    }

    #[test]
    fn test_complete_request_resolves_with_defaults() {
        let plan = SyncRequest::from_map(&complete()).unwrap().into_plan().unwrap();
        assert_eq!(plan.options.chunk_size, 1000);
        assert!(!plan.options.abort_on_missing_structure);
        assert!(plan.options.disable_foreign_keys);
        assert_eq!(plan.credentials.port, 3306);
        assert_eq!(plan.credentials.database.as_deref(), Some("shop"));
        assert_eq!(plan.credentials.password(), "pw");
        assert!(!plan.client.use_token);
    }

    #[test]
    fn test_form_values_as_text() {
        let mut fields = complete();
        fields.insert("chunkSize".to_string(), json!("500"));
        fields.insert("remoteDbPort".to_string(), json!("3307"));
        fields.insert("abortOnMissingStructure".to_string(), json!("on"));
        fields.insert("useToken".to_string(), json!("1"));

        let plan = SyncRequest::from_map(&fields).unwrap().into_plan().unwrap();
        assert_eq!(plan.options.chunk_size, 500);
        assert_eq!(plan.credentials.port, 3307);
        assert!(plan.options.abort_on_missing_structure);
        assert!(plan.client.use_token);
    }

    #[test]
    fn test_missing_fields_are_named() {
        let mut fields = complete();
        fields.insert("remoteDbUser".to_string(), json!("  "));
        let err = SyncRequest::from_map(&fields)
            .unwrap()
            .into_plan()
            .unwrap_err();
        assert!(matches!(err, DbSyncError::MissingParameter { ref name } if name == "remoteDbUser"));
    }

    #[test]
    fn test_chunk_size_out_of_range() {
        let mut fields = complete();
        fields.insert("chunkSize".to_string(), json!(50));
        let err = SyncRequest::from_map(&fields)
            .unwrap()
            .into_plan()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_bad_bool_is_rejected() {
        let mut fields = complete();
        fields.insert("useToken".to_string(), json!("maybe"));
        assert!(SyncRequest::from_map(&fields).is_err());
    }

    #[test]
    fn test_or_fills_gaps_only() {
        let partial = SyncRequest::from_map(&map(json!({
            "localDbName": "override",
            "remoteDbPass": "new-pw",
        })))
        .unwrap();
        let fallback = SyncRequest::from_map(&complete()).unwrap();

        let plan = partial.or(&fallback).into_plan().unwrap();
        assert_eq!(plan.options.local_database, "override");
        assert_eq!(plan.credentials.password(), "new-pw");
        assert_eq!(plan.credentials.host, "db.internal");
    }

    #[test]
    fn test_to_map_secrets_are_opt_in() {
        let request = SyncRequest::from_map(&complete()).unwrap();
        let public = request.to_map(false);
        assert!(public.get("apiKey").is_none());
        assert!(public.get("remoteDbPass").is_none());
        assert_eq!(public["remoteDbHost"], json!("db.internal"));

        let full = request.to_map(true);
        assert_eq!(full["apiKey"], json!("shared"));
        assert_eq!(full["remoteDbPass"], json!("pw"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let request = SyncRequest::from_map(&complete()).unwrap();
        let debug = format!("{:?}", request);
        assert!(!debug.contains("shared"));
        assert!(!debug.contains("\"pw\""));
    }
}
