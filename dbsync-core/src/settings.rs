//! The flat JSON settings document and the last-used sync profile.
//!
//! Settings supply defaults for sync requests and process limits. The
//! profile remembers the fields of the most recent sync so the next one can
//! be started with fewer inputs; each field expires on its own clock.

use crate::error::DbSyncError;
use crate::security::{KeyValueStore, get_json, put_json};
use crate::sync::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, SECRET_KEYS, SyncRequest};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lifetime of a remembered secret.
pub const SECRET_TTL_HOURS: i64 = 24;
/// Lifetime of any other remembered field.
pub const FIELD_TTL_DAYS: i64 = 30;

const PROFILE_KEY: &str = "profile:last_sync";

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

/// Operator settings, persisted as one flat JSON object.
///
/// Unknown keys are kept and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_db_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_db_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_db_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_db_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_db_name: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default)]
    pub use_token: bool,
    /// Seconds; 0 means unlimited
    #[serde(default)]
    pub max_execution_time: u64,
    /// `512M` style size, `-1` for unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(default = "default_true")]
    pub logging_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_db_host: None,
            remote_db_port: None,
            remote_db_user: None,
            remote_db_name: None,
            local_db_name: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            use_token: false,
            max_execution_time: 0,
            memory_limit: None,
            logging_enabled: true,
            log_file: None,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Loads settings. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(DbSyncError::io(
                    format!("Failed to read {}", path.display()),
                    e,
                ));
            }
        };
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            DbSyncError::serialization(format!("Invalid settings file {}", path.display()), e)
        })?;
        Self::from_value(value)
    }

    /// Parses and validates a settings document.
    pub fn from_value(value: Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(value)
            .map_err(|e| DbSyncError::serialization("Invalid settings document", e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(DbSyncError::configuration(format!(
                "chunkSize must be between {} and {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        if let Some(limit) = &self.memory_limit {
            parse_byte_size(limit)?;
        }
        Ok(())
    }

    /// Writes the document through a temporary file and a rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbSyncError::io(format!("Failed to create {}", parent.display()), e)
            })?;
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| DbSyncError::serialization("Failed to encode settings", e))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, raw)
            .map_err(|e| DbSyncError::io(format!("Failed to write {}", tmp.display()), e))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| DbSyncError::io(format!("Failed to replace {}", path.display()), e))
    }

    /// Request defaults taken from the settings.
    pub fn sync_defaults(&self) -> SyncRequest {
        SyncRequest {
            remote_url: self.remote_url.clone(),
            use_token: Some(self.use_token),
            remote_db_host: self.remote_db_host.clone(),
            remote_db_port: self.remote_db_port,
            remote_db_user: self.remote_db_user.clone(),
            remote_db_name: self.remote_db_name.clone(),
            local_db_name: self.local_db_name.clone(),
            chunk_size: Some(self.chunk_size),
            ..SyncRequest::default()
        }
    }

    /// Request body limit in bytes; `None` is unlimited.
    pub fn memory_limit_bytes(&self) -> Result<Option<usize>> {
        match &self.memory_limit {
            Some(limit) => parse_byte_size(limit),
            None => Ok(None),
        }
    }
}

/// Parses `512M` style sizes (`K`, `M`, `G` suffixes, powers of 1024).
/// `-1` and `0` mean unlimited.
pub fn parse_byte_size(raw: &str) -> Result<Option<usize>> {
    let trimmed = raw.trim();
    if trimmed == "-1" || trimmed == "0" {
        return Ok(None);
    }
    let invalid = || DbSyncError::configuration(format!("Invalid size '{}'", raw));
    let (digits, multiplier) = match trimmed.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&trimmed[..trimmed.len() - 1], 1usize << 10),
        Some('M') => (&trimmed[..trimmed.len() - 1], 1usize << 20),
        Some('G') => (&trimmed[..trimmed.len() - 1], 1usize << 30),
        Some(_) => (trimmed, 1),
        None => return Err(invalid()),
    };
    let amount: usize = digits.trim().parse().map_err(|_| invalid())?;
    amount.checked_mul(multiplier).map(Some).ok_or_else(invalid)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileField {
    value: Value,
    saved_at: DateTime<Utc>,
}

/// The last-used sync request with per-field expiry.
#[derive(Clone)]
pub struct SyncProfileStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for SyncProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProfileStore").finish_non_exhaustive()
    }
}

fn ttl_for(key: &str) -> Duration {
    if SECRET_KEYS.contains(&key) {
        Duration::hours(SECRET_TTL_HOURS)
    } else {
        Duration::days(FIELD_TTL_DAYS)
    }
}

impl SyncProfileStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read(&self) -> Result<Map<String, Value>> {
        Ok(get_json(self.store.as_ref(), PROFILE_KEY)?.unwrap_or_default())
    }

    /// Remembers every field present in `request`.
    pub fn save(&self, request: &SyncRequest) -> Result<()> {
        self.save_at(request, Utc::now())
    }

    pub fn save_at(&self, request: &SyncRequest, now: DateTime<Utc>) -> Result<()> {
        let mut fields = self.read()?;
        for (key, value) in request.to_map(true) {
            let field = ProfileField {
                value,
                saved_at: now,
            };
            let encoded = serde_json::to_value(&field)
                .map_err(|e| DbSyncError::serialization("Failed to encode profile field", e))?;
            fields.insert(key, encoded);
        }
        put_json(self.store.as_ref(), PROFILE_KEY, &fields)
    }

    /// The remembered request with expired fields dropped.
    pub fn load(&self) -> Result<SyncRequest> {
        self.load_at(Utc::now())
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> Result<SyncRequest> {
        let mut live = Map::new();
        for (key, raw) in self.read()? {
            let Ok(field) = serde_json::from_value::<ProfileField>(raw) else {
                tracing::warn!("Ignoring malformed profile field '{}'", key);
                continue;
            };
            if field.saved_at + ttl_for(&key) > now {
                live.insert(key, field.value);
            }
        }
        SyncRequest::from_map(&live)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.delete(PROFILE_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_settings_defaults_and_unknown_keys() {
        let settings = Settings::from_value(json!({
            "remoteUrl": "https://remote.example",
            "theme": "dark"
        }))
        .unwrap();
        assert_eq!(settings.chunk_size, 1000);
        assert!(settings.logging_enabled);
        assert_eq!(settings.extra["theme"], json!("dark"));

        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["theme"], json!("dark"));
        assert_eq!(value["remoteUrl"], json!("https://remote.example"));
    }

    #[test]
    fn test_settings_reject_bad_chunk_size() {
        let err = Settings::from_value(json!({"chunkSize": 5})).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_settings_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("settings.json");
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());

        let settings = Settings {
            chunk_size: 2500,
            local_db_name: Some("copy".to_string()),
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_parse_byte_size() {
        assert_eq!(parse_byte_size("512M").unwrap(), Some(512 * 1024 * 1024));
        assert_eq!(parse_byte_size("64k").unwrap(), Some(64 * 1024));
        assert_eq!(parse_byte_size("1G").unwrap(), Some(1 << 30));
        assert_eq!(parse_byte_size("2048").unwrap(), Some(2048));
        assert_eq!(parse_byte_size("-1").unwrap(), None);
        assert!(parse_byte_size("lots").is_err());
        assert!(parse_byte_size("").is_err());
    }

    #[test]
    fn test_sync_defaults() {
        let settings = Settings {
            remote_db_host: Some("db.internal".to_string()),
            chunk_size: 400,
            ..Settings::default()
        };
        let defaults = settings.sync_defaults();
        assert_eq!(defaults.remote_db_host.as_deref(), Some("db.internal"));
        assert_eq!(defaults.chunk_size, Some(400));
        assert!(defaults.api_key.is_none());
    }

    fn request() -> SyncRequest {
        SyncRequest::from_map(
            json!({
                "remoteUrl": "https://remote.example",
                "apiKey": "shared",
                "remoteDbPass": "pw",
                "remoteDbHost": "db.internal",
            })
            .as_object()
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_profile_secrets_expire_first() {
        let profiles = SyncProfileStore::new(Arc::new(MemoryStore::new()));
        let saved = Utc::now();
        profiles.save_at(&request(), saved).unwrap();

        let fresh = profiles.load_at(saved + Duration::hours(1)).unwrap();
        assert!(fresh.api_key.is_some());
        assert!(fresh.remote_db_pass.is_some());

        let day_later = profiles.load_at(saved + Duration::hours(25)).unwrap();
        assert!(day_later.api_key.is_none());
        assert!(day_later.remote_db_pass.is_none());
        assert_eq!(day_later.remote_db_host.as_deref(), Some("db.internal"));

        let month_later = profiles.load_at(saved + Duration::days(31)).unwrap();
        assert!(month_later.remote_url.is_none());
        assert!(month_later.remote_db_host.is_none());
    }

    #[test]
    fn test_profile_save_merges_fields() {
        let profiles = SyncProfileStore::new(Arc::new(MemoryStore::new()));
        profiles.save(&request()).unwrap();

        let update = SyncRequest {
            local_db_name: Some("copy".to_string()),
            ..SyncRequest::default()
        };
        profiles.save(&update).unwrap();

        let loaded = profiles.load().unwrap();
        assert_eq!(loaded.local_db_name.as_deref(), Some("copy"));
        assert_eq!(loaded.remote_url.as_deref(), Some("https://remote.example"));

        profiles.clear().unwrap();
        assert!(profiles.load().unwrap().remote_url.is_none());
    }
}
