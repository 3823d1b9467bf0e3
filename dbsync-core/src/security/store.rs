//! Key-value persistence for sessions, remember-me tokens and profiles.
//!
//! Values are opaque strings; callers usually store JSON via
//! [`get_json`] and [`put_json`].

use crate::error::DbSyncError;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Minimal persistence interface.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> crate::Result<Option<String>>;

    fn put(&self, key: &str, value: String) -> crate::Result<()>;

    /// Removes a key, returning whether it existed.
    fn delete(&self, key: &str) -> crate::Result<bool>;

    /// Keys starting with `prefix`, in sorted order.
    fn list(&self, prefix: &str) -> crate::Result<Vec<String>>;
}

/// Reads and deserializes a JSON value.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> crate::Result<Option<T>> {
    store
        .get(key)?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| DbSyncError::serialization(format!("Corrupt entry '{}'", key), e))
        })
        .transpose()
}

/// Serializes and stores a JSON value.
pub fn put_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> crate::Result<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| DbSyncError::serialization(format!("Failed to encode '{}'", key), e))?;
    store.put(key, raw)
}

/// In-process store, used by tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> crate::Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> crate::Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> crate::Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn list(&self, prefix: &str) -> crate::Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Store backed by a single JSON object file.
///
/// Every write rewrites the file through a temporary sibling and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> crate::Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                DbSyncError::serialization(format!("Corrupt store {}", self.path.display()), e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(DbSyncError::io(
                format!("Failed to read {}", self.path.display()),
                e,
            )),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> crate::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbSyncError::io(format!("Failed to create {}", parent.display()), e)
            })?;
        }
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| DbSyncError::serialization("Failed to encode store", e))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw)
            .map_err(|e| DbSyncError::io(format!("Failed to write {}", tmp.display()), e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| DbSyncError::io(format!("Failed to replace {}", self.path.display()), e))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> crate::Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn put(&self, key: &str, value: String) -> crate::Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);
        self.write_all(&entries)
    }

    fn delete(&self, key: &str) -> crate::Result<bool> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        let existed = entries.remove(key).is_some();
        if existed {
            self.write_all(&entries)?;
        }
        Ok(existed)
    }

    fn list(&self, prefix: &str) -> crate::Result<Vec<String>> {
        let _guard = self.lock.lock();
        Ok(self
            .read_all()?
            .into_keys()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}
