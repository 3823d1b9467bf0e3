//! Local console accounts with Argon2id password hashes.
//!
//! An empty account store means the console runs without a login; the gate
//! then skips the session check entirely.

use super::store::{KeyValueStore, get_json, put_json};
use crate::error::DbSyncError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Argon2id salt size: 128 bits
const ARGON2_SALT_SIZE: usize = 16;

const ACCOUNT_PREFIX: &str = "account:";

/// Stored account entry. Only the PHC hash string is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Hashes a password into a PHC string.
pub fn hash_password(password: &str) -> crate::Result<String> {
    let salt_bytes: [u8; ARGON2_SALT_SIZE] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| DbSyncError::configuration(format!("Invalid salt: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DbSyncError::configuration(format!("Password hashing failed: {}", e)))
}

/// Verifies a password against a PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, phc: &str) -> bool {
    PasswordHash::new(phc).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Console account registry on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct AccountStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore").finish_non_exhaustive()
    }
}

impl AccountStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(username: &str) -> String {
        format!("{}{}", ACCOUNT_PREFIX, username)
    }

    /// True when no account has been created.
    pub fn is_empty(&self) -> crate::Result<bool> {
        Ok(self.store.list(ACCOUNT_PREFIX)?.is_empty())
    }

    /// Creates or replaces an account.
    pub fn add_user(&self, username: &str, password: &str) -> crate::Result<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DbSyncError::missing_parameter("username"));
        }
        if password.is_empty() {
            return Err(DbSyncError::missing_parameter("password"));
        }
        let record = AccountRecord {
            username: username.to_string(),
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        };
        put_json(self.store.as_ref(), &Self::key(username), &record)?;
        tracing::info!("Stored account '{}'", username);
        Ok(())
    }

    pub fn remove_user(&self, username: &str) -> crate::Result<bool> {
        self.store.delete(&Self::key(username))
    }

    /// Checks a username/password pair.
    pub fn verify(&self, username: &str, password: &str) -> crate::Result<bool> {
        let record: Option<AccountRecord> = get_json(self.store.as_ref(), &Self::key(username))?;
        Ok(record.is_some_and(|r| verify_password(password, &r.password_hash)))
    }

    pub fn usernames(&self) -> crate::Result<Vec<String>> {
        Ok(self
            .store
            .list(ACCOUNT_PREFIX)?
            .into_iter()
            .map(|k| k.trim_start_matches(ACCOUNT_PREFIX).to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::store::MemoryStore;

    #[test]
    fn test_hash_and_verify() {
        let phc = hash_password("correct horse").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &phc));
        assert!(!verify_password("wrong", &phc));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("pw").unwrap(), hash_password("pw").unwrap());
    }

    #[test]
    fn test_account_store() {
        let accounts = AccountStore::new(Arc::new(MemoryStore::new()));
        assert!(accounts.is_empty().unwrap());

        accounts.add_user("admin", "pw").unwrap();
        assert!(!accounts.is_empty().unwrap());
        assert!(accounts.verify("admin", "pw").unwrap());
        assert!(!accounts.verify("admin", "nope").unwrap());
        assert!(!accounts.verify("ghost", "pw").unwrap());
        assert_eq!(accounts.usernames().unwrap(), vec!["admin".to_string()]);

        assert!(accounts.add_user(" ", "pw").is_err());
        assert!(accounts.add_user("x", "").is_err());
        assert!(accounts.remove_user("admin").unwrap());
        assert!(accounts.is_empty().unwrap());
    }
}
