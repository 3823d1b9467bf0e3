//! Browser sessions and remember-me tokens.
//!
//! Remember-me cookies have the form `selector:validator`. Only the SHA-256
//! of the validator is stored, together with a device fingerprint. Every
//! successful use rotates the validator; a mismatched validator deletes the
//! record.

use super::credentials::constant_time_eq;
use super::store::{KeyValueStore, get_json, put_json};
use super::token::{random_hex, sha256_hex};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "dbsync_session";
/// Cookie carrying the remember-me token.
pub const REMEMBER_COOKIE: &str = "dbsync_remember";
/// Remember-me lifetime.
pub const REMEMBER_ME_DAYS: i64 = 90;
/// Idle lifetime of a browser session.
pub const SESSION_IDLE_HOURS: i64 = 12;

const SESSION_PREFIX: &str = "session:";
const REMEMBER_PREFIX: &str = "remember:";

/// Binds a remember-me token to a browser.
pub fn device_fingerprint(user_agent: &str, accept_language: &str) -> String {
    sha256_hex(format!("{}{}", user_agent, accept_language))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub username: String,
    pub authenticated: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RememberRecord {
    username: String,
    validator_hash: String,
    fingerprint: String,
    expires_at: DateTime<Utc>,
}

/// Result of presenting a remember-me cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RememberOutcome {
    /// Token accepted; `cookie` is the rotated value to send back.
    Valid { username: String, cookie: String },
    /// Token unknown, expired, bound to another device or forged.
    Invalid,
}

/// Session and remember-me bookkeeping over a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    idle_timeout: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            idle_timeout: Duration::hours(SESSION_IDLE_HOURS),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Starts a fresh authenticated session.
    pub fn create_session(&self, username: &str) -> crate::Result<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            id: random_hex(32),
            username: username.to_string(),
            authenticated: true,
            created_at: now,
            last_seen: now,
        };
        put_json(
            self.store.as_ref(),
            &format!("{}{}", SESSION_PREFIX, record.id),
            &record,
        )?;
        Ok(record)
    }

    /// Replaces a session id with a new one for the same user.
    pub fn regenerate(&self, old_id: Option<&str>, username: &str) -> crate::Result<SessionRecord> {
        if let Some(old_id) = old_id {
            self.destroy_session(old_id)?;
        }
        self.create_session(username)
    }

    /// Username of a live, authenticated session. Touches `last_seen`.
    pub fn authenticated_user(&self, session_id: &str) -> crate::Result<Option<String>> {
        let key = format!("{}{}", SESSION_PREFIX, session_id);
        let Some(mut record) = get_json::<SessionRecord>(self.store.as_ref(), &key)? else {
            return Ok(None);
        };
        let now = Utc::now();
        if !record.authenticated || record.last_seen + self.idle_timeout < now {
            self.store.delete(&key)?;
            return Ok(None);
        }
        record.last_seen = now;
        put_json(self.store.as_ref(), &key, &record)?;
        Ok(Some(record.username))
    }

    pub fn destroy_session(&self, session_id: &str) -> crate::Result<()> {
        self.store
            .delete(&format!("{}{}", SESSION_PREFIX, session_id))?;
        Ok(())
    }

    /// Issues a remember-me token and returns the cookie value.
    pub fn issue_remember_token(&self, username: &str, fingerprint: &str) -> crate::Result<String> {
        let selector = random_hex(12);
        let validator = random_hex(32);
        let record = RememberRecord {
            username: username.to_string(),
            validator_hash: sha256_hex(&validator),
            fingerprint: fingerprint.to_string(),
            expires_at: Utc::now() + Duration::days(REMEMBER_ME_DAYS),
        };
        put_json(
            self.store.as_ref(),
            &format!("{}{}", REMEMBER_PREFIX, selector),
            &record,
        )?;
        Ok(format!("{}:{}", selector, validator))
    }

    /// Validates a remember-me cookie and rotates its validator on success.
    pub fn consume_remember_token(
        &self,
        cookie: &str,
        fingerprint: &str,
    ) -> crate::Result<RememberOutcome> {
        let Some((selector, validator)) = cookie.split_once(':') else {
            return Ok(RememberOutcome::Invalid);
        };
        let key = format!("{}{}", REMEMBER_PREFIX, selector);
        let Some(mut record) = get_json::<RememberRecord>(self.store.as_ref(), &key)? else {
            return Ok(RememberOutcome::Invalid);
        };

        let validator_ok = constant_time_eq(
            sha256_hex(validator).as_bytes(),
            record.validator_hash.as_bytes(),
        );
        if record.expires_at < Utc::now() || !validator_ok {
            // A wrong validator for a live selector means the token leaked.
            self.store.delete(&key)?;
            return Ok(RememberOutcome::Invalid);
        }
        if record.fingerprint != fingerprint {
            return Ok(RememberOutcome::Invalid);
        }

        let rotated = random_hex(32);
        record.validator_hash = sha256_hex(&rotated);
        put_json(self.store.as_ref(), &key, &record)?;

        Ok(RememberOutcome::Valid {
            username: record.username,
            cookie: format!("{}:{}", selector, rotated),
        })
    }

    /// Deletes the record behind a cookie value.
    pub fn revoke_remember_token(&self, cookie: &str) -> crate::Result<()> {
        if let Some((selector, _)) = cookie.split_once(':') {
            self.store
                .delete(&format!("{}{}", REMEMBER_PREFIX, selector))?;
        }
        Ok(())
    }
}
