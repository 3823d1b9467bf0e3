//! Secure credential containers with automatic memory zeroing.
//!
//! Remote database credentials arrive with every Inspector request and the
//! shared secret is held for the lifetime of a process. Both live in
//! `Zeroizing` containers and neither ever appears in `Debug` output.
//!
//! # Security
//! - Memory is cleared when the container goes out of scope
//! - Passwords and secrets are never exposed in debug output or logs

use crate::error::DbSyncError;
use zeroize::Zeroizing;

/// Ad hoc database credentials supplied with a request.
///
/// # Example
///
/// ```rust
/// use dbsync_core::security::DatabaseCredentials;
///
/// let creds = DatabaseCredentials::new("db.internal", "reader", "s3cret")
///     .with_port(3307)
///     .with_database("shop");
/// assert_eq!(creds.to_safe_string(), "mysql://db.internal:3307/shop");
/// assert!(!format!("{:?}", creds).contains("s3cret"));
/// ```
#[derive(Clone)]
pub struct DatabaseCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    password: Zeroizing<String>,
    pub database: Option<String>,
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            // password intentionally omitted
            .finish_non_exhaustive()
    }
}

impl DatabaseCredentials {
    /// Default MySQL port.
    pub const DEFAULT_PORT: u16 = 3306;

    /// Creates credentials for the default port and no database.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            username: username.into(),
            password: Zeroizing::new(password.into()),
            database: None,
        }
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Password (still protected by Zeroizing while held here).
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Checks if a password is present without exposing it.
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Database name, or a `MISSING_PARAMETER` error naming `db_name`.
    pub fn require_database(&self) -> crate::Result<&str> {
        self.database
            .as_deref()
            .filter(|db| !db.is_empty())
            .ok_or_else(|| DbSyncError::missing_parameter("db_name"))
    }

    /// Connection description without username or password.
    pub fn to_safe_string(&self) -> String {
        let mut url = format!("mysql://{}:{}", self.host, self.port);
        if let Some(database) = &self.database {
            url.push('/');
            url.push_str(database);
        }
        url
    }

    /// Validates host, username and port.
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.trim().is_empty() {
            return Err(DbSyncError::missing_parameter("db_host"));
        }
        if self.username.trim().is_empty() {
            return Err(DbSyncError::missing_parameter("db_user"));
        }
        if self.port == 0 {
            return Err(DbSyncError::missing_parameter("db_port"));
        }
        Ok(())
    }
}

/// The machine-to-machine shared secret.
#[derive(Clone, Default)]
pub struct SharedSecret(Zeroizing<String>);

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(****)")
    }
}

impl SharedSecret {
    /// Wraps a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Exposes the secret for hashing or sending.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when no secret has been configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compares a presented value against the secret.
    ///
    /// An unconfigured secret never matches.
    pub fn matches(&self, presented: &str) -> bool {
        !self.is_empty() && constant_time_eq(self.0.as_bytes(), presented.as_bytes())
    }
}

/// Byte comparison whose running time does not depend on where inputs differ.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_new() {
        let creds = DatabaseCredentials::new("localhost", "testuser", "testpass");
        assert_eq!(creds.username, "testuser");
        assert_eq!(creds.port, 3306);
        assert!(creds.has_password());
        assert_eq!(creds.password(), "testpass");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = DatabaseCredentials::new("localhost", "u", "hunter2").with_database("db");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("localhost"));
    }

    #[test]
    fn test_require_database() {
        let creds = DatabaseCredentials::new("localhost", "u", "");
        assert!(matches!(
            creds.require_database(),
            Err(DbSyncError::MissingParameter { ref name }) if name == "db_name"
        ));
        let creds = creds.with_database("shop");
        assert_eq!(creds.require_database().unwrap(), "shop");
    }

    #[test]
    fn test_credentials_validate() {
        assert!(DatabaseCredentials::new("h", "u", "").validate().is_ok());
        assert!(DatabaseCredentials::new("", "u", "").validate().is_err());
        assert!(DatabaseCredentials::new("h", " ", "").validate().is_err());
        assert!(
            DatabaseCredentials::new("h", "u", "")
                .with_port(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_shared_secret_matches() {
        let secret = SharedSecret::new("abc123");
        assert!(secret.matches("abc123"));
        assert!(!secret.matches("abc124"));
        assert!(!secret.matches("abc12"));
        assert!(!SharedSecret::default().matches(""));
        assert_eq!(format!("{:?}", secret), "SharedSecret(****)");
    }
}
