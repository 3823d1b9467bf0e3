//! Credential protection and request authorization.
//!
//! # Module Structure
//! - `credentials`: zeroizing containers for DB credentials and the shared secret
//! - `allow_list`: IP allow-list parsing and CIDR matching
//! - `token`: time-boxed derived tokens
//! - `store`: key-value persistence used by sessions and profiles
//! - `accounts`: Argon2id console accounts
//! - `session`: browser sessions and remember-me tokens
//! - `gate`: the ordered authorization checks
//!
//! # Security Guarantees
//! - Secrets live in `Zeroizing` containers and never reach `Debug` output
//! - The allow-list is re-read on every check
//! - Remember-me validators are stored hashed and rotate on every use

mod accounts;
mod allow_list;
mod credentials;
mod gate;
mod session;
mod store;
mod token;

pub use accounts::{AccountRecord, AccountStore, hash_password, verify_password};
pub use allow_list::{AllowEntry, AllowListSource, IpAllowList, is_loopback};
pub use credentials::{DatabaseCredentials, SharedSecret};
pub use gate::{
    AccessGate, AuthContext, GateConfig, GateDenial, GateRequest, Principal, SessionGrant,
};
pub use session::{
    REMEMBER_COOKIE, REMEMBER_ME_DAYS, RememberOutcome, SESSION_COOKIE, SessionManager,
    SessionRecord, device_fingerprint,
};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, get_json, put_json};
pub use token::{
    DEFAULT_TOKEN_INTERVAL_SECS, current_token, derive_token, random_hex, sha256_hex, time_bucket,
    unix_now, verify_token_at,
};
