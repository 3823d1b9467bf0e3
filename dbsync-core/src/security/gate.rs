//! The access gate in front of every sync and console endpoint.
//!
//! Checks run in order and stop at the first failure:
//! 1. resolve the caller address (proxy headers, then the socket peer)
//! 2. loopback callers are allowed outright
//! 3. the address must be on the allow-list
//! 4. session endpoints need an authenticated session or a remember-me token
//! 5. machine endpoints need the shared secret (and the derived token when required)
//!
//! The outcome is an [`AuthContext`] built once per request.

use super::accounts::AccountStore;
use super::allow_list::{AllowListSource, is_loopback};
use super::credentials::SharedSecret;
use super::session::{RememberOutcome, SessionManager};
use super::token::{DEFAULT_TOKEN_INTERVAL_SECS, unix_now, verify_token_at};
use crate::error::ErrorCode;
use std::net::IpAddr;
use thiserror::Error;

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateDenial {
    #[error("Unauthorized: IP address not allowed")]
    IpNotAllowed { client: String },

    #[error("Unauthorized: Invalid API key")]
    InvalidApiKey,

    /// `clear_remember_cookie` is set when a stale remember-me cookie was presented.
    #[error("Authentication required")]
    AuthRequired { clear_remember_cookie: bool },
}

impl GateDenial {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::IpNotAllowed { .. } => ErrorCode::IpNotAuthorized,
            Self::InvalidApiKey => ErrorCode::InvalidApiKey,
            Self::AuthRequired { .. } => ErrorCode::AuthRequired,
        }
    }

    /// HTTP status used on the wire.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::IpNotAllowed { .. } => 403,
            Self::InvalidApiKey | Self::AuthRequired { .. } => 401,
        }
    }
}

/// Transport-neutral view of the request fields the gate reads.
#[derive(Clone, Default)]
pub struct GateRequest {
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub client_ip: Option<String>,
    pub peer: Option<IpAddr>,
    pub api_key: Option<String>,
    pub sync_token: Option<String>,
    pub session_id: Option<String>,
    pub remember_cookie: Option<String>,
    pub user_agent: String,
    pub accept_language: String,
}

impl std::fmt::Debug for GateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateRequest")
            .field("forwarded_for", &self.forwarded_for)
            .field("real_ip", &self.real_ip)
            .field("client_ip", &self.client_ip)
            .field("peer", &self.peer)
            .field("has_api_key", &self.api_key.is_some())
            .field("has_sync_token", &self.sync_token.is_some())
            .finish_non_exhaustive()
    }
}

impl GateRequest {
    pub fn from_peer(peer: Option<IpAddr>) -> Self {
        Self {
            peer,
            ..Self::default()
        }
    }

    /// Records a header the gate cares about. Names are matched case-insensitively.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let value = value.trim().to_string();
        match name.to_ascii_lowercase().as_str() {
            "x-forwarded-for" => self.forwarded_for = Some(value),
            "x-real-ip" => self.real_ip = Some(value),
            "client-ip" => self.client_ip = Some(value),
            "x-api-key" => self.api_key = Some(value),
            "x-sync-token" => self.sync_token = Some(value),
            "user-agent" => self.user_agent = value,
            "accept-language" => self.accept_language = value,
            _ => {}
        }
        self
    }

    /// Fills the shared secret from a body or query field when no header carried it.
    pub fn with_fallback_api_key(mut self, api_key: Option<String>) -> Self {
        if self.api_key.is_none() {
            self.api_key = api_key;
        }
        self
    }

    pub fn with_cookies(mut self, session_id: Option<String>, remember: Option<String>) -> Self {
        self.session_id = session_id;
        self.remember_cookie = remember;
        self
    }

    /// Caller address: first forwarded-for entry, then `X-Real-IP`, then
    /// `Client-IP`, then the socket peer.
    pub fn resolve_client(&self, trust_proxy_headers: bool) -> String {
        if trust_proxy_headers {
            let forwarded = self
                .forwarded_for
                .as_deref()
                .and_then(|list| list.split(',').next())
                .map(str::trim);
            let candidates = [
                forwarded,
                self.real_ip.as_deref(),
                self.client_ip.as_deref(),
            ];
            if let Some(found) = candidates.into_iter().flatten().find(|c| !c.is_empty()) {
                return found.to_string();
            }
        }
        self.peer
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Who the gate let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Local caller, no further checks
    Loopback,
    /// Presented the shared secret
    Machine,
    /// Logged-in console user
    User(String),
    /// Console without accounts
    Anonymous,
}

/// Session changes the transport must send back as cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: String,
    pub remember_cookie: String,
}

/// Request-scoped authorization result handed to handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub client: String,
    pub principal: Principal,
    pub renewed_session: Option<SessionGrant>,
}

impl AuthContext {
    fn new(client: String, principal: Principal) -> Self {
        Self {
            client,
            principal,
            renewed_session: None,
        }
    }
}

/// Gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub secret: SharedSecret,
    pub require_token: bool,
    pub token_interval_secs: u64,
    pub trust_proxy_headers: bool,
    pub allow_list: AllowListSource,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            secret: SharedSecret::default(),
            require_token: false,
            token_interval_secs: DEFAULT_TOKEN_INTERVAL_SECS,
            trust_proxy_headers: true,
            allow_list: AllowListSource::default(),
        }
    }
}

/// The access gate.
#[derive(Debug, Clone)]
pub struct AccessGate {
    config: GateConfig,
    accounts: Option<AccountStore>,
    sessions: Option<SessionManager>,
}

impl AccessGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            accounts: None,
            sessions: None,
        }
    }

    /// Enables the session checks for console endpoints.
    pub fn with_sessions(mut self, accounts: AccountStore, sessions: SessionManager) -> Self {
        self.accounts = Some(accounts);
        self.sessions = Some(sessions);
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Steps 1-3: address resolution, loopback bypass and the allow-list.
    ///
    /// Returns `Ok(true)` for loopback callers.
    fn check_network(&self, request: &GateRequest) -> Result<(String, bool), GateDenial> {
        let client = request.resolve_client(self.config.trust_proxy_headers);
        if is_loopback(&client) {
            return Ok((client, true));
        }

        let allowed = client
            .parse::<IpAddr>()
            .is_ok_and(|ip| self.config.allow_list.load().contains(ip));
        if !allowed {
            tracing::warn!("Denied request from {}: not on allow-list", client);
            return Err(GateDenial::IpNotAllowed { client });
        }
        Ok((client, false))
    }

    /// Gate for machine-to-machine sync endpoints.
    pub fn authorize_machine(&self, request: &GateRequest) -> Result<AuthContext, GateDenial> {
        let (client, loopback) = self.check_network(request)?;
        if loopback {
            return Ok(AuthContext::new(client, Principal::Loopback));
        }

        let presented = request.api_key.as_deref().unwrap_or_default();
        if !self.config.secret.matches(presented) {
            tracing::warn!("Denied request from {}: invalid API key", client);
            return Err(GateDenial::InvalidApiKey);
        }

        if self.config.require_token {
            let token = request.sync_token.as_deref().unwrap_or_default();
            if !verify_token_at(
                &self.config.secret,
                token,
                self.config.token_interval_secs,
                unix_now(),
            ) {
                tracing::warn!("Denied request from {}: stale or missing sync token", client);
                return Err(GateDenial::InvalidApiKey);
            }
        }

        Ok(AuthContext::new(client, Principal::Machine))
    }

    /// Gate for browser console endpoints.
    pub fn authorize_session(&self, request: &GateRequest) -> crate::Result<AuthContext> {
        let (client, loopback) = self.check_network(request)?;
        if loopback {
            return Ok(AuthContext::new(client, Principal::Loopback));
        }

        let (Some(accounts), Some(sessions)) = (&self.accounts, &self.sessions) else {
            return Ok(AuthContext::new(client, Principal::Anonymous));
        };
        if accounts.is_empty()? {
            return Ok(AuthContext::new(client, Principal::Anonymous));
        }

        if let Some(session_id) = request.session_id.as_deref()
            && let Some(username) = sessions.authenticated_user(session_id)?
        {
            return Ok(AuthContext::new(client, Principal::User(username)));
        }

        let Some(cookie) = request.remember_cookie.as_deref() else {
            return Err(GateDenial::AuthRequired {
                clear_remember_cookie: false,
            }
            .into());
        };

        let fingerprint =
            super::session::device_fingerprint(&request.user_agent, &request.accept_language);
        match sessions.consume_remember_token(cookie, &fingerprint)? {
            RememberOutcome::Valid { username, cookie } => {
                let session = sessions.regenerate(request.session_id.as_deref(), &username)?;
                tracing::info!("Restored session for '{}' from remember-me token", username);
                Ok(AuthContext {
                    client,
                    principal: Principal::User(username),
                    renewed_session: Some(SessionGrant {
                        session_id: session.id,
                        remember_cookie: cookie,
                    }),
                })
            }
            RememberOutcome::Invalid => Err(GateDenial::AuthRequired {
                clear_remember_cookie: true,
            }
            .into()),
        }
    }
}
