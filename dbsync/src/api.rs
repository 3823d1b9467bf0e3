//! Local HTTP API of the agent.
//!
//! Login and logout only pass the network checks of the gate. Every other
//! route sits behind [`require_session`], which runs the full session gate,
//! renews cookies restored from a remember-me token and hands the
//! [`AuthContext`] to the handler as a request extension.

use crate::service::SyncService;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use dbsync_core::security::{
    AccessGate, AccountStore, AuthContext, GateDenial, GateRequest, Principal, REMEMBER_COOKIE,
    SESSION_COOKIE, SessionGrant, SessionManager, device_fingerprint,
};
use dbsync_core::{DbSyncError, ErrorCode, SyncRequest, TransferEnvelope};
use serde_json::{Map, Value, json};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Error returned by API handlers, rendered as a failure envelope.
#[derive(Debug)]
pub struct ApiError(DbSyncError);

impl From<DbSyncError> for ApiError {
    fn from(error: DbSyncError) -> Self {
        Self(error)
    }
}

impl From<GateDenial> for ApiError {
    fn from(denial: GateDenial) -> Self {
        Self(denial.into())
    }
}

/// HTTP status for an error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::MissingParameter | ErrorCode::ConfigurationError => StatusCode::BAD_REQUEST,
        ErrorCode::AuthRequired | ErrorCode::InvalidApiKey => StatusCode::UNAUTHORIZED,
        ErrorCode::IpNotAuthorized => StatusCode::FORBIDDEN,
        ErrorCode::ObjectNotFound => StatusCode::NOT_FOUND,
        ErrorCode::SyncInProgress => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn envelope(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    (status, Json(TransferEnvelope::failure(code, message))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);
        if status.is_server_error() {
            tracing::error!("Agent request failed: {}", self.0);
        } else {
            tracing::debug!("Agent request rejected: {}", self.0);
        }
        envelope(status, code, self.0.to_string())
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Shared handler state.
#[derive(Clone)]
pub struct AgentState {
    service: Arc<SyncService>,
    gate: Arc<AccessGate>,
    accounts: AccountStore,
    sessions: SessionManager,
    body_limit: Option<usize>,
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentState")
            .field("service", &self.service)
            .field("gate", &self.gate)
            .field("body_limit", &self.body_limit)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl AgentState {
    /// `gate` gets the session checks wired to `accounts` and `sessions`.
    pub fn new(
        service: Arc<SyncService>,
        gate: AccessGate,
        accounts: AccountStore,
        sessions: SessionManager,
    ) -> Self {
        Self {
            service,
            gate: Arc::new(gate.with_sessions(accounts.clone(), sessions.clone())),
            accounts,
            sessions,
            body_limit: None,
            request_timeout: None,
        }
    }

    /// Request body cap in bytes; `None` is unlimited.
    pub fn with_body_limit(mut self, limit: Option<usize>) -> Self {
        self.body_limit = limit;
        self
    }

    /// Whole-request limit; zero or `None` is unlimited. The inline
    /// `POST /api/sync` is exempt and runs to completion.
    pub fn with_request_timeout(mut self, limit: Option<Duration>) -> Self {
        self.request_timeout = limit.filter(|d| !d.is_zero());
        self
    }

    pub fn service(&self) -> &Arc<SyncService> {
        &self.service
    }
}

fn gate_request(headers: &HeaderMap, peer: Option<IpAddr>, jar: &CookieJar) -> GateRequest {
    headers
        .iter()
        .fold(GateRequest::from_peer(peer), |request, (name, value)| {
            match value.to_str() {
                Ok(value) => request.with_header(name.as_str(), value),
                Err(_) => request,
            }
        })
        .with_cookies(
            jar.get(SESSION_COOKIE).map(|c| c.value().to_string()),
            jar.get(REMEMBER_COOKIE).map(|c| c.value().to_string()),
        )
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn remember_cookie(value: String) -> Cookie<'static> {
    Cookie::build((REMEMBER_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .permanent()
        .build()
}

fn expired(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

fn renew(jar: CookieJar, grant: &SessionGrant) -> CookieJar {
    jar.add(session_cookie(grant.session_id.clone()))
        .add(remember_cookie(grant.remember_cookie.clone()))
}

/// Session gate for console routes.
pub async fn require_session(
    State(state): State<AgentState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr.ip());
    let gate_request = gate_request(request.headers(), peer, &jar);
    match state.gate.authorize_session(&gate_request) {
        Ok(auth) => {
            let jar = match &auth.renewed_session {
                Some(grant) => renew(jar, grant),
                None => jar,
            };
            request.extensions_mut().insert(auth);
            let response = next.run(request).await;
            (jar, response).into_response()
        }
        Err(DbSyncError::Denied(GateDenial::AuthRequired {
            clear_remember_cookie: true,
        })) => {
            let denial = GateDenial::AuthRequired {
                clear_remember_cookie: true,
            };
            (jar.remove(expired(REMEMBER_COOKIE)), ApiError::from(denial)).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Network part of the gate for the login routes. Cookies are left out so
/// a remember-me token is not consumed here.
fn check_network(state: &AgentState, request: &GateRequest) -> ApiResult<()> {
    let request = request.clone().with_cookies(None, None);
    match state.gate.authorize_session(&request) {
        Ok(_) | Err(DbSyncError::Denied(GateDenial::AuthRequired { .. })) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Decodes a JSON or urlencoded body into a flat map.
fn body_map(headers: &HeaderMap, body: &[u8]) -> ApiResult<Map<String, Value>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let trimmed = body.trim_ascii();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }
    if content_type.contains("json") || trimmed.starts_with(b"{") {
        return match serde_json::from_slice(trimmed) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(DbSyncError::missing_parameter("body").into()),
        };
    }
    Ok(url::form_urlencoded::parse(trimmed)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect())
}

fn sync_request(headers: &HeaderMap, body: &[u8]) -> ApiResult<SyncRequest> {
    Ok(SyncRequest::from_map(&body_map(headers, body)?)?)
}

fn who(auth: &AuthContext) -> String {
    match &auth.principal {
        Principal::User(name) => format!("{} ({})", name, auth.client),
        _ => auth.client.clone(),
    }
}

struct LoginForm {
    username: String,
    password: String,
    remember: bool,
}

impl LoginForm {
    fn from_map(map: &Map<String, Value>) -> ApiResult<Self> {
        let text = |key: &str| match map.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(ApiError(DbSyncError::missing_parameter(key))),
        };
        let remember = match map.get("remember") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "on" | "yes"),
            _ => false,
        };
        Ok(Self {
            username: text("username")?,
            password: text("password")?,
            remember,
        })
    }
}

async fn login(
    State(state): State<AgentState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let peer = peer.map(|ConnectInfo(addr)| addr.ip());
    let gate_request = gate_request(&headers, peer, &jar);
    check_network(&state, &gate_request)?;

    let form = LoginForm::from_map(&body_map(&headers, &body)?)?;
    if !state.accounts.verify(&form.username, &form.password)? {
        tracing::warn!("Failed login for '{}' from {}", form.username, peer_label(peer));
        return Err(GateDenial::AuthRequired {
            clear_remember_cookie: false,
        }
        .into());
    }

    let session = state
        .sessions
        .regenerate(gate_request.session_id.as_deref(), &form.username)?;
    let mut jar = jar.add(session_cookie(session.id));
    if form.remember {
        let fingerprint =
            device_fingerprint(&gate_request.user_agent, &gate_request.accept_language);
        let token = state
            .sessions
            .issue_remember_token(&form.username, &fingerprint)?;
        jar = jar.add(remember_cookie(token));
    }
    tracing::info!("'{}' logged in from {}", form.username, peer_label(peer));
    Ok((
        jar,
        Json(TransferEnvelope::ok(json!({ "username": form.username }))),
    )
        .into_response())
}

fn peer_label(peer: Option<IpAddr>) -> String {
    peer.map_or_else(|| "unknown".to_string(), |ip| ip.to_string())
}

async fn logout(
    State(state): State<AgentState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let peer = peer.map(|ConnectInfo(addr)| addr.ip());
    let gate_request = gate_request(&headers, peer, &jar);
    check_network(&state, &gate_request)?;

    if let Some(session_id) = &gate_request.session_id {
        state.sessions.destroy_session(session_id)?;
    }
    if let Some(cookie) = &gate_request.remember_cookie {
        state.sessions.revoke_remember_token(cookie)?;
    }
    let jar = jar
        .remove(expired(SESSION_COOKIE))
        .remove(expired(REMEMBER_COOKIE));
    Ok((jar, Json(TransferEnvelope::ok(Value::Null))).into_response())
}

async fn sync(
    State(state): State<AgentState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let request = sync_request(&headers, &body)?;
    tracing::info!("Sync requested by {}", who(&auth));
    let report = state.service.run(request).await?;
    Ok(Json(report).into_response())
}

async fn start_job(
    State(state): State<AgentState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let request = sync_request(&headers, &body)?;
    let id = state.service.start_job(request)?;
    tracing::info!("Sync job {} requested by {}", id, who(&auth));
    Ok((StatusCode::ACCEPTED, Json(json!({ "id": id }))).into_response())
}

async fn list_jobs(State(state): State<AgentState>) -> Response {
    Json(state.service.jobs().list()).into_response()
}

fn unknown_job(id: Uuid) -> Response {
    envelope(
        StatusCode::NOT_FOUND,
        ErrorCode::ObjectNotFound,
        format!("Sync job {} not found", id),
    )
}

async fn job_status(State(state): State<AgentState>, Path(id): Path<Uuid>) -> Response {
    match state.service.jobs().status(id) {
        Some(status) => Json(status).into_response(),
        None => unknown_job(id),
    }
}

async fn cancel_job(State(state): State<AgentState>, Path(id): Path<Uuid>) -> Response {
    if !state.service.jobs().cancel(id) {
        return unknown_job(id);
    }
    (StatusCode::ACCEPTED, Json(json!({ "id": id, "cancelRequested": true }))).into_response()
}

async fn get_settings(State(state): State<AgentState>) -> Response {
    Json(state.service.settings()).into_response()
}

async fn put_settings(
    State(state): State<AgentState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let document = body_map(&headers, &body)?;
    let settings = state.service.update_settings(Value::Object(document))?;
    tracing::info!("Settings changed by {}", who(&auth));
    Ok(Json(settings).into_response())
}

async fn get_profile(State(state): State<AgentState>) -> ApiResult<Response> {
    Ok(Json(state.service.profile()?).into_response())
}

async fn clear_profile(State(state): State<AgentState>) -> ApiResult<Response> {
    state.service.clear_profile()?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn unknown_route() -> Response {
    envelope(
        StatusCode::NOT_FOUND,
        ErrorCode::MissingParameter,
        "Unknown endpoint",
    )
}

/// Builds the agent router.
pub fn router(state: AgentState) -> Router {
    let session = || middleware::from_fn_with_state(state.clone(), require_session);

    let mut bounded = Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .merge(
            Router::new()
                .route("/api/sync/jobs", post(start_job).get(list_jobs))
                .route("/api/sync/jobs/:id", get(job_status))
                .route("/api/sync/jobs/:id/cancel", post(cancel_job))
                .route("/api/settings", get(get_settings).put(put_settings))
                .route("/api/profile", get(get_profile).delete(clear_profile))
                .route_layer(session()),
        );
    if let Some(limit) = state.request_timeout {
        bounded = bounded.layer(TimeoutLayer::new(limit));
    }

    // The inline run answers only when the whole sync is over
    let inline = Router::new()
        .route("/api/sync", post(sync))
        .route_layer(session());

    let body_limit = match state.body_limit {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .merge(bounded)
        .merge(inline)
        .fallback(unknown_route)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down agent API");
}

/// Binds `listen` and serves until Ctrl-C. Running background jobs are
/// dropped with the runtime.
pub async fn serve(listen: SocketAddr, state: AgentState) -> dbsync_core::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| DbSyncError::io(format!("Failed to bind {}", listen), e))?;
    tracing::info!("Agent API listening on {}", listen);

    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DbSyncError::io("Agent API server failed", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ErrorCode::MissingParameter, 400),
            (ErrorCode::ConfigurationError, 400),
            (ErrorCode::AuthRequired, 401),
            (ErrorCode::IpNotAuthorized, 403),
            (ErrorCode::SyncInProgress, 409),
            (ErrorCode::NetworkError, 500),
        ];
        for (code, status) in cases {
            assert_eq!(status_for(code).as_u16(), status, "code {}", code);
        }
    }

    #[test]
    fn test_body_map_formats() {
        let mut json_headers = HeaderMap::new();
        json_headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let map = body_map(&json_headers, br#"{"localDbName": "shop_copy"}"#).unwrap();
        assert_eq!(map["localDbName"], json!("shop_copy"));

        let map = body_map(&HeaderMap::new(), b"localDbName=shop_copy&chunkSize=500").unwrap();
        assert_eq!(map["chunkSize"], json!("500"));

        assert!(body_map(&HeaderMap::new(), b"  ").unwrap().is_empty());
        assert!(body_map(&json_headers, b"[1, 2]").is_err());
    }

    #[test]
    fn test_gate_request_reads_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "abc"));
        let request = gate_request(&headers, None, &jar);
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert!(request.remember_cookie.is_none());
        assert_eq!(request.forwarded_for.as_deref(), Some("203.0.113.9"));
    }
}
