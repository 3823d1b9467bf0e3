//! HTTP surface of the Inspector.
//!
//! One route, `GET|POST /api/inspect`. The handler runs the gate, validates
//! the parameters, opens a fresh read-only connection with the request's
//! credentials, dispatches the action and closes the connection again.
//! Every outcome, including unknown routes, is a JSON envelope.

use crate::dispatch::{dispatch, prepare};
use crate::params::Parameters;
use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use dbsync_core::security::{AccessGate, AllowListSource, GateConfig, GateRequest};
use dbsync_core::{DbSyncError, ErrorCode, InspectorConnector, Result, TransferEnvelope};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Route served by the Inspector.
pub const INSPECT_ROUTE: &str = "/api/inspect";

/// Everything needed to start an Inspector.
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub listen: SocketAddr,
    pub gate: GateConfig,
    /// Per-request limit; `None` is unlimited
    pub max_execution_time: Option<Duration>,
    /// Request body cap in bytes; `None` is unlimited
    pub body_limit: Option<usize>,
}

/// Shared handler state.
#[derive(Clone)]
pub struct InspectorState {
    gate: Arc<AccessGate>,
    connector: Arc<dyn InspectorConnector>,
    max_execution_time: Option<Duration>,
    body_limit: usize,
}

impl std::fmt::Debug for InspectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectorState")
            .field("gate", &self.gate)
            .field("max_execution_time", &self.max_execution_time)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

impl InspectorState {
    pub fn new(gate: AccessGate, connector: Arc<dyn InspectorConnector>) -> Self {
        Self {
            gate: Arc::new(gate),
            connector,
            max_execution_time: None,
            body_limit: usize::MAX,
        }
    }

    /// Builds the state from a full configuration.
    pub fn from_config(config: &InspectorConfig, connector: Arc<dyn InspectorConnector>) -> Self {
        Self::new(AccessGate::new(config.gate.clone()), connector)
            .with_max_execution_time(config.max_execution_time)
            .with_body_limit(config.body_limit)
    }

    pub fn with_max_execution_time(mut self, limit: Option<Duration>) -> Self {
        self.max_execution_time = limit.filter(|d| !d.is_zero());
        self
    }

    pub fn with_body_limit(mut self, limit: Option<usize>) -> Self {
        self.body_limit = limit.unwrap_or(usize::MAX);
        self
    }
}

/// HTTP status for an error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::MissingParameter => StatusCode::BAD_REQUEST,
        ErrorCode::ObjectNotFound => StatusCode::NOT_FOUND,
        ErrorCode::IpNotAuthorized => StatusCode::FORBIDDEN,
        ErrorCode::InvalidApiKey | ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: &DbSyncError) -> Response {
    let code = error.code();
    let status = status_for(code);
    if status.is_server_error() {
        tracing::error!("Inspector request failed: {}", error);
    } else {
        tracing::debug!("Inspector request rejected: {}", error);
    }
    (status, Json(TransferEnvelope::failure(code, error.to_string()))).into_response()
}

fn gate_request(headers: &HeaderMap, peer: Option<IpAddr>) -> GateRequest {
    headers
        .iter()
        .fold(GateRequest::from_peer(peer), |request, (name, value)| {
            match value.to_str() {
                Ok(value) => request.with_header(name.as_str(), value),
                Err(_) => request,
            }
        })
}

async fn handle(
    state: &InspectorState,
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    query: Option<&str>,
    body: Body,
) -> Result<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let params = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => Parameters::collect(query, content_type, &bytes),
        Err(e) => Parameters::from_query(query).with_body_error(e.to_string()),
    };

    let gate_request = gate_request(headers, peer).with_fallback_api_key(params.api_key());
    let auth = state.gate.authorize_machine(&gate_request)?;

    let request = params.into_request()?;
    let (action, credentials) = prepare(&request)?;
    tracing::info!(
        "{} from {} against {}",
        action,
        auth.client,
        credentials.to_safe_string()
    );

    let inspector = state.connector.connect(&credentials).await?;
    let result = match state.max_execution_time {
        Some(limit) => tokio::time::timeout(limit, dispatch(inspector.as_ref(), action, &request))
            .await
            .unwrap_or_else(|elapsed| {
                Err(DbSyncError::query_failed(
                    format!(
                        "{} exceeded the maximum execution time of {}s",
                        action,
                        limit.as_secs()
                    ),
                    elapsed,
                ))
            }),
        None => dispatch(inspector.as_ref(), action, &request).await,
    };
    inspector.close().await;
    result
}

async fn inspect(
    State(state): State<InspectorState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Body,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr.ip());
    match handle(&state, peer, &headers, query.as_deref(), body).await {
        Ok(data) => Json(TransferEnvelope::ok(data)).into_response(),
        Err(e) => failure(&e),
    }
}

async fn unknown_route() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(TransferEnvelope::failure(
            ErrorCode::MissingParameter,
            format!("Unknown endpoint, use {}", INSPECT_ROUTE),
        )),
    )
        .into_response()
}

/// Builds the Inspector router.
///
/// CORS allows any origin; the shared secret is the boundary.
pub fn router(state: InspectorState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route(INSPECT_ROUTE, get(inspect).post(inspect))
        .fallback(unknown_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down Inspector");
}

/// Binds `config.listen` and serves until Ctrl-C.
pub async fn serve(config: InspectorConfig, connector: Arc<dyn InspectorConnector>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .map_err(|e| DbSyncError::io(format!("Failed to bind {}", config.listen), e))?;
    tracing::info!(
        "Inspector listening on {} ({} allow-list, token {})",
        config.listen,
        match &config.gate.allow_list {
            AllowListSource::File(_) => "file",
            AllowListSource::Static(_) => "static",
        },
        if config.gate.require_token { "required" } else { "optional" }
    );

    let app = router(InspectorState::from_config(&config, connector));
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DbSyncError::io("Inspector server failed", e))
}
