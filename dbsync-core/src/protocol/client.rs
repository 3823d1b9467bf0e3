//! HTTP client for a remote Inspector.
//!
//! Every call is a single attempt. Failures are classified as network,
//! protocol or application errors and handed back to the caller, which
//! decides whether the run continues.

use super::action::{InspectRequest, InspectorAction};
use super::envelope::TransferEnvelope;
use super::RemoteSource;
use crate::error::{DbSyncError, ErrorCode};
use crate::models::{NameList, ObjectDefinition, SchemaObjectKind, TablePage, TriggerDefinition, TriggerList};
use crate::security::{DEFAULT_TOKEN_INTERVAL_SECS, DatabaseCredentials, SharedSecret, current_token};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Path of the Inspector endpoint relative to the remote base URL.
pub const INSPECT_PATH: &str = "api/inspect";

/// A failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Transport or timeout failure
    #[error("Network error during {action}: {message}")]
    Network { action: String, message: String },

    /// The reply was not a well-formed envelope
    #[error("Protocol error during {action}: {message}")]
    Protocol { action: String, message: String },

    /// The remote answered `success: false`
    #[error("Remote error during {action}: {message}")]
    Application {
        action: String,
        message: String,
        timestamp: String,
        code: Option<String>,
        status: u16,
    },
}

impl TransferError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Network { .. } => ErrorCode::NetworkError,
            Self::Protocol { .. } => ErrorCode::ProtocolError,
            Self::Application { .. } => ErrorCode::ApplicationError,
        }
    }

    /// Code reported by the remote side, if any.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Self::Application { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    fn protocol(action: InspectorAction, message: impl Into<String>) -> Self {
        Self::Protocol {
            action: action.to_string(),
            message: message.into(),
        }
    }

    fn network(action: InspectorAction, error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "request timed out".to_string()
        } else {
            error.without_url().to_string()
        };
        Self::Network {
            action: action.to_string(),
            message,
        }
    }
}

/// Where and how to reach the remote Inspector.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_key: SharedSecret,
    /// Also send the time-boxed `X-Sync-Token`
    pub use_token: bool,
    pub token_interval_secs: u64,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Parses the base URL; only `http` and `https` are accepted.
    pub fn new(base_url: &str, api_key: SharedSecret) -> crate::Result<Self> {
        let base_url = Url::parse(base_url.trim()).map_err(|e| {
            DbSyncError::configuration(format!("Invalid remote URL: {}", e))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(DbSyncError::configuration(
                "Remote URL must use http:// or https://",
            ));
        }
        if api_key.is_empty() {
            return Err(DbSyncError::missing_parameter("apiKey"));
        }
        Ok(Self {
            base_url,
            api_key,
            use_token: false,
            token_interval_secs: DEFAULT_TOKEN_INTERVAL_SECS,
            timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_token(mut self, use_token: bool) -> Self {
        self.use_token = use_token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full Inspector URL. A base that already ends in the endpoint path is kept.
    pub fn endpoint(&self) -> crate::Result<Url> {
        let trimmed = self.base_url.as_str().trim_end_matches('/');
        if trimmed.ends_with(INSPECT_PATH) {
            return Ok(self.base_url.clone());
        }
        Url::parse(&format!("{}/{}", trimmed, INSPECT_PATH))
            .map_err(|e| DbSyncError::configuration(format!("Invalid remote URL: {}", e)))
    }
}

/// Client bound to one remote Inspector and one remote database.
#[derive(Debug, Clone)]
pub struct TransferClient {
    http: reqwest::Client,
    endpoint: Url,
    config: ClientConfig,
    credentials: DatabaseCredentials,
}

impl TransferClient {
    pub fn new(config: ClientConfig, credentials: DatabaseCredentials) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DbSyncError::configuration(format!("Failed to build HTTP client: {}", e)))?;
        let endpoint = config.endpoint()?;
        Ok(Self {
            http,
            endpoint,
            config,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends one action and returns the envelope's `data` on success.
    pub async fn call(
        &self,
        action: InspectorAction,
        request: InspectRequest,
    ) -> Result<Value, TransferError> {
        let mut body = request.with_credentials(&self.credentials).to_map();
        body.insert("action".to_string(), Value::String(action.to_string()));

        let mut builder = self
            .http
            .post(self.endpoint.clone())
            .header("X-API-Key", self.config.api_key.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body);
        if self.config.use_token {
            builder = builder.header(
                "X-Sync-Token",
                current_token(&self.config.api_key, self.config.token_interval_secs),
            );
        }

        tracing::debug!("Calling remote {} at {}", action, self.endpoint);
        let response = builder
            .send()
            .await
            .map_err(|e| TransferError::network(action, e))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransferError::network(action, e))?;

        let envelope: TransferEnvelope = serde_json::from_str(&text).map_err(|e| {
            TransferError::protocol(action, format!("HTTP {} with invalid envelope: {}", status, e))
        })?;

        if !envelope.success {
            if envelope.message.trim().is_empty() {
                return Err(TransferError::protocol(
                    action,
                    format!("HTTP {} failure envelope without a message", status),
                ));
            }
            return Err(TransferError::Application {
                action: action.to_string(),
                message: envelope.message,
                timestamp: envelope.timestamp,
                code: envelope.code,
                status,
            });
        }

        Ok(envelope.data)
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        action: InspectorAction,
        request: InspectRequest,
    ) -> Result<T, TransferError> {
        let data = self.call(action, request).await?;
        serde_json::from_value(data).map_err(|e| {
            TransferError::protocol(action, format!("unexpected payload shape: {}", e))
        })
    }

    /// Database names visible to the remote account.
    pub async fn list_databases(&self) -> Result<Vec<String>, TransferError> {
        let action = InspectorAction::ListDatabases;
        let list: NameList = self
            .call_typed(action, InspectRequest::for_action(action))
            .await?;
        Ok(list.names)
    }
}

#[async_trait]
impl RemoteSource for TransferClient {
    async fn list_objects(&self, kind: SchemaObjectKind) -> Result<Vec<String>, TransferError> {
        let action = InspectorAction::list_for(kind);
        if kind == SchemaObjectKind::Trigger {
            let triggers = self.list_triggers().await?;
            return Ok(triggers.into_iter().map(|t| t.trigger).collect());
        }
        let list: NameList = self
            .call_typed(action, InspectRequest::for_action(action))
            .await?;
        Ok(list.names)
    }

    async fn object_definition(
        &self,
        kind: SchemaObjectKind,
        name: &str,
    ) -> Result<String, TransferError> {
        let Some(action) = InspectorAction::structure_for(kind) else {
            return Err(TransferError::protocol(
                InspectorAction::GetTriggers,
                "triggers have no structure action",
            ));
        };
        let definition: ObjectDefinition = self
            .call_typed(action, InspectRequest::for_action(action).with_object(name))
            .await?;
        Ok(definition.create_statement)
    }

    async fn table_page(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<TablePage, TransferError> {
        let action = InspectorAction::GetTableData;
        self.call_typed(
            action,
            InspectRequest::for_action(action)
                .with_object(table)
                .with_page(offset, limit),
        )
        .await
    }

    async fn list_triggers(&self) -> Result<Vec<TriggerDefinition>, TransferError> {
        let action = InspectorAction::GetTriggers;
        let list: TriggerList = self
            .call_typed(action, InspectRequest::for_action(action))
            .await?;
        Ok(list.triggers)
    }
}
