//! The uniform response wrapper used by every Inspector reply.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire timestamp format (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current UTC time in wire format.
pub fn wire_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `{success, data, message, timestamp, code?}`.
///
/// When `success` is false, `data` is not a payload and `message` names the
/// cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    /// Kept as text so an unknown code from a newer peer still parses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl TransferEnvelope {
    /// Successful reply carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            message: "OK".to_string(),
            timestamp: wire_timestamp(),
            code: None,
        }
    }

    /// Failed reply. An empty message is replaced by the code text.
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.as_str().to_string()
        } else {
            message
        };
        Self {
            success: false,
            data: Value::Null,
            message,
            timestamp: wire_timestamp(),
            code: Some(code.as_str().to_string()),
        }
    }

    /// Typed code, when the peer sent one this build knows.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.code
            .as_ref()
            .and_then(|c| serde_json::from_value(Value::String(c.clone())).ok())
    }

    /// The payload of a successful reply, `None` otherwise.
    pub fn payload(&self) -> Option<&Value> {
        self.success.then_some(&self.data)
    }
}
