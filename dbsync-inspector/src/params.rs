//! Request parameter collection.
//!
//! Parameters may arrive in the query string, a form body or a JSON body.
//! They are merged into one flat map with body values overriding query
//! values. A body that cannot be read is remembered rather than rejected so
//! the gate still runs first.

use dbsync_core::{DbSyncError, InspectRequest, Result};
use serde_json::{Map, Value};

/// Merged request parameters.
#[derive(Default)]
pub struct Parameters {
    values: Map<String, Value>,
    body_error: Option<String>,
}

impl std::fmt::Debug for Parameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameters")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("body_error", &self.body_error)
            .finish()
    }
}

fn parse_form(raw: &[u8], into: &mut Map<String, Value>) {
    for (key, value) in url::form_urlencoded::parse(raw) {
        into.insert(key.into_owned(), Value::String(value.into_owned()));
    }
}

fn is_json(content_type: Option<&str>, body: &[u8]) -> bool {
    let declared = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);
    declared || body.trim_ascii_start().first() == Some(&b'{')
}

impl Parameters {
    /// Collects parameters from the query string and the request body.
    pub fn collect(query: Option<&str>, content_type: Option<&str>, body: &[u8]) -> Self {
        let mut params = Self::from_query(query);
        if body.trim_ascii().is_empty() {
            return params;
        }

        if is_json(content_type, body) {
            match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(map)) => params.values.extend(map),
                Ok(_) => params.body_error = Some("JSON body must be an object".to_string()),
                Err(e) => params.body_error = Some(format!("Invalid JSON body: {}", e)),
            }
        } else {
            parse_form(body, &mut params.values);
        }
        params
    }

    /// Query string parameters only.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut values = Map::new();
        if let Some(query) = query {
            parse_form(query.as_bytes(), &mut values);
        }
        Self {
            values,
            body_error: None,
        }
    }

    /// Records a body that could not be read at all.
    pub fn with_body_error(mut self, message: impl Into<String>) -> Self {
        self.body_error = Some(message.into());
        self
    }

    /// The `api_key` field, used when no `X-API-Key` header was sent.
    pub fn api_key(&self) -> Option<String> {
        match self.values.get("api_key")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Parses the merged map. A broken body is reported as a parameter error.
    pub fn into_request(self) -> Result<InspectRequest> {
        if let Some(message) = self.body_error {
            tracing::debug!("Rejecting request body: {}", message);
            return Err(DbSyncError::missing_parameter("body"));
        }
        InspectRequest::from_map(&self.values)
    }
}
