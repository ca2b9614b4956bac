//! JSON wire format for the control socket.
//!
//! Outbound, one text frame per request:
//! ```text
//! { "id": "<request-id>", "sessionid": "<sid>", "category": "...",
//!   "payload": { "module": "...", "action": "...", ... }, ...extra }
//! ```
//!
//! Inbound, one text frame per partial snapshot update. Any JSON object is
//! accepted and deep-merged; acknowledgments arrive as `activity` entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category reserved for the open handshake / keepalive.
pub const PING_CATEGORY: &str = "ping";

/// Outbound request envelope.
///
/// `id` and `sessionid` are stamped by the send path; callers set the
/// category, an optional payload and any extra top-level fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub sessionid: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            sessionid: String::new(),
            category: category.into(),
            payload: None,
            extra: Map::new(),
        }
    }

    /// Handshake request sent on every successful open.
    pub fn ping() -> Self {
        Self::new(PING_CATEGORY)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Add a caller-defined top-level field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn is_ping(&self) -> bool {
        self.category == PING_CATEGORY
    }

    /// Stamp the request id and session id.
    pub fn stamp(&mut self, id: impl Into<String>, sessionid: impl Into<String>) {
        self.id = id.into();
        self.sessionid = sessionid.into();
    }

    /// Payload used for logging; pings never carry one.
    pub fn logged_payload(&self) -> Option<&Value> {
        if self.is_ping() {
            None
        } else {
            self.payload.as_ref()
        }
    }

    /// Log prefix `id:category[:module:action]`.
    pub fn log_prefix(&self) -> String {
        let mut prefix = format!("{}:{}", self.id, self.category);
        if let Some(payload) = self.logged_payload() {
            let field = |name: &str| payload.get(name).and_then(Value::as_str).unwrap_or("-");
            prefix.push(':');
            prefix.push_str(field("module"));
            prefix.push(':');
            prefix.push_str(field("action"));
        }
        prefix
    }

    /// Serialize to a single JSON text frame.
    pub fn encode(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse an inbound text frame into a partial snapshot update.
///
/// Only JSON objects are accepted; anything else is a malformed frame.
pub fn parse_frame(text: &str) -> Result<Value, ClientError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ClientError::MalformedFrame(e.to_string()))?;
    if !value.is_object() {
        return Err(ClientError::MalformedFrame(format!(
            "expected a JSON object, got {}",
            kind_of(&value)
        )));
    }
    Ok(value)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not connected to websocket")]
    NotConnected,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("Client already running")]
    AlreadyRunning,
}
