// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Layer 3: Internal module imports
use crate::util::RequestId;

/// Header marking a reply as an explicit failure envelope.
pub(crate) const FAILURE_HEADER: &str = "x-fluxor-failure";

/// A routed bus message.
///
/// Created by the sender, consumed once by each delivered handler; the body
/// is immutable from the handler's perspective. The `address` is the sole
/// routing key; `reply_address` carries the synthetic address of a pending
/// request/reply exchange; `request_id` correlates the message with the
/// logical request that produced it.
///
/// # Example
///
/// ```rust
/// use fluxor_rt::bus::Message;
/// use serde_json::json;
///
/// let msg = Message::new("payments.authorize", json!({"amount": 150}))
///     .with_header("tenant", "acme");
/// assert_eq!(msg.address, "payments.authorize");
/// assert_eq!(msg.headers.get("tenant").map(String::as_str), Some("acme"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Routing key
    pub address: String,

    /// Opaque payload
    pub body: Value,

    /// String headers travelling with the payload
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Reply address of a request/reply exchange, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_address: Option<String>,

    /// Correlation id of the logical request that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Message {
    /// Create a message bound for `address`.
    pub fn new(address: impl Into<String>, body: Value) -> Self {
        Self {
            address: address.into(),
            body,
            headers: HashMap::new(),
            reply_address: None,
            request_id: None,
        }
    }

    /// Builder method: attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Builder method: set the reply address.
    pub fn with_reply_address(mut self, address: impl Into<String>) -> Self {
        self.reply_address = Some(address.into());
        self
    }

    /// Builder method: set the correlation request id.
    pub fn with_request_id(mut self, id: &RequestId) -> Self {
        self.request_id = Some(id.as_str().to_string());
        self
    }

    /// Build the failure envelope sent by `Delivery::fail`.
    pub(crate) fn failure(address: impl Into<String>, code: i64, reason: &str) -> Self {
        Self::new(address, json!({ "code": code, "reason": reason }))
            .with_header(FAILURE_HEADER, "true")
    }

    /// True when this message is an explicit failure envelope.
    pub fn is_failure(&self) -> bool {
        self.headers.contains_key(FAILURE_HEADER)
    }

    /// Decode the failure envelope, if this message is one.
    pub fn failure_details(&self) -> Option<(i64, String)> {
        if !self.is_failure() {
            return None;
        }
        let code = self.body.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let reason = self
            .body
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown failure")
            .to_string();
        Some((code, reason))
    }
}
