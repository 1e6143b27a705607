//! Wire envelope exchanged between the control process and rendering clients
//!
//! Every relayed message is a `{ "type": <string>, "payload": <any> }` object.
//! The `type` is application-defined and the relay passes unknown values
//! through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known envelope types used by the catalogue front end
pub mod message_types {
    /// Instruct rendering clients to spawn a catalogued object
    pub const SPAWN_OBJECT: &str = "SPAWN_OBJECT";

    /// Type applied when the control process submits a payload without one
    pub const DEFAULT: &str = SPAWN_OBJECT;
}

/// Immutable `{type, payload}` unit carried over the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    payload: Value,
}

impl MessageEnvelope {
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }

    /// Build an envelope, falling back to [`message_types::DEFAULT`] when no
    /// type was supplied
    pub fn with_optional_type(message_type: Option<&str>, payload: Value) -> Self {
        Self::new(message_type.unwrap_or(message_types::DEFAULT), payload)
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consume the envelope, returning its parts
    pub fn into_parts(self) -> (String, Value) {
        (self.message_type, self.payload)
    }
}
