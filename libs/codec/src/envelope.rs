//! Envelope encoding and decoding
//!
//! Encoding emits `type` before `payload` so that the same envelope yields
//! byte-identical output no matter who encodes it. Object keys inside
//! the payload follow `serde_json`'s map ordering, which is stable for equal
//! values.

use serde_json::Value;
use types::MessageEnvelope;

use crate::error::{CodecResult, DecodeError, EncodeError};

/// Serialize an envelope into its wire text.
///
/// `MessageEnvelope` declares `type` ahead of `payload`, so serde emits them
/// in that order.
pub fn encode(envelope: &MessageEnvelope) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode raw frame bytes into an envelope
pub fn decode(bytes: &[u8]) -> CodecResult<MessageEnvelope> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })?;
    decode_text(text)
}

/// Decode frame text into an envelope.
///
/// Surrounding whitespace is ignored, a missing `payload` becomes `null`, and
/// fields other than `type` and `payload` are dropped.
pub fn decode_text(text: &str) -> CodecResult<MessageEnvelope> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|e| DecodeError::from_json(&e))?;
    let mut object = match value {
        Value::Object(map) => map,
        other => {
            return Err(DecodeError::NotAnObject {
                found: json_kind(&other),
            })
        }
    };

    let message_type = match object.remove("type") {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(DecodeError::InvalidType {
                found: json_kind(&other),
            })
        }
        None => return Err(DecodeError::MissingType),
    };
    let payload = object.remove("payload").unwrap_or(Value::Null);

    Ok(MessageEnvelope::new(message_type, payload))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_puts_type_first() {
        let envelope = MessageEnvelope::new("SPAWN_OBJECT", json!({"id": "obj-1"}));
        assert_eq!(
            encode(&envelope).unwrap(),
            r#"{"type":"SPAWN_OBJECT","payload":{"id":"obj-1"}}"#
        );
    }

    #[test]
    fn test_encode_escapes_type() {
        let envelope = MessageEnvelope::new("a\"b", Value::Null);
        assert_eq!(encode(&envelope).unwrap(), r#"{"type":"a\"b","payload":null}"#);
    }

    #[test]
    fn test_decode_tolerates_whitespace() {
        let envelope = decode(b"  \n{\"type\":\"X\",\"payload\":1}\t ").unwrap();
        assert_eq!(envelope.message_type(), "X");
        assert_eq!(envelope.payload(), &json!(1));
    }

    #[test]
    fn test_decode_missing_payload_is_null() {
        let envelope = decode_text(r#"{"type":"READY"}"#).unwrap();
        assert!(envelope.payload().is_null());
    }

    #[test]
    fn test_decode_rejects_bad_structure() {
        assert_eq!(decode_text("   "), Err(DecodeError::Empty));
        assert_eq!(
            decode_text(r#""ready""#),
            Err(DecodeError::NotAnObject { found: "string" })
        );
        assert_eq!(decode_text(r#"{"payload":1}"#), Err(DecodeError::MissingType));
        assert_eq!(
            decode_text(r#"{"type":7}"#),
            Err(DecodeError::InvalidType { found: "number" })
        );
        assert!(matches!(
            decode_text("{not json"),
            Err(DecodeError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert_eq!(
            decode(&[b'{', 0xff, b'}']),
            Err(DecodeError::InvalidUtf8 { valid_up_to: 1 })
        );
    }
}
