//! In-flight message abstraction.
//!
//! The hosting pipeline owns the real message. Mediation only needs a
//! carrier-level header store, message-scoped properties, the host message id
//! and the body that expressions are evaluated against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::PropertyError;

/// Message passing through a mediation point.
pub trait InboundMessage {
    /// Host-assigned unique message identifier.
    fn message_id(&self) -> &str;

    /// Read a carrier-level header.
    fn header(&self, key: &str) -> Result<Option<String>, PropertyError>;

    /// Write a carrier-level header, replacing any previous value.
    fn set_header(&mut self, key: &str, value: String);

    /// Drop a carrier-level header of any type.
    fn remove_header(&mut self, key: &str);

    /// Read a message-scoped property of any type.
    fn property(&self, key: &str) -> Option<&JsonValue>;

    /// Message body expressions are evaluated against.
    fn body(&self) -> Option<&JsonValue>;

    /// Read a property that is expected to hold a string.
    ///
    /// Values of any other type are reported as a type mismatch.
    fn property_str(&self, key: &str) -> Result<Option<String>, PropertyError> {
        match self.property(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(PropertyError {
                key: key.to_string(),
                actual: json_type_name(other),
            }),
        }
    }
}

/// Render any property value as text, strings without quotes.
pub fn property_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Message envelope used when the host hands messages over as JSON.
///
/// Header values are kept as JSON so that hosts storing non-string values in
/// the header map surface as type mismatches rather than silently coercing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    /// Unique message ID for tracking
    #[serde(default = "new_message_id")]
    pub id: String,

    /// Carrier-level headers
    #[serde(default)]
    pub headers: HashMap<String, JsonValue>,

    /// Message-scoped properties
    #[serde(default)]
    pub properties: HashMap<String, JsonValue>,

    /// Parsed message body
    #[serde(default)]
    pub body: Option<JsonValue>,
}

fn new_message_id() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

impl EnvelopeMessage {
    /// Create a new envelope around a body with a fresh message id.
    pub fn new(body: JsonValue) -> Self {
        Self {
            id: new_message_id(),
            headers: HashMap::new(),
            properties: HashMap::new(),
            body: Some(body),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Parse an envelope from its JSON representation.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl InboundMessage for EnvelopeMessage {
    fn message_id(&self) -> &str {
        &self.id
    }

    fn header(&self, key: &str) -> Result<Option<String>, PropertyError> {
        match self.headers.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(PropertyError {
                key: key.to_string(),
                actual: json_type_name(other),
            }),
        }
    }

    fn set_header(&mut self, key: &str, value: String) {
        self.headers.insert(key.to_string(), JsonValue::String(value));
    }

    fn remove_header(&mut self, key: &str) {
        self.headers.remove(key);
    }

    fn property(&self, key: &str) -> Option<&JsonValue> {
        self.properties.get(key)
    }

    fn body(&self) -> Option<&JsonValue> {
        self.body.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_envelope_has_unique_id() {
        let a = EnvelopeMessage::new(json!({}));
        let b = EnvelopeMessage::new(json!({}));

        assert!(a.message_id().starts_with("urn:uuid:"));
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn test_header_type_mismatch() {
        let msg = EnvelopeMessage::new(json!({}))
            .with_header("text", "value")
            .with_header("number", 7);

        assert_eq!(msg.header("text").unwrap(), Some("value".to_string()));
        assert_eq!(msg.header("missing").unwrap(), None);

        let err = msg.header("number").unwrap_err();
        assert_eq!(err.key, "number");
        assert_eq!(err.actual, "number");
    }

    #[test]
    fn test_remove_header() {
        let mut msg = EnvelopeMessage::new(json!({})).with_header("number", 7);

        msg.remove_header("number");
        msg.remove_header("missing");

        assert!(msg.headers.is_empty());
        assert_eq!(msg.header("number").unwrap(), None);
    }

    #[test]
    fn test_property_str() {
        let msg = EnvelopeMessage::new(json!({}))
            .with_property("name", "abc")
            .with_property("flag", true);

        assert_eq!(msg.property_str("name").unwrap(), Some("abc".to_string()));
        assert!(msg.property_str("flag").is_err());
        assert_eq!(msg.property_str("missing").unwrap(), None);
    }

    #[test]
    fn test_from_json_defaults() {
        let msg = EnvelopeMessage::from_json_str(r#"{"body": {"a": 1}}"#).unwrap();

        assert!(!msg.message_id().is_empty());
        assert!(msg.headers.is_empty());
        assert_eq!(msg.body(), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_property_text() {
        assert_eq!(property_text(&json!("E100")), "E100");
        assert_eq!(property_text(&json!(500)), "500");
    }
}
