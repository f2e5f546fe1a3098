//! Captured exchange and record types.
//!
//! A [`CapturedExchange`] is what the interceptor emits inside the page.
//! The store owner turns it into a [`CaptureRecord`] by stamping an ID and
//! a timestamp.
//!
//! # Persisted format
//!
//! ```json
//! {
//!   "id": "lq2k8b1x3f9r0c",
//!   "url": "https://api.example.com/items?x=1",
//!   "method": "GET",
//!   "params": { "x": "1" },
//!   "response": { "ok": true },
//!   "timestamp": 1700000000000
//! }
//! ```
//!
//! Non-JSON response bodies persist as
//! `{"__isNonJson": true, "__originalText": "<raw>"}`.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::identifiers::RecordId;

// ============================================================================
// Constants
// ============================================================================

/// Marker key of the opaque-text variant.
pub const NON_JSON_KEY: &str = "__isNonJson";

/// Key carrying the raw text of the opaque-text variant.
pub const ORIGINAL_TEXT_KEY: &str = "__originalText";

// ============================================================================
// Params
// ============================================================================

/// Merged query-string and body parameters of a request.
pub type Params = Map<String, Value>;

// ============================================================================
// ResponseBody
// ============================================================================

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The body was valid JSON.
    Json(Value),

    /// The body was not JSON; carries the text verbatim.
    Opaque(String),
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::Json(Value::Null)
    }
}

impl ResponseBody {
    /// Interprets a persisted value, recognising the opaque tag.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        if let Value::Object(ref map) = value
            && map.get(NON_JSON_KEY) == Some(&Value::Bool(true))
            && let Some(Value::String(text)) = map.get(ORIGINAL_TEXT_KEY)
        {
            return Self::Opaque(text.clone());
        }
        Self::Json(value)
    }

    /// Returns `true` for the opaque-text variant.
    #[inline]
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque(_))
    }

    /// Returns the decoded JSON, if the body was JSON.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Opaque(_) => None,
        }
    }

    /// Returns the body as text.
    ///
    /// Opaque bodies return the original text unchanged; JSON bodies are
    /// re-serialized compactly.
    #[must_use]
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Self::Opaque(text) => Cow::Borrowed(text),
            Self::Json(value) => Cow::Owned(value.to_string()),
        }
    }
}

impl Serialize for ResponseBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(value) => value.serialize(serializer),
            Self::Opaque(text) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(NON_JSON_KEY, &true)?;
                map.serialize_entry(ORIGINAL_TEXT_KEY, text)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ResponseBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

// ============================================================================
// CapturedExchange
// ============================================================================

/// One observed request/response pair, as emitted by the interceptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedExchange {
    /// Request URL as the page passed it.
    pub url: String,

    /// Uppercase HTTP method.
    pub method: String,

    /// Merged query and body parameters.
    #[serde(default)]
    pub params: Params,

    /// Decoded response body.
    #[serde(default, alias = "res")]
    pub response: ResponseBody,
}

// ============================================================================
// CaptureRecord
// ============================================================================

/// A persisted capture, stamped by the store owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Unique ID within the tab's log.
    pub id: RecordId,

    /// Request URL.
    pub url: String,

    /// Uppercase HTTP method.
    pub method: String,

    /// Merged query and body parameters.
    #[serde(default)]
    pub params: Params,

    /// Decoded response body.
    #[serde(default, alias = "res")]
    pub response: ResponseBody,

    /// Persistence time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: u64,
}

impl CaptureRecord {
    /// Stamps an exchange with a fresh ID and the given timestamp.
    #[must_use]
    pub fn stamp(exchange: CapturedExchange, timestamp: u64) -> Self {
        Self {
            id: RecordId::generate(timestamp),
            url: exchange.url,
            method: exchange.method,
            params: exchange.params,
            response: exchange.response,
            timestamp,
        }
    }

    /// Stamps an exchange with a fresh ID and the current time.
    #[inline]
    #[must_use]
    pub fn stamp_now(exchange: CapturedExchange) -> Self {
        Self::stamp(exchange, epoch_millis())
    }
}

/// Current time in epoch milliseconds.
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn exchange(response: ResponseBody) -> CapturedExchange {
        CapturedExchange {
            url: "https://api.example.com/items".to_string(),
            method: "GET".to_string(),
            params: Params::new(),
            response,
        }
    }

    #[test]
    fn test_opaque_serializes_with_tag() {
        let body = ResponseBody::Opaque("<html>".to_string());
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value, json!({ "__isNonJson": true, "__originalText": "<html>" }));
    }

    #[test]
    fn test_empty_object_is_not_opaque() {
        let body: ResponseBody = serde_json::from_value(json!({})).expect("parse");
        assert_eq!(body, ResponseBody::Json(json!({})));
        assert!(!body.is_opaque());
    }

    #[test]
    fn test_tag_parses_back_to_opaque() {
        let body: ResponseBody =
            serde_json::from_value(json!({ "__isNonJson": true, "__originalText": "  raw\n" }))
                .expect("parse");
        assert_eq!(body, ResponseBody::Opaque("  raw\n".to_string()));
        assert_eq!(body.to_text(), "  raw\n");
    }

    #[test]
    fn test_record_field_names() {
        let record = CaptureRecord::stamp(exchange(ResponseBody::Json(json!({ "ok": true }))), 5);
        let value = serde_json::to_value(&record).expect("serialize");
        for key in ["id", "url", "method", "params", "response", "timestamp"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["timestamp"], 5);
    }

    #[test]
    fn test_record_accepts_legacy_res_key() {
        let value = json!({
            "id": "abc",
            "url": "/a",
            "method": "POST",
            "params": {},
            "res": { "__isNonJson": true, "__originalText": "ok" },
            "timestamp": 1
        });
        let record: CaptureRecord = serde_json::from_value(value).expect("parse");
        assert_eq!(record.response, ResponseBody::Opaque("ok".to_string()));
    }

    #[test]
    fn test_stamp_assigns_distinct_ids() {
        let a = CaptureRecord::stamp_now(exchange(ResponseBody::default()));
        let b = CaptureRecord::stamp_now(exchange(ResponseBody::default()));
        assert_ne!(a.id, b.id);
        assert!(b.timestamp >= a.timestamp);
    }
}
