//! Reply messages and typed reply payloads.
//!
//! # Format
//!
//! Success:
//! ```json
//! { "success": true, "newCount": 3 }
//! ```
//!
//! Failure:
//! ```json
//! { "success": false, "error": "Tab 7 no longer exists" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capture::CaptureRecord;
use crate::error::{Error, Result};

// ============================================================================
// Reply
// ============================================================================

/// A reply to a [`Message`](super::Message) or [`RelayCommand`](super::RelayCommand).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Whether the request took effect.
    pub success: bool,

    /// Human-readable reason (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Payload fields, flattened next to `success`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Reply {
    /// Creates an empty success reply.
    #[inline]
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            fields: Map::new(),
        }
    }

    /// Creates a success reply carrying `payload`'s fields.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] if the payload fails to serialize,
    /// [`Error::Protocol`] if it is not a mapping.
    pub fn with<T: Serialize>(payload: &T) -> Result<Self> {
        match serde_json::to_value(payload)? {
            Value::Object(fields) => Ok(Self {
                success: true,
                error: None,
                fields,
            }),
            other => Err(Error::protocol(format!(
                "reply payload must be a mapping, got {other}"
            ))),
        }
    }

    /// Creates a failure reply.
    #[inline]
    #[must_use]
    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            fields: Map::new(),
        }
    }

    /// Builds a reply from an operation result.
    #[must_use]
    pub fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|payload| Self::with(&payload)) {
            Ok(reply) => reply,
            Err(e) => Self::failure(e),
        }
    }

    /// Extracts the payload fields, returning error if the reply failed.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`] if `success` is false.
    pub fn into_result(self) -> Result<Map<String, Value>> {
        if self.success {
            Ok(self.fields)
        } else {
            Err(Error::rejected(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    /// Decodes the payload into a typed value.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`] if the reply failed, [`Error::Json`] if the
    /// payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        let fields = self.into_result()?;
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Gets a u64 value from the payload.
    ///
    /// Returns 0 if key not found or not a number.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.fields
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or_default()
    }

    /// Gets a boolean value from the payload.
    ///
    /// Returns false if key not found or not a boolean.
    #[inline]
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or_default()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// `{isListening, requestCount}` for one tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabStatus {
    /// Whether capture is on for the tab.
    pub is_listening: bool,
    /// Number of records in the tab's log.
    pub request_count: usize,
}

/// `{newCount}` returned by `storeRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCount {
    /// Log length after the append.
    pub new_count: usize,
}

/// `{data}` returned by `getStoredRequests`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredRequests {
    /// The tab's log in append order.
    pub data: Vec<CaptureRecord>,
}

/// `{title}` returned by `getTabTitle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabTitle {
    /// Current title of the tab.
    pub title: String,
}

// ============================================================================
// Tests
// ============================================================================
