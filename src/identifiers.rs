//! Type-safe identifiers.
//!
//! Newtype wrappers keep tab keys, record IDs, and subscription handles
//! from being mixed up.
//!
//! | Type | Inner | Origin |
//! |------|-------|--------|
//! | [`TabId`] | `NonZeroU32` | Host environment |
//! | [`RecordId`] | `String` | Store owner, at persistence time |
//! | [`SubscriptionId`] | `Uuid` | Broadcast bus |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// TabId
// ============================================================================

/// Opaque key for a browsing tab, stable for the tab's lifetime.
///
/// Serializes as a bare number, matching the host's tab IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(NonZeroU32);

impl TabId {
    /// Creates a tab ID. Returns `None` for zero.
    #[inline]
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TabId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u32>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| Error::protocol(format!("invalid tab id: {s:?}")))
    }
}

// ============================================================================
// RecordId
// ============================================================================

/// Unique ID of a captured record.
///
/// Base36 epoch-millisecond prefix followed by random base36 digits, so
/// IDs generated later sort after earlier ones at millisecond resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generates a new ID for a record persisted at `timestamp_ms`.
    #[must_use]
    pub fn generate(timestamp_ms: u64) -> Self {
        let random = Uuid::new_v4().as_u128() as u64;
        Self(format!("{}{}", to_base36(timestamp_ms), to_base36(random)))
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }

    let mut buf = Vec::with_capacity(13);
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Handle of a broadcast bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a new random subscription ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
