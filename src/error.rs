//! Error types for the capture pipeline.
//!
//! This module defines the error type shared by every context of the
//! pipeline (relay, store owner, observers). Page network failures are a
//! separate type, [`NetworkError`](crate::page::NetworkError), because they
//! belong to the page and must pass through the interceptor untouched.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use xhr_monitor::{Result, TabId};
//!
//! async fn example(inspector: &Inspector, tab_id: TabId) -> Result<()> {
//!     inspector.start_listening(tab_id).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Target | [`Error::TargetUnresolvable`], [`Error::TabGone`], [`Error::TabUnreachable`] |
//! | Protocol | [`Error::UnknownAction`], [`Error::Rejected`], [`Error::Protocol`] |
//! | Delivery | [`Error::NoReceiver`], [`Error::ChannelClosed`] |
//! | Storage | [`Error::Storage`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::TabId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when monitor options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Target Errors
    // ========================================================================
    /// No tab could be determined for a command.
    ///
    /// The message carried no `tabId` and the sender is not a tab.
    #[error("Unable to determine the target tab")]
    TargetUnresolvable,

    /// The addressed tab no longer exists.
    #[error("Tab {tab_id} no longer exists")]
    TabGone {
        /// The closed tab.
        tab_id: TabId,
    },

    /// The tab exists but has no relay listening.
    ///
    /// Usually the page was loaded before the monitor; reloading it
    /// installs a relay.
    #[error("Tab {tab_id} is not reachable, reload the page before retrying")]
    TabUnreachable {
        /// The unreachable tab.
        tab_id: TabId,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Unknown message action.
    #[error("Unknown action: {action}")]
    UnknownAction {
        /// The unrecognized action.
        action: String,
    },

    /// The receiving context answered with a failed reply.
    #[error("Request rejected: {message}")]
    Rejected {
        /// Reason given by the receiver.
        message: String,
    },

    /// Malformed message or reply.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// Nobody is listening on the addressed channel.
    #[error("No receiver for message")]
    NoReceiver,

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// The persistence layer failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a tab gone error.
    #[inline]
    pub fn tab_gone(tab_id: TabId) -> Self {
        Self::TabGone { tab_id }
    }

    /// Creates a tab unreachable error.
    #[inline]
    pub fn tab_unreachable(tab_id: TabId) -> Self {
        Self::TabUnreachable { tab_id }
    }

    /// Creates an unknown action error.
    #[inline]
    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction {
            action: action.into(),
        }
    }

    /// Creates a rejected error.
    #[inline]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    #[inline]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the error concerns the addressed tab.
    #[inline]
    #[must_use]
    pub fn is_tab_error(&self) -> bool {
        matches!(
            self,
            Self::TargetUnresolvable | Self::TabGone { .. } | Self::TabUnreachable { .. }
        )
    }

    /// Returns `true` if the persistence layer failed.
    #[inline]
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Io(_))
    }

    /// Returns `true` if nobody was listening.
    ///
    /// These are expected during normal operation and are never reported
    /// to the user.
    #[inline]
    #[must_use]
    pub fn is_no_receiver(&self) -> bool {
        matches!(self, Self::NoReceiver | Self::ChannelClosed(_))
    }

    /// Returns `true` if the issuing observer should tell the user.
    ///
    /// Covers the command-path failures: the command did not take effect.
    #[inline]
    #[must_use]
    pub fn is_command_failure(&self) -> bool {
        self.is_tab_error() || self.is_storage_error() || matches!(self, Self::Rejected { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("valid tab id")
    }

    #[test]
    fn test_error_display() {
        let err = Error::tab_gone(tab(7));
        assert_eq!(err.to_string(), "Tab 7 no longer exists");
    }

    #[test]
    fn test_unreachable_mentions_reload() {
        let err = Error::tab_unreachable(tab(3));
        assert!(err.to_string().contains("reload the page"));
    }

    #[test]
    fn test_is_tab_error() {
        assert!(Error::TargetUnresolvable.is_tab_error());
        assert!(Error::tab_gone(tab(1)).is_tab_error());
        assert!(!Error::storage("disk full").is_tab_error());
    }

    #[test]
    fn test_is_command_failure() {
        assert!(Error::storage("disk full").is_command_failure());
        assert!(Error::rejected("nope").is_command_failure());
        assert!(!Error::NoReceiver.is_command_failure());
    }

    #[test]
    fn test_is_no_receiver() {
        assert!(Error::NoReceiver.is_no_receiver());
        assert!(!Error::config("x").is_no_receiver());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_storage_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
