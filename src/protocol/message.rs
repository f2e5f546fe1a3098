//! Context-to-context request messages.
//!
//! Every message is a mapping with an `action` discriminator.
//!
//! # Runtime messages (to the store owner)
//!
//! | Action | Payload | Reply |
//! |--------|---------|-------|
//! | `storeRequest` | `data` | `{newCount}` |
//! | `getPopupState` | `tabId` | `{isListening, requestCount}` |
//! | `getInitialState` | (sender tab) | `{isListening, requestCount}` |
//! | `getStoredRequests` | `tabId` | `{data}` |
//! | `getTabTitle` | `tabId` | `{title}` |
//! | `openViewer` | `tabId, tabTitle, index` | none required |
//!
//! # Relay commands (to the relay of one tab)
//!
//! `startListening`, `stopListening`, `clearRecords`, `getStatus`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capture::CapturedExchange;
use crate::error::{Error, Result};
use crate::identifiers::TabId;

// ============================================================================
// MessageSender
// ============================================================================

/// Who sent a message. Replaces the host's sender metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSender {
    /// Tab of the sending context, if it lives in a tab.
    pub tab_id: Option<TabId>,
}

impl MessageSender {
    /// A sender living in the given tab (a relay).
    #[inline]
    #[must_use]
    pub fn tab(tab_id: TabId) -> Self {
        Self {
            tab_id: Some(tab_id),
        }
    }

    /// A sender outside any tab (popup, viewer).
    #[inline]
    #[must_use]
    pub fn extension() -> Self {
        Self { tab_id: None }
    }
}

// ============================================================================
// Message
// ============================================================================

/// A runtime message addressed to the store owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    /// Persist a captured exchange.
    StoreRequest {
        /// The captured exchange.
        data: CapturedExchange,
        /// Explicit target; defaults to the sender's tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab_id: Option<TabId>,
    },

    /// Popup state query.
    GetPopupState {
        /// Target tab.
        #[serde(default)]
        tab_id: Option<TabId>,
    },

    /// Relay state restore; the tab comes from the sender.
    GetInitialState,

    /// Read a tab's log.
    GetStoredRequests {
        /// Target tab.
        #[serde(default)]
        tab_id: Option<TabId>,
    },

    /// Read a tab's current title.
    GetTabTitle {
        /// Target tab.
        #[serde(default)]
        tab_id: Option<TabId>,
    },

    /// Open the inspector view for a tab.
    OpenViewer {
        /// Target tab.
        #[serde(default)]
        tab_id: Option<TabId>,
        /// Title shown in the viewer header.
        #[serde(default)]
        tab_title: Option<String>,
        /// Position of the tab in its window.
        #[serde(default)]
        index: Option<u32>,
    },
}

impl Message {
    /// Returns the `action` discriminator.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::StoreRequest { .. } => "storeRequest",
            Self::GetPopupState { .. } => "getPopupState",
            Self::GetInitialState => "getInitialState",
            Self::GetStoredRequests { .. } => "getStoredRequests",
            Self::GetTabTitle { .. } => "getTabTitle",
            Self::OpenViewer { .. } => "openViewer",
        }
    }

    /// Returns the tab named in the message itself.
    #[must_use]
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            Self::StoreRequest { tab_id, .. }
            | Self::GetPopupState { tab_id }
            | Self::GetStoredRequests { tab_id }
            | Self::GetTabTitle { tab_id }
            | Self::OpenViewer { tab_id, .. } => *tab_id,
            Self::GetInitialState => None,
        }
    }

    /// Resolves the target tab: the message's own `tabId`, else the sender's.
    ///
    /// # Errors
    ///
    /// [`Error::TargetUnresolvable`] if neither names a tab.
    pub fn target(&self, sender: &MessageSender) -> Result<TabId> {
        self.tab_id()
            .or(sender.tab_id)
            .ok_or(Error::TargetUnresolvable)
    }

    /// Parses a message from its JSON form.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownAction`] for an unrecognized `action`,
    /// [`Error::Json`] for a malformed payload.
    pub fn parse(value: Value) -> Result<Self> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("message has no action"))?
            .to_string();

        if !RUNTIME_ACTIONS.contains(&action.as_str()) {
            return Err(Error::unknown_action(action));
        }
        Ok(serde_json::from_value(value)?)
    }
}

const RUNTIME_ACTIONS: &[&str] = &[
    "storeRequest",
    "getPopupState",
    "getInitialState",
    "getStoredRequests",
    "getTabTitle",
    "openViewer",
];

// ============================================================================
// RelayCommand
// ============================================================================

/// A command addressed to the relay of one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RelayCommand {
    /// Begin capturing.
    StartListening,
    /// Stop capturing.
    StopListening,
    /// The log was cleared; reset the local count.
    ClearRecords,
    /// Report `{isListening, requestCount}`.
    GetStatus,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("valid tab id")
    }

    #[test]
    fn test_message_serialization() {
        let message = Message::GetPopupState {
            tab_id: Some(tab(7)),
        };
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value, json!({ "action": "getPopupState", "tabId": 7 }));
    }

    #[test]
    fn test_initial_state_has_only_action() {
        let value = serde_json::to_value(Message::GetInitialState).expect("serialize");
        assert_eq!(value, json!({ "action": "getInitialState" }));
    }

    #[test]
    fn test_open_viewer_fields() {
        let value = json!({ "action": "openViewer", "tabId": 3, "tabTitle": "Shop", "index": 1 });
        let message = Message::parse(value).expect("parse");
        assert_eq!(
            message,
            Message::OpenViewer {
                tab_id: Some(tab(3)),
                tab_title: Some("Shop".to_string()),
                index: Some(1),
            }
        );
    }

    #[test]
    fn test_target_prefers_message_tab() {
        let message = Message::GetStoredRequests {
            tab_id: Some(tab(2)),
        };
        let target = message.target(&MessageSender::tab(tab(9))).expect("target");
        assert_eq!(target, tab(2));
    }

    #[test]
    fn test_target_falls_back_to_sender() {
        let target = Message::GetInitialState
            .target(&MessageSender::tab(tab(9)))
            .expect("target");
        assert_eq!(target, tab(9));
    }

    #[test]
    fn test_target_unresolvable() {
        let result = Message::GetInitialState.target(&MessageSender::extension());
        assert!(matches!(result, Err(Error::TargetUnresolvable)));
    }

    #[test]
    fn test_parse_unknown_action() {
        let result = Message::parse(json!({ "action": "selfDestruct" }));
        assert!(matches!(result, Err(Error::UnknownAction { .. })));
    }

    #[test]
    fn test_relay_command_wire_form() {
        let value = serde_json::to_value(RelayCommand::ClearRecords).expect("serialize");
        assert_eq!(value, json!({ "action": "clearRecords" }));
    }
}
