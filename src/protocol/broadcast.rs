//! Broadcast notifications fanned out to observers.
//!
//! Broadcasts are published by the store owner through the
//! [`BroadcastBus`](crate::bus::BroadcastBus). Recipients that are not
//! displaying the named tab ignore them.
//!
//! | Action | Fields |
//! |--------|--------|
//! | `updateCount` | `count`, `tabId` |
//! | `titleUpdated` | `tabId`, `newTitle` |
//! | `recordsCleared` | `tabId` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::TabId;

// ============================================================================
// Broadcast
// ============================================================================

/// A state-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Broadcast {
    /// A record was appended to the tab's log.
    UpdateCount {
        /// Log length after the append.
        count: usize,
        /// Tab whose log grew.
        tab_id: TabId,
    },

    /// The tab's title changed.
    TitleUpdated {
        /// Tab whose title changed.
        tab_id: TabId,
        /// The new title.
        new_title: String,
    },

    /// The tab's log was cleared.
    RecordsCleared {
        /// Tab whose log was cleared.
        tab_id: TabId,
    },
}

impl Broadcast {
    /// Returns the tab the notification is about.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        match self {
            Self::UpdateCount { tab_id, .. }
            | Self::TitleUpdated { tab_id, .. }
            | Self::RecordsCleared { tab_id } => *tab_id,
        }
    }

    /// Returns the `action` discriminator.
    #[inline]
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::UpdateCount { .. } => "updateCount",
            Self::TitleUpdated { .. } => "titleUpdated",
            Self::RecordsCleared { .. } => "recordsCleared",
        }
    }
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
    fn test_update_count_wire_form() {
        let event = Broadcast::UpdateCount {
            count: 2,
            tab_id: tab(7),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value, json!({ "action": "updateCount", "count": 2, "tabId": 7 }));
    }

    #[test]
    fn test_title_updated_parse() {
        let event: Broadcast =
            serde_json::from_value(json!({ "action": "titleUpdated", "tabId": 4, "newTitle": "Inbox" }))
                .expect("parse");
        assert_eq!(event.tab_id(), tab(4));
        assert_eq!(event.action(), "titleUpdated");
    }
}
