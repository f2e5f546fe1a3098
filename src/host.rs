//! Browser-host collaborator.
//!
//! The host owns the tabs themselves: their titles, their lifetime, and
//! where the inspector view opens. [`HostTabs`] is the seam; the in-process
//! [`HostTabRegistry`] implements it for demos and tests.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Debug;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::observer::ViewerLocation;

// ============================================================================
// HostEvent
// ============================================================================

/// A tab lifecycle notification from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A tab was opened.
    TabCreated {
        /// The new tab.
        tab_id: TabId,
    },

    /// A tab was closed.
    TabRemoved {
        /// The closed tab.
        tab_id: TabId,
    },

    /// A tab's title changed.
    TitleChanged {
        /// The retitled tab.
        tab_id: TabId,
        /// The new title.
        title: String,
    },
}

/// One subscriber's queue of host events.
pub type HostEventReceiver = mpsc::UnboundedReceiver<HostEvent>;

// ============================================================================
// HostTabs
// ============================================================================

/// Tab operations provided by the browser host.
pub trait HostTabs: Send + Sync + Debug {
    /// Returns the tab's current title, `None` if the tab does not exist.
    fn title(&self, tab_id: TabId) -> Option<String>;

    /// Opens the inspector view at `location`.
    ///
    /// # Errors
    ///
    /// Host-specific; the in-process registry never fails.
    fn open_viewer(&self, location: &ViewerLocation) -> Result<()>;

    /// Brings the tab to the front.
    ///
    /// # Errors
    ///
    /// [`Error::TabGone`] if the tab does not exist.
    fn activate(&self, tab_id: TabId) -> Result<()>;

    /// Subscribes to tab lifecycle notifications.
    ///
    /// Every event emitted after the call is queued for the subscriber, in
    /// emission order.
    fn subscribe(&self) -> HostEventReceiver;
}

// ============================================================================
// HostTabRegistry
// ============================================================================

#[derive(Debug, Clone)]
struct TabInfo {
    title: String,
}

/// In-process tab registry implementing [`HostTabs`].
#[derive(Debug)]
pub struct HostTabRegistry {
    tabs: RwLock<FxHashMap<TabId, TabInfo>>,
    active: Mutex<Option<TabId>>,
    viewers: Mutex<Vec<ViewerLocation>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<HostEvent>>>,
}

impl Default for HostTabRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTabRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tabs: RwLock::new(FxHashMap::default()),
            active: Mutex::new(None),
            viewers: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers an open tab.
    pub fn open_tab(&self, tab_id: TabId, title: impl Into<String>) {
        let title = title.into();
        debug!(tab_id = %tab_id, title = %title, "Host tab opened");
        self.tabs.write().insert(tab_id, TabInfo { title });
        self.emit(HostEvent::TabCreated { tab_id });
    }

    /// Changes a tab's title. Returns `false` if the tab does not exist.
    pub fn set_title(&self, tab_id: TabId, title: impl Into<String>) -> bool {
        let title = title.into();
        {
            let mut tabs = self.tabs.write();
            let Some(info) = tabs.get_mut(&tab_id) else {
                return false;
            };
            if info.title == title {
                return true;
            }
            info.title.clone_from(&title);
        }
        self.emit(HostEvent::TitleChanged { tab_id, title });
        true
    }

    /// Closes a tab. Returns `false` if the tab does not exist.
    pub fn close_tab(&self, tab_id: TabId) -> bool {
        if self.tabs.write().remove(&tab_id).is_none() {
            return false;
        }

        let mut active = self.active.lock();
        if *active == Some(tab_id) {
            *active = None;
        }
        drop(active);

        debug!(tab_id = %tab_id, "Host tab closed");
        self.emit(HostEvent::TabRemoved { tab_id });
        true
    }

    /// Returns `true` if the tab is open.
    #[inline]
    #[must_use]
    pub fn contains(&self, tab_id: TabId) -> bool {
        self.tabs.read().contains_key(&tab_id)
    }

    /// Returns the most recently activated tab.
    #[inline]
    #[must_use]
    pub fn active_tab(&self) -> Option<TabId> {
        *self.active.lock()
    }

    /// Returns every viewer location opened so far.
    #[must_use]
    pub fn opened_viewers(&self) -> Vec<ViewerLocation> {
        self.viewers.lock().clone()
    }

    /// Queues `event` for every live subscriber, pruning the dropped ones.
    fn emit(&self, event: HostEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            trace!("Host event had no listeners");
        }
    }
}

impl HostTabs for HostTabRegistry {
    fn title(&self, tab_id: TabId) -> Option<String> {
        self.tabs.read().get(&tab_id).map(|info| info.title.clone())
    }

    fn open_viewer(&self, location: &ViewerLocation) -> Result<()> {
        debug!(url = %location.to_url(), "Opening viewer");
        self.viewers.lock().push(location.clone());
        Ok(())
    }

    fn activate(&self, tab_id: TabId) -> Result<()> {
        if !self.contains(tab_id) {
            return Err(Error::tab_gone(tab_id));
        }
        *self.active.lock() = Some(tab_id);
        Ok(())
    }

    fn subscribe(&self) -> HostEventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("valid tab id")
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let host = HostTabRegistry::new();
        let mut events = host.subscribe();

        host.open_tab(tab(1), "Home");
        assert!(host.set_title(tab(1), "Inbox"));
        assert!(host.close_tab(tab(1)));

        assert_eq!(events.recv().await, Some(HostEvent::TabCreated { tab_id: tab(1) }));
        assert_eq!(
            events.recv().await,
            Some(HostEvent::TitleChanged {
                tab_id: tab(1),
                title: "Inbox".to_string()
            })
        );
        assert_eq!(events.recv().await, Some(HostEvent::TabRemoved { tab_id: tab(1) }));
    }

    #[test]
    fn test_close_is_not_lost_behind_title_burst() {
        let host = HostTabRegistry::new();
        host.open_tab(tab(1), "Home");
        host.open_tab(tab(2), "Feed");
        let mut events = host.subscribe();

        host.close_tab(tab(1));
        for i in 0..500 {
            host.set_title(tab(2), format!("Feed ({i})"));
        }

        assert_eq!(events.try_recv().ok(), Some(HostEvent::TabRemoved { tab_id: tab(1) }));
        let mut titles = 0;
        while let Ok(event) = events.try_recv() {
            assert!(matches!(event, HostEvent::TitleChanged { .. }));
            titles += 1;
        }
        assert_eq!(titles, 500);
    }

    #[test]
    fn test_unchanged_title_emits_nothing() {
        let host = HostTabRegistry::new();
        host.open_tab(tab(1), "Home");
        let mut events = host.subscribe();
        assert!(host.set_title(tab(1), "Home"));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_unknown_tab() {
        let host = HostTabRegistry::new();
        assert_eq!(host.title(tab(9)), None);
        assert!(!host.set_title(tab(9), "x"));
        assert!(!host.close_tab(tab(9)));
        assert!(matches!(host.activate(tab(9)), Err(Error::TabGone { .. })));
    }

    #[test]
    fn test_activate() {
        let host = HostTabRegistry::new();
        host.open_tab(tab(2), "Docs");
        host.activate(tab(2)).expect("activate");
        assert_eq!(host.active_tab(), Some(tab(2)));
        host.close_tab(tab(2));
        assert_eq!(host.active_tab(), None);
    }
}
