//! Client handle used by the popup and viewer surfaces.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bus::{BroadcastBus, Subscription};
use crate::capture::CaptureRecord;
use crate::error::Result;
use crate::host::HostTabs;
use crate::identifiers::TabId;
use crate::protocol::{Message, MessageSender, RelayCommand, StoredRequests, TabStatus, TabTitle};
use crate::store::TabStore;
use crate::transport::{RuntimeChannel, TabRouter};

use super::viewer::sort_newest_first;

// ============================================================================
// RecordView
// ============================================================================

/// Records shown by the viewer, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView {
    /// The inspected tab; `None` for the all-tabs view.
    pub scope: Option<TabId>,
    /// Records sorted by descending timestamp.
    pub records: Vec<CaptureRecord>,
    /// Whether the view offers clearing.
    pub can_clear: bool,
}

// ============================================================================
// Inspector
// ============================================================================

/// An observer of captured traffic.
///
/// Reads go through the store owner; the listening flag and clearing write
/// the tab store directly and then notify the tab's relay.
#[derive(Debug, Clone)]
pub struct Inspector {
    runtime: RuntimeChannel,
    relays: TabRouter,
    store: TabStore,
    bus: BroadcastBus,
    host: Arc<dyn HostTabs>,
}

impl Inspector {
    /// Creates an inspector.
    #[must_use]
    pub fn new(
        runtime: RuntimeChannel,
        relays: TabRouter,
        store: TabStore,
        bus: BroadcastBus,
        host: Arc<dyn HostTabs>,
    ) -> Self {
        Self {
            runtime,
            relays,
            store,
            bus,
            host,
        }
    }

    /// Subscribes to `updateCount`, `titleUpdated` and `recordsCleared`.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    fn sender() -> MessageSender {
        MessageSender::extension()
    }
}

// ============================================================================
// Inspector - Popup
// ============================================================================

impl Inspector {
    /// Returns `{isListening, requestCount}` for the tab.
    ///
    /// # Errors
    ///
    /// Store owner or storage failures.
    pub async fn popup_state(&self, tab_id: TabId) -> Result<TabStatus> {
        self.runtime
            .request(
                Message::GetPopupState {
                    tab_id: Some(tab_id),
                },
                Self::sender(),
            )
            .await
    }

    /// Turns capture on for the tab.
    ///
    /// # Errors
    ///
    /// [`Error::TabUnreachable`](crate::error::Error::TabUnreachable) if the
    /// tab's relay cannot be reached; the listening flag is then left off.
    pub async fn start_listening(&self, tab_id: TabId) -> Result<()> {
        self.store.set_listening(tab_id, true).await?;

        match self.notify(tab_id, RelayCommand::StartListening).await {
            Ok(()) => {
                debug!(tab_id = %tab_id, "Listening started");
                Ok(())
            }
            Err(e) => {
                warn!(tab_id = %tab_id, error = %e, "Relay unreachable, listening reverted");
                self.store.set_listening(tab_id, false).await?;
                Err(e)
            }
        }
    }

    /// Turns capture off for the tab.
    ///
    /// # Errors
    ///
    /// [`Error::TabUnreachable`](crate::error::Error::TabUnreachable) if the
    /// tab's relay cannot be reached. The flag is cleared either way.
    pub async fn stop_listening(&self, tab_id: TabId) -> Result<()> {
        self.store.set_listening(tab_id, false).await?;
        self.notify(tab_id, RelayCommand::StopListening).await?;
        debug!(tab_id = %tab_id, "Listening stopped");
        Ok(())
    }

    async fn notify(&self, tab_id: TabId, command: RelayCommand) -> Result<()> {
        let reply = self.relays.send(tab_id, command).await?;
        reply.into_result().map(drop)
    }
}

// ============================================================================
// Inspector - Viewer
// ============================================================================

impl Inspector {
    /// Returns the records of one tab, or of every tab when `scope` is `None`.
    ///
    /// # Errors
    ///
    /// Store owner or storage failures.
    pub async fn records(&self, scope: Option<TabId>) -> Result<RecordView> {
        let mut records = match scope {
            Some(tab_id) => {
                let stored: StoredRequests = self
                    .runtime
                    .request(
                        Message::GetStoredRequests {
                            tab_id: Some(tab_id),
                        },
                        Self::sender(),
                    )
                    .await?;
                stored.data
            }
            None => self.store.all_records().await?,
        };
        sort_newest_first(&mut records);

        Ok(RecordView {
            scope,
            records,
            can_clear: scope.is_some(),
        })
    }

    /// Clears the tab's log.
    ///
    /// The store owner announces `recordsCleared` once storage reports the
    /// removal. An unreachable relay only misses the local reset.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn clear_records(&self, tab_id: TabId) -> Result<()> {
        self.store.clear_log(tab_id).await?;
        if let Err(e) = self.notify(tab_id, RelayCommand::ClearRecords).await {
            warn!(tab_id = %tab_id, error = %e, "Relay not told about clear");
        }
        Ok(())
    }

    /// Returns the tab's current title.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`](crate::error::Error::Rejected) carrying the
    /// owner's reason if the tab is gone.
    pub async fn tab_title(&self, tab_id: TabId) -> Result<String> {
        let TabTitle { title } = self
            .runtime
            .request(
                Message::GetTabTitle {
                    tab_id: Some(tab_id),
                },
                Self::sender(),
            )
            .await?;
        Ok(title)
    }

    /// Asks the store owner to open the viewer for the tab.
    ///
    /// # Errors
    ///
    /// [`Error::NoReceiver`](crate::error::Error::NoReceiver) if the store
    /// owner is not running.
    pub fn open_viewer(
        &self,
        tab_id: TabId,
        tab_title: Option<String>,
        index: Option<u32>,
    ) -> Result<()> {
        self.runtime.post(
            Message::OpenViewer {
                tab_id: Some(tab_id),
                tab_title,
                index,
            },
            Self::sender(),
        )
    }

    /// Brings the inspected tab to the front.
    ///
    /// # Errors
    ///
    /// [`Error::TabGone`](crate::error::Error::TabGone) if the tab was closed.
    pub fn focus_tab(&self, tab_id: TabId) -> Result<()> {
        self.host.activate(tab_id)
    }

    /// Returns whether the viewer refreshes on `updateCount`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn auto_refresh(&self) -> Result<bool> {
        self.store.auto_refresh().await
    }

    /// Sets whether the viewer refreshes on `updateCount`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn set_auto_refresh(&self, enabled: bool) -> Result<()> {
        self.store.set_auto_refresh(enabled).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::capture::{CapturedExchange, ResponseBody};
    use crate::error::Error;
    use crate::host::HostTabRegistry;
    use crate::store::{MemoryStorage, StorageArea, StoreOwner};

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("tab")
    }

    fn exchange(url: &str) -> CapturedExchange {
        CapturedExchange {
            url: url.to_string(),
            method: "GET".to_string(),
            params: Default::default(),
            response: ResponseBody::default(),
        }
    }

    struct Harness {
        inspector: Inspector,
        owner: StoreOwner,
        host: Arc<HostTabRegistry>,
        _owner_task: tokio::task::JoinHandle<()>,
    }

    /// Wires an inspector to a running store owner, without relays.
    async fn harness() -> Harness {
        let area: Arc<dyn StorageArea> = Arc::new(MemoryStorage::new());
        let store = TabStore::new(area);
        let bus = BroadcastBus::new();
        let host = Arc::new(HostTabRegistry::new());
        let (runtime, inbox) = RuntimeChannel::new();
        let owner = StoreOwner::new(store.clone(), bus.clone(), host.clone(), "viewer.html");
        let owner_task = owner.clone().spawn(inbox);
        let inspector = Inspector::new(runtime, TabRouter::new(), store, bus, host.clone());

        // One round trip so the owner is subscribed to storage changes.
        inspector.popup_state(tab(1)).await.expect("owner running");
        Harness {
            inspector,
            owner,
            host,
            _owner_task: owner_task,
        }
    }

    #[tokio::test]
    async fn test_start_without_relay_reverts_flag() {
        let h = harness().await;
        h.host.open_tab(tab(4), "Blog");

        let err = h.inspector.start_listening(tab(4)).await.unwrap_err();
        assert!(matches!(err, Error::TabUnreachable { .. }));

        let state = h.inspector.popup_state(tab(4)).await.expect("state");
        assert!(!state.is_listening);
    }

    #[tokio::test]
    async fn test_records_newest_first() {
        let h = harness().await;
        h.host.open_tab(tab(2), "Shop");
        h.owner.store_request(tab(2), exchange("/first")).await.expect("store");
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        h.owner.store_request(tab(2), exchange("/second")).await.expect("store");

        let view = h.inspector.records(Some(tab(2))).await.expect("records");
        assert!(view.can_clear);
        let urls: Vec<_> = view.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["/second", "/first"]);
    }

    #[tokio::test]
    async fn test_all_tabs_view_cannot_clear() {
        let h = harness().await;
        h.host.open_tab(tab(1), "A");
        h.host.open_tab(tab(2), "B");
        h.owner.store_request(tab(1), exchange("/a")).await.expect("store");
        h.owner.store_request(tab(2), exchange("/b")).await.expect("store");

        let view = h.inspector.records(None).await.expect("records");
        assert_eq!(view.scope, None);
        assert!(!view.can_clear);
        assert_eq!(view.records.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_tolerates_missing_relay() {
        let h = harness().await;
        h.host.open_tab(tab(3), "C");
        h.owner.store_request(tab(3), exchange("/a")).await.expect("store");

        let mut events = h.inspector.subscribe();
        h.inspector.clear_records(tab(3)).await.expect("clear");

        let event = events.recv().await.expect("event");
        assert_eq!(event, crate::protocol::Broadcast::RecordsCleared { tab_id: tab(3) });
        assert!(h.inspector.records(Some(tab(3))).await.expect("records").records.is_empty());
    }

    #[tokio::test]
    async fn test_title_of_closed_tab_fails() {
        let h = harness().await;
        h.host.open_tab(tab(5), "Docs");
        assert_eq!(h.inspector.tab_title(tab(5)).await.expect("title"), "Docs");

        h.host.close_tab(tab(5));
        assert!(h.inspector.tab_title(tab(5)).await.is_err());
        assert!(matches!(h.inspector.focus_tab(tab(5)), Err(Error::TabGone { .. })));
    }

    #[tokio::test]
    async fn test_auto_refresh_defaults_on() {
        let h = harness().await;
        assert!(h.inspector.auto_refresh().await.expect("read"));
        h.inspector.set_auto_refresh(false).await.expect("write");
        assert!(!h.inspector.auto_refresh().await.expect("read"));
    }
}
